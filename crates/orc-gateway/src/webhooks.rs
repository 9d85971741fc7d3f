use hmac::{Hmac, Mac};
use orc_core::ClientError;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the expected signature over `timestamp.body`, mirroring the canonical signing
/// scheme used for outbound webhook dispatch elsewhere in this stack so inbound verification
/// and outbound signing share one wire convention.
fn expected_signature(secret: &str, timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Verifies an inbound webhook signature in constant time. `signature_hex` is the
/// caller-supplied header value; comparison never short-circuits on the first differing byte.
pub fn verify_signature(secret: &str, timestamp: i64, body: &[u8], signature_hex: &str) -> bool {
    let Ok(given) = hex::decode(signature_hex) else {
        return false;
    };
    let expected = expected_signature(secret, timestamp, body);
    given.ct_eq(&expected).into()
}

/// Rejects stale or premature webhook timestamps outside the replay window.
pub fn check_timestamp_window(timestamp: i64, now: i64, window_secs: i64) -> Result<(), ClientError> {
    if (now - timestamp).abs() > window_secs {
        Err(ClientError::ReplayWindowExceeded)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_signature_accepts_matching_hmac() {
        let secret = "shh";
        let body = br#"{"event":"deploy"}"#;
        let ts = 1_700_000_000;
        let sig = hex::encode(expected_signature(secret, ts, body));
        assert!(verify_signature(secret, ts, body, &sig));
    }

    #[test]
    fn verify_signature_rejects_tampered_body() {
        let secret = "shh";
        let ts = 1_700_000_000;
        let sig = hex::encode(expected_signature(secret, ts, b"original"));
        assert!(!verify_signature(secret, ts, b"tampered", &sig));
    }

    #[test]
    fn verify_signature_rejects_malformed_hex() {
        assert!(!verify_signature("shh", 0, b"body", "not-hex"));
    }

    #[test]
    fn timestamp_window_accepts_within_bound() {
        assert!(check_timestamp_window(1000, 1200, 300).is_ok());
    }

    #[test]
    fn timestamp_window_rejects_stale() {
        assert_eq!(
            check_timestamp_window(1000, 2000, 300),
            Err(ClientError::ReplayWindowExceeded)
        );
    }
}
