use rand::Rng;
use std::time::Duration;

/// `delay = min(cap, base * 2^retry_count) * uniform(0.5, 1.5)`. Jitter is mandatory
/// to avoid thundering herd, grounded on the `JITTER_DELTA` pattern in the `svix-webhooks`
/// worker reference file.
pub fn compute_delay(retry_count: i32, base_secs: f64, cap_secs: f64, rng: &mut impl Rng) -> Duration {
    let exponential = base_secs * 2f64.powi(retry_count.max(0));
    let bounded = exponential.min(cap_secs);
    let jitter = rng.gen_range(0.5..1.5);
    Duration::from_secs_f64((bounded * jitter).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn delay_is_capped() {
        let mut rng = StepRng::new(u64::MAX / 2, 0);
        let delay = compute_delay(20, 1.0, 60.0, &mut rng);
        // StepRng at the midpoint yields jitter ~= 1.0, so the cap should dominate.
        assert!(delay.as_secs_f64() <= 60.0 * 1.5 + 0.001);
    }

    #[test]
    fn delay_grows_exponentially_before_the_cap() {
        let mut rng = StepRng::new(u64::MAX / 2, 0);
        let d0 = compute_delay(0, 1.0, 60.0, &mut rng);
        let d1 = compute_delay(1, 1.0, 60.0, &mut rng);
        let d2 = compute_delay(2, 1.0, 60.0, &mut rng);
        assert!(d1.as_secs_f64() > d0.as_secs_f64());
        assert!(d2.as_secs_f64() > d1.as_secs_f64());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let delay = compute_delay(3, 1.0, 60.0, &mut rng);
            let exponential = 1.0 * 2f64.powi(3);
            assert!(delay.as_secs_f64() >= exponential * 0.5 - 0.001);
            assert!(delay.as_secs_f64() <= exponential * 1.5 + 0.001);
        }
    }
}
