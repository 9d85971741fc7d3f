//! Budget Accountant: per-provider daily spend ledger, pre-admission check and post-completion
//! debit. The atomic reserve-and-commit runs inside one transaction in `orc-store::budget`;
//! this crate adds the provider default-budget configuration and the `Remaining` read used by
//! the Admission Controller.

use chrono::{NaiveDate, Utc};
use orc_store::budget::ReserveOutcome;
use orc_store::Store;
use std::collections::HashMap;

/// Daily budget ceiling per provider, loaded at startup (e.g. from config/env) and held for the
/// life of the process. A provider with no entry has no budget cap enforced.
#[derive(Debug, Clone, Default)]
pub struct ProviderBudgets {
    defaults_usd: HashMap<String, f64>,
}

impl ProviderBudgets {
    pub fn new(defaults_usd: HashMap<String, f64>) -> Self {
        Self { defaults_usd }
    }

    pub fn default_for(&self, provider: &str) -> f64 {
        self.defaults_usd.get(provider).copied().unwrap_or(0.0)
    }
}

/// Over-commit tolerance above `budget_usd` still admitted — up to 10%.
pub const OVERCOMMIT_TOLERANCE: f64 = 0.10;

pub struct Accountant {
    store: Store,
    budgets: ProviderBudgets,
}

impl Accountant {
    pub fn new(store: Store, budgets: ProviderBudgets) -> Self {
        Self { store, budgets }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// `Remaining(provider, date) = budget_usd - spent_usd`, used by the Admission Controller
    /// before a task is enqueued.
    pub async fn remaining(&self, provider: &str) -> anyhow::Result<f64> {
        let date = Self::today();
        match orc_store::budget::get(self.store.pool(), provider, date).await? {
            Some(ledger) => Ok(ledger.budget_usd - ledger.spent_usd),
            None => Ok(self.budgets.default_for(provider)),
        }
    }

    /// Pre-admission check: is `reserved_cost` affordable right now? Does not debit — the actual
    /// debit happens post-completion via [`Accountant::commit`] with the real cost.
    pub async fn can_admit(&self, provider: &str, reserved_cost: f64) -> anyhow::Result<bool> {
        Ok(self.remaining(provider).await? > reserved_cost)
    }

    /// Debits the ledger with the actual reported cost/tokens after a run completes. Over-commit
    /// tolerant: only rejects once spend already exceeds `budget_usd * (1 + OVERCOMMIT_TOLERANCE)`.
    pub async fn commit(&self, provider: &str, cost_usd: f64, tokens: i64) -> anyhow::Result<bool> {
        let date = Self::today();
        let outcome = orc_store::budget::reserve(
            self.store.pool(),
            provider,
            date,
            self.budgets.default_for(provider),
            cost_usd,
            tokens,
            OVERCOMMIT_TOLERANCE,
        )
        .await?;

        match outcome {
            ReserveOutcome::Committed(ledger) => {
                tracing::debug!(provider, spent_usd = ledger.spent_usd, "budget committed");
                Ok(true)
            }
            ReserveOutcome::Exceeded(ledger) => {
                tracing::warn!(provider, spent_usd = ledger.spent_usd, "budget exceeded");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_for_unknown_provider_is_zero() {
        let budgets = ProviderBudgets::new(HashMap::from([("openai".to_string(), 50.0)]));
        assert_eq!(budgets.default_for("openai"), 50.0);
        assert_eq!(budgets.default_for("anthropic"), 0.0);
    }
}
