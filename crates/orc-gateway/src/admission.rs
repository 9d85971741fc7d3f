use crate::config::GatewayConfig;
use orc_breaker::{Admission as BreakerAdmission, Registry as BreakerRegistry};
use orc_budget::Accountant;
use orc_core::{ClientError, TaskType};
use orc_store::Store;

/// Declares which provider's budget (if any) and which circuit-breaker service a task type is
/// billed/gated against. Not named explicitly in the data model — task types map to a single
/// dominant dependency in this deployment; recorded as a resolved open design decision.
fn cost_class(task_type: TaskType) -> (Option<&'static str>, &'static str) {
    match task_type {
        TaskType::CodePr => (None, "github"),
        TaskType::CenterpointSync => (None, "centerpoint"),
        TaskType::MrgDeploy => (None, "mrg"),
        TaskType::GenContent => (Some("openai"), "openai"),
        TaskType::AureaAction => (Some("anthropic"), "aurea"),
    }
}

/// Admission Controller: the fixed three-step pre-enqueue check. A rejection here
/// never creates a Run row and the task is never enqueued.
pub struct AdmissionController {
    store: Store,
    breakers: std::sync::Arc<BreakerRegistry>,
    budget: std::sync::Arc<Accountant>,
    config: GatewayConfig,
}

impl AdmissionController {
    pub fn new(
        store: Store,
        breakers: std::sync::Arc<BreakerRegistry>,
        budget: std::sync::Arc<Accountant>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            breakers,
            budget,
            config,
        }
    }

    /// Runs the three checks in order: queue depth, budget, circuit. The first failure short
    /// circuits — later checks are not evaluated; the checks run in this fixed order.
    pub async fn check(&self, task_type: TaskType, reserved_cost: f64) -> anyhow::Result<Result<(), ClientError>> {
        let depth = orc_store::tasks::active_count(self.store.pool()).await?;
        if depth >= self.config.max_queue_depth {
            return Ok(Err(ClientError::QueueFull));
        }

        let (provider, service) = cost_class(task_type);
        if let Some(provider) = provider {
            if !self.budget.can_admit(provider, reserved_cost).await? {
                return Ok(Err(ClientError::BudgetExceeded));
            }
        }

        match self.breakers.allow(service).await? {
            BreakerAdmission::Allowed => Ok(Ok(())),
            BreakerAdmission::Rejected => Ok(Err(ClientError::CircuitOpen)),
        }
    }
}
