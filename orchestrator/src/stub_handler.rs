use orc_core::{HandlerContext, HandlerOutcome, TaskHandler, TaskView};

/// Placeholder handler wired for every task type until a real one is registered. Task handler
/// bodies are an external collaborator — this just proves the dispatch path
/// end to end and makes an otherwise-unroutable task type fail loudly instead of silently.
pub struct StubHandler;

#[async_trait::async_trait]
impl TaskHandler for StubHandler {
    async fn handle(&self, task: &TaskView, _ctx: HandlerContext) -> HandlerOutcome {
        tracing::warn!(
            task_id = %task.id,
            task_type = %task.task_type,
            "stub handler invoked: no real handler registered for this task type"
        );
        HandlerOutcome::Terminal {
            error: format!("no handler registered for task type {}", task.task_type),
        }
    }
}
