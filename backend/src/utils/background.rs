//! Fire-and-forget side effects whose failure must not change a request's outcome.

use std::future::Future;

/// Runs `task` on the runtime and logs (then drops) any error it returns.
pub fn spawn_best_effort<F, E>(label: &'static str, task: F)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = task.await {
            tracing::warn!(task = label, error = %err, "best-effort task failed");
        }
    });
}
