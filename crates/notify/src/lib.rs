//! Notification collaborator (§4.9 expansion): tells interested parties
//! about request lifecycle events. Notification failures are best-effort —
//! a failing notifier must never block or fail the operation it's attached
//! to, so callers should swallow its errors after logging them.

use async_trait::async_trait;
use slb_store::model::{Execution, Request};
use tracing::warn;

pub type NotifyResult = Result<(), NotifyError>;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0}")]
    Message(String),
}

/// Notified on request lifecycle transitions. Implementations should never
/// panic and should treat their own failures as non-fatal to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn new_request(&self, request: &Request) -> NotifyResult;
    async fn approved(&self, request: &Request) -> NotifyResult;
    async fn rejected(&self, request: &Request) -> NotifyResult;
    async fn executed(&self, request: &Request, execution: &Execution) -> NotifyResult;
}

/// A notifier that does nothing. Used when no notification channel is
/// configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn new_request(&self, _request: &Request) -> NotifyResult {
        Ok(())
    }

    async fn approved(&self, _request: &Request) -> NotifyResult {
        Ok(())
    }

    async fn rejected(&self, _request: &Request) -> NotifyResult {
        Ok(())
    }

    async fn executed(&self, _request: &Request, _execution: &Execution) -> NotifyResult {
        Ok(())
    }
}

/// Run a notifier call, logging but swallowing any error — notification
/// never blocks the state transition it's reporting on.
pub async fn notify_best_effort<F, Fut>(label: &str, call: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = NotifyResult>,
{
    if let Err(err) = call().await {
        warn!(label, error = %err, "notification failed; continuing");
    }
}
