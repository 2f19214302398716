use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::NotifyResult;
use crate::event::SessionEvent;

/// Delivery boundary for session events.
///
/// Delivery is best-effort: implementations may drop events, and callers
/// must not treat a failure as a failure of the operation that produced
/// the event.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: SessionEvent) -> NotifyResult<()>;
}

/// Publish `event`, logging and discarding any failure.
pub async fn publish_best_effort(notifier: &dyn Notifier, event: SessionEvent) {
    let (session, kind) = (event.session, event.kind);
    if let Err(err) = notifier.publish(event).await {
        warn!(session = %session, %kind, error = %err, "event delivery failed");
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn publish(&self, _event: SessionEvent) -> NotifyResult<()> {
        Ok(())
    }
}

/// Writes every event to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn publish(&self, event: SessionEvent) -> NotifyResult<()> {
        info!(session = %event.session, kind = %event.kind, payload = ?event.payload, "session event");
        Ok(())
    }
}
