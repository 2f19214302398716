use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tab_types::SessionId;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{NotifyError, NotifyResult};
use crate::event::SessionEvent;
use crate::notifier::Notifier;

/// Receiver half handed to subscribers.
pub type EventStream = broadcast::Receiver<SessionEvent>;

/// In-process fan-out of session events.
///
/// Each session gets its own broadcast channel, created on first
/// subscription and pruned once its last receiver is gone. A slow
/// subscriber lags and loses the oldest events rather than holding up
/// publishers.
pub struct BroadcastNotifier {
    channels: RwLock<HashMap<SessionId, broadcast::Sender<SessionEvent>>>,
    firehose: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            channels: RwLock::new(HashMap::new()),
            firehose,
            capacity,
        }
    }

    /// Receive every future event of `session`.
    pub fn subscribe(&self, session: SessionId) -> NotifyResult<EventStream> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| NotifyError::LockPoisoned("broadcast channels".into()))?;
        let sender = channels
            .entry(session)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.subscribe())
    }

    /// Receive every future event of every session.
    pub fn subscribe_all(&self) -> EventStream {
        self.firehose.subscribe()
    }

    /// Live subscribers of `session`.
    pub fn subscriber_count(&self, session: &SessionId) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|channels| channels.get(session).map(|s| s.receiver_count()))
            .unwrap_or(0)
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: SessionEvent) -> NotifyResult<()> {
        // No receivers is not a failure.
        let _ = self.firehose.send(event.clone());

        let mut channels = self
            .channels
            .write()
            .map_err(|_| NotifyError::LockPoisoned("broadcast channels".into()))?;
        let Some(sender) = channels.get(&event.session) else {
            return Ok(());
        };
        let session = event.session;
        match sender.send(event) {
            Ok(delivered) => {
                debug!(session = %session, delivered, "event broadcast");
            }
            Err(_) => {
                channels.remove(&session);
                debug!(session = %session, "pruned session channel without subscribers");
            }
        }
        Ok(())
    }
}
