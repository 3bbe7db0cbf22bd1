//! Status publishing to the presentation layer
//!
//! Observers either read the latest status ([`StatusPublisher::subscribe`])
//! or follow every published change in order ([`StatusPublisher::updates`]).

use super::state::CallStatus;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Capacity of the ordered update stream
const UPDATE_CAPACITY: usize = 64;

/// Publishes call status from the orchestrator task
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    latest: watch::Sender<CallStatus>,
    updates: broadcast::Sender<CallStatus>,
}

impl StatusPublisher {
    /// Create a publisher holding the initial `Disconnected` status
    pub fn new() -> Self {
        let (latest, _) = watch::channel(CallStatus::default());
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self { latest, updates }
    }

    /// Publish a status; repeats of the current status are dropped
    ///
    /// Returns whether the status changed.
    pub fn publish(&self, status: CallStatus) -> bool {
        let changed = self.latest.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        if changed {
            debug!(label = status.label, incoming = status.incoming_call, "Status published");
            // No live stream subscribers is fine
            let _ = self.updates.send(status);
        }

        changed
    }

    /// Current status
    pub fn current(&self) -> CallStatus {
        *self.latest.borrow()
    }

    /// Last-value receiver
    pub fn subscribe(&self) -> watch::Receiver<CallStatus> {
        self.latest.subscribe()
    }

    /// Ordered stream of every status published from now on
    pub fn updates(&self) -> broadcast::Receiver<CallStatus> {
        self.updates.subscribe()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::state::CallState;

    #[test]
    fn test_publish_dedupes() {
        let publisher = StatusPublisher::new();
        let mut updates = publisher.updates();

        assert!(!publisher.publish(CallStatus::default()));
        assert!(publisher.publish(CallStatus::new(CallState::Calling, false)));
        assert!(!publisher.publish(CallStatus::new(CallState::Calling, false)));

        assert_eq!(updates.try_recv().unwrap().label, "Calling...");
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_sees_latest() {
        let publisher = StatusPublisher::new();
        let mut latest = publisher.subscribe();

        publisher.publish(CallStatus::new(CallState::ConnectingToServer, false));
        publisher.publish(CallStatus::new(CallState::ServerConnected, false));

        latest.changed().await.unwrap();
        assert_eq!(latest.borrow().label, "Server Connected");
        assert_eq!(publisher.current().label, "Server Connected");
    }
}
