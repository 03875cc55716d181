//! Event Bus (§4.5): fans `TentacleEvent`s out to every connected websocket
//! client via a broadcast channel. Implements `Observer` so the core never
//! references this crate.

use tentacle_core::events::{Observer, TentacleEvent};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// Broadcast-channel-backed `Observer`. Cloning shares the same underlying
/// channel; subscribers that fall more than `CHANNEL_CAPACITY` events behind
/// silently miss the oldest ones rather than blocking publishers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TentacleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TentacleEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for EventBus {
    fn notify(&self, event: TentacleEvent) {
        // No subscribers is the common case at startup; swallow per §5/§7
        // ("broadcast failures are logged and swallowed").
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tentacle_core::events::{StatusSnapshot, TriState};

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.notify(TentacleEvent::StatusUpdate(StatusSnapshot {
            branch: "main".to_string(),
            build_status: TriState::Success,
            start_status: TriState::Unknown,
        }));

        let received = rx.recv().await.unwrap();
        match received {
            TentacleEvent::StatusUpdate(snap) => assert_eq!(snap.branch, "main"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn notify_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.notify(TentacleEvent::StatusUpdate(StatusSnapshot {
            branch: "main".to_string(),
            build_status: TriState::Unknown,
            start_status: TriState::Unknown,
        }));
    }
}
