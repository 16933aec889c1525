//! Status/error observer surface that replaces the original GUI.
//!
//! Every component that used to emit a Qt signal into the status labels or
//! log pane instead publishes an [`AgentEvent`] onto a shared
//! `tokio::sync::broadcast` channel. Any number of observers — a test
//! harness, a future CLI status line, a sibling process — can subscribe;
//! none of them block the publisher.

use tokio::sync::broadcast;

use crate::relay::RelaySessionState;
use crate::rendezvous::SessionState;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The rendezvous registration state machine moved to a new state.
    RendezvousState(SessionState),
    /// Result code from a `RegisterPeerResponse`; `0` is success.
    RegistrationResult(i32),
    /// The relay liveness prober flipped `RelayStatus`.
    RelayOnline(bool),
    /// The relay session's lifecycle state changed.
    RelaySessionState(RelaySessionState),
    /// A non-fatal error surfaced by any component; the core never swallows
    /// these silently.
    Error(String),
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns the number of live subscribers. Publishing
    /// with zero subscribers is not an error — the bus is fire-and-forget.
    pub fn publish(&self, event: AgentEvent) {
        let _ = self.sender.send(event);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.publish(AgentEvent::Error(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(AgentEvent::RegistrationResult(0));
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, AgentEvent::RegistrationResult(0)));
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(AgentEvent::RegistrationResult(0));
    }
}
