//! Wires the Rendezvous Client, Relay Prober, config, and shared-memory
//! handoff together. Owned exclusively by `main`; nothing else constructs
//! these components, which is how the Rendezvous Client -> Relay Session
//! cyclic back-reference present in the original gets broken into a clean
//! one-way ownership chain here instead.

use tokio::time::sleep;

use crate::config::AgentConfig;
use crate::endpoint::Endpoint;
use crate::events::EventBus;
use crate::handoff;
use crate::prober::RelayProber;
use crate::rendezvous::{RelayStatus, RendezvousClient};

pub struct Supervisor {
    rendezvous: RendezvousClient,
    prober: RelayProber,
    events: EventBus,
}

impl Supervisor {
    pub fn new(config: &AgentConfig) -> Self {
        let events = EventBus::new();
        let relay_status = RelayStatus::default();
        relay_status.set_relay_info(config.relay.clone());

        let rendezvous = RendezvousClient::new(config.uuid.clone(), relay_status.clone(), events.clone());
        let prober = RelayProber::new(relay_status, events.clone());

        Self {
            rendezvous,
            prober,
            events,
        }
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Resolve endpoints and start both long-running components, then
    /// schedule the handoff-record write 7s after start, matching the
    /// original's auto-start timer chain.
    pub async fn start(&mut self, config: AgentConfig) {
        let server = match Endpoint::resolve(&config.server.ip, config.server.port) {
            Ok(ep) => ep,
            Err(e) => {
                self.events.error(format!("invalid server endpoint: {e}"));
                return;
            }
        };
        let relay = match Endpoint::resolve(&config.relay.ip, config.relay.port) {
            Ok(ep) => ep,
            Err(e) => {
                self.events.error(format!("invalid relay endpoint: {e}"));
                return;
            }
        };

        self.rendezvous.start(server);
        if let Err(e) = self.prober.start(relay).await {
            self.events.error(format!("failed to start relay prober: {e}"));
        }

        let events = self.events.clone();
        tokio::spawn(async move {
            sleep(handoff::HANDOFF_WRITE_DELAY).await;
            if let Err(e) = handoff::write_handoff_record(&config) {
                events.error(format!("failed to write handoff record: {e}"));
            }
        });
    }

    /// Order mirrors [`crate::relay::RelaySession::stop`]'s contract,
    /// extended one level up: prober first (it only ever reads shared
    /// status), then the rendezvous client, which tears down its owned
    /// relay session on its own.
    pub async fn stop(&mut self) {
        self.prober.stop().await;
        self.rendezvous.stop().await;
    }
}
