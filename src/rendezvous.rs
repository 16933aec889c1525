//! Rendezvous Client: durable registration with the rendezvous server and
//! punch-hole response, grounded directly in `PeerClient.cpp`/`.h` from the
//! original program (not the teacher's `RendezvousMediator`, whose
//! 12 s/backoff registration-keepalive loop and RustDesk key-confirmation
//! handshake belong to a different protocol generation than this agent
//! speaks).

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::config::EndpointConfig;
use crate::endpoint::Endpoint;
use crate::events::{AgentEvent, EventBus};
use crate::framing::{self, FrameDecoder};
use crate::protocol::{self, rendezvous_message};
use crate::relay::RelaySession;

/// Fixed reconnect interval, matching `m_reconnectTimer->setInterval(3000)`
/// in `PeerClient.cpp` — deliberately not the teacher's exponential backoff.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Bound on waiting for the registration loop task to stop before it is
/// aborted outright, matching the relay path's `STOP_GRACE`.
const STOP_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registered,
}

/// Shared, lock-guarded relay reachability, written by the Relay Prober and
/// read here when building a `PunchHoleSent` reply.
#[derive(Clone, Default)]
pub struct RelayStatus {
    inner: Arc<RwLock<RelayStatusInner>>,
}

#[derive(Default)]
struct RelayStatusInner {
    online: bool,
    relay: Option<EndpointConfig>,
}

impl RelayStatus {
    pub fn set_online(&self, online: bool) {
        self.inner.write().online = online;
    }

    pub fn set_relay_info(&self, relay: EndpointConfig) {
        self.inner.write().relay = Some(relay);
    }

    pub fn is_online(&self) -> bool {
        self.inner.read().online
    }

    pub fn relay_info(&self) -> Option<EndpointConfig> {
        self.inner.read().relay.clone()
    }
}

enum Command {
    Stop,
}

/// Rendezvous Client.
///
/// Owns the registration TCP connection/reconnect loop and the single Relay
/// Session it creates on punch-hole. The Supervisor starts and stops this;
/// nothing else reaches into it.
pub struct RendezvousClient {
    uuid: String,
    relay_status: RelayStatus,
    events: EventBus,
    cmd_tx: Option<mpsc::Sender<Command>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RendezvousClient {
    pub fn new(uuid: String, relay_status: RelayStatus, events: EventBus) -> Self {
        Self {
            uuid,
            relay_status,
            events,
            cmd_tx: None,
            task: None,
        }
    }

    pub fn set_relay_info(&self, relay: EndpointConfig) {
        self.relay_status.set_relay_info(relay);
    }

    pub fn set_relay_status(&self, online: bool) {
        self.relay_status.set_online(online);
    }

    /// Begin the connect/reconnect loop. Idempotent while already running.
    pub fn start(&mut self, endpoint: Endpoint) {
        if self.cmd_tx.is_some() {
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let uuid = self.uuid.clone();
        let relay_status = self.relay_status.clone();
        let events = self.events.clone();

        let task = tokio::spawn(run_loop(endpoint, uuid, relay_status, events, cmd_rx));
        self.cmd_tx = Some(cmd_tx);
        self.task = Some(task);
    }

    /// Request shutdown; guarantees release of the socket and cancellation of
    /// the reconnect timer before returning, aborting the loop task if it
    /// hasn't wound down within [`STOP_GRACE`].
    pub async fn stop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Stop).await;
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

async fn run_loop(
    endpoint: Endpoint,
    uuid: String,
    relay_status: RelayStatus,
    events: EventBus,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let mut state = SessionState::Disconnected;
    let mut relay_session: Option<RelaySession> = None;
    let mut retry = interval(RECONNECT_INTERVAL);
    retry.tick().await; // first tick fires immediately; absorb it

    loop {
        state = SessionState::Connecting;
        events.publish(AgentEvent::RendezvousState(state));

        tokio::select! {
            cmd = cmd_rx.recv() => {
                if matches!(cmd, Some(Command::Stop) | None) {
                    if let Some(mut session) = relay_session.take() {
                        session.stop().await;
                    }
                    return;
                }
            }
            _ = wait_relay_disconnect(&mut relay_session) => {
                events.error("relay session disconnected");
                relay_session = None;
            }
            connect = TcpStream::connect(endpoint.addr) => {
                match connect {
                    Ok(stream) => {
                        state = SessionState::Registered;
                        events.publish(AgentEvent::RendezvousState(state));
                        let outcome = session_loop(
                            stream,
                            &uuid,
                            &relay_status,
                            &events,
                            &mut relay_session,
                            &mut cmd_rx,
                        )
                        .await;
                        if outcome.is_stop() {
                            if let Some(mut session) = relay_session.take() {
                                session.stop().await;
                            }
                            return;
                        }
                        state = SessionState::Disconnected;
                        events.publish(AgentEvent::RendezvousState(state));
                    }
                    Err(e) => {
                        events.error(format!("rendezvous connect failed: {e}"));
                        state = SessionState::Disconnected;
                        events.publish(AgentEvent::RendezvousState(state));
                    }
                }
            }
        }

        // Rearm the fixed 3s retry timer on any path that didn't return.
        retry.tick().await;
    }
}

/// Awaits the current relay session's disconnect signal, or pends forever
/// when there is no session to watch.
async fn wait_relay_disconnect(relay_session: &mut Option<RelaySession>) {
    match relay_session {
        Some(session) => session.wait_disconnected().await,
        None => std::future::pending::<()>().await,
    }
}

enum LoopOutcome {
    Disconnected,
    Stop,
}

impl LoopOutcome {
    fn is_stop(&self) -> bool {
        matches!(self, LoopOutcome::Stop)
    }
}

/// Runs the Registered-state session over one TCP connection: sends
/// `RegisterPeer` exactly once, then dispatches inbound frames until the
/// socket drops or a `Stop` command arrives.
async fn session_loop(
    mut stream: TcpStream,
    uuid: &str,
    relay_status: &RelayStatus,
    events: &EventBus,
    relay_session: &mut Option<RelaySession>,
    cmd_rx: &mut mpsc::Receiver<Command>,
) -> LoopOutcome {
    let register = protocol::encode(&protocol::register_peer(uuid));
    if framing::write_frame(&mut stream, &register).await.is_err() {
        return LoopOutcome::Disconnected;
    }

    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(4096);
    let mut read_buf = [0u8; 4096];

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                if matches!(cmd, Some(Command::Stop) | None) {
                    return LoopOutcome::Stop;
                }
            }
            _ = wait_relay_disconnect(relay_session) => {
                // The relay socket dropped on its own, not via our Stop —
                // matches `PeerClient::onRelayDisconnected()` clearing
                // `m_relayManager` the instant that signal fires.
                events.error("relay session disconnected");
                *relay_session = None;
            }
            read = stream.read(&mut read_buf) => {
                match read {
                    Ok(0) => return LoopOutcome::Disconnected,
                    Ok(n) => {
                        buf.extend_from_slice(&read_buf[..n]);
                        loop {
                            match decoder.decode(&mut buf) {
                                Ok(Some(payload)) => {
                                    handle_frame(
                                        &payload,
                                        uuid,
                                        relay_status,
                                        events,
                                        relay_session,
                                        &mut stream,
                                    )
                                    .await;
                                }
                                Ok(None) => break,
                                Err(_) => {
                                    events.error("failed to decode rendezvous frame");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        events.error(format!("rendezvous socket error: {e}"));
                        return LoopOutcome::Disconnected;
                    }
                }
            }
        }
    }
}

async fn handle_frame(
    payload: &[u8],
    uuid: &str,
    relay_status: &RelayStatus,
    events: &EventBus,
    relay_session: &mut Option<RelaySession>,
    stream: &mut TcpStream,
) {
    let msg = match protocol::decode_rendezvous(payload) {
        Ok(msg) => msg,
        Err(_) => {
            events.error("malformed rendezvous frame, skipping");
            return;
        }
    };

    match msg.union {
        Some(rendezvous_message::Union::RegisterPeerResponse(resp)) => {
            events.publish(AgentEvent::RegistrationResult(resp.result));
            // result != 0 is a warning, not a reason to leave Registered.
        }
        Some(rendezvous_message::Union::PunchHole(hole)) => {
            let reply = if relay_status.is_online() {
                let relay = relay_status
                    .relay_info()
                    .unwrap_or_else(|| EndpointConfig {
                        ip: "127.0.0.1".to_string(),
                        port: 21117,
                    });
                protocol::punch_hole_sent_ok(&hole.id, &relay.ip, relay.port)
            } else {
                protocol::punch_hole_sent_offline(&hole.id)
            };

            let encoded = protocol::encode(&reply);
            if framing::write_frame(stream, &encoded).await.is_err() {
                events.error("failed to send PunchHoleSent reply");
                return;
            }

            if relay_status.is_online() {
                if let Some(mut prior) = relay_session.take() {
                    prior.stop().await;
                }
                let relay = relay_status.relay_info();
                if let Some(relay) = relay {
                    if let Ok(relay_addr) = Endpoint::resolve(&relay.ip, relay.port) {
                        let mut session = RelaySession::new(events.clone());
                        session.start(relay_addr, uuid.to_string());
                        *relay_session = Some(session);
                    }
                }
            }
        }
        Some(other) => {
            events.error(format!("unhandled rendezvous variant: {other:?}"));
        }
        None => {
            events.error("empty rendezvous frame union");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_status_defaults_offline() {
        let status = RelayStatus::default();
        assert!(!status.is_online());
        assert!(status.relay_info().is_none());
    }

    #[test]
    fn relay_status_round_trips() {
        let status = RelayStatus::default();
        status.set_online(true);
        status.set_relay_info(EndpointConfig {
            ip: "10.0.0.5".to_string(),
            port: 21117,
        });
        assert!(status.is_online());
        assert_eq!(status.relay_info().unwrap().ip, "10.0.0.5");
    }
}
