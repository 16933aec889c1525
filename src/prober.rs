//! Relay Liveness Prober: a 5-second UDP heartbeat against the relay server,
//! grounded in `RelayPeerClient.cpp` from the original program. One missed
//! reply — not a run of misses — is enough to flip the shared `RelayStatus`
//! offline; a single late reply is enough to flip it back on.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::endpoint::Endpoint;
use crate::events::{AgentEvent, EventBus};
use crate::protocol;
use crate::rendezvous::RelayStatus;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

enum Command {
    Stop,
}

/// Owns the UDP socket and heartbeat timer; reports liveness into a shared
/// [`RelayStatus`] that the Rendezvous Client reads when answering punch-holes.
pub struct RelayProber {
    relay_status: RelayStatus,
    events: EventBus,
    cmd_tx: Option<mpsc::Sender<Command>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RelayProber {
    pub fn new(relay_status: RelayStatus, events: EventBus) -> Self {
        Self {
            relay_status,
            events,
            cmd_tx: None,
            task: None,
        }
    }

    /// Bind a UDP socket, send the first heartbeat synchronously, then hand
    /// the timer/receive loop to a background task.
    pub async fn start(&mut self, relay: Endpoint) -> std::io::Result<()> {
        if self.cmd_tx.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(relay.addr).await?;
        let socket = Arc::new(socket);

        let alive = Arc::new(Mutex::new(true));
        send_heartbeat(&socket, &self.events).await;

        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let relay_status = self.relay_status.clone();
        let events = self.events.clone();

        let task = tokio::spawn(run_loop(socket, alive, relay_status, events, cmd_rx));
        self.cmd_tx = Some(cmd_tx);
        self.task = Some(task);
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Stop).await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn send_heartbeat(socket: &UdpSocket, events: &EventBus) {
    let encoded = protocol::encode(&protocol::heartbeat());
    if let Err(e) = socket.send(&encoded).await {
        events.error(format!("failed to send relay heartbeat: {e}"));
    }
}

async fn run_loop(
    socket: Arc<UdpSocket>,
    alive: Arc<Mutex<bool>>,
    relay_status: RelayStatus,
    events: EventBus,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let mut ticker = interval(HEARTBEAT_INTERVAL);
    ticker.tick().await; // absorb immediate first tick; we already sent one
    let mut buf = [0u8; 1024];

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                if matches!(cmd, Some(Command::Stop) | None) {
                    return;
                }
            }
            _ = ticker.tick() => {
                let was_alive = {
                    let mut guard = alive.lock();
                    let was = *guard;
                    *guard = false;
                    was
                };
                if !was_alive {
                    relay_status.set_online(false);
                    events.publish(AgentEvent::RelayOnline(false));
                    events.error("relay heartbeat not answered");
                }
                send_heartbeat(&socket, &events).await;
            }
            recv = socket.recv(&mut buf) => {
                match recv {
                    Ok(n) => {
                        if protocol::decode_heartbeat(&buf[..n]).is_ok() {
                            *alive.lock() = true;
                            let was_online = relay_status.is_online();
                            relay_status.set_online(true);
                            if !was_online {
                                events.publish(AgentEvent::RelayOnline(true));
                            }
                        }
                    }
                    Err(e) => {
                        events.error(format!("relay heartbeat socket error: {e}"));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heartbeat_round_trip_marks_alive() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let relay_status = RelayStatus::default();
        let events = EventBus::new();
        let mut prober = RelayProber::new(relay_status.clone(), events);

        let endpoint = Endpoint { addr: server_addr };
        prober.start(endpoint).await.unwrap();

        let mut buf = [0u8; 1024];
        let (n, client_addr) = server.recv_from(&mut buf).await.unwrap();
        assert!(protocol::decode_heartbeat(&buf[..n]).is_ok());

        let reply = protocol::encode(&protocol::heartbeat());
        server.send_to(&reply, client_addr).await.unwrap();

        // Give the background task a moment to process the reply.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(relay_status.is_online());

        prober.stop().await;
    }
}
