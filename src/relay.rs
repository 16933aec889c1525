//! Relay Session: the TCP media channel to the relay server, grounded in
//! `RelayManager.cpp`/`RelaySocketWorker.cpp` from the original program.
//! Owns the encoder pipeline, the input sink, and the clipboard bridge for
//! exactly one relay connection; the Rendezvous Client owns this and
//! recreates it fresh on every `PunchHole` that reports the relay online,
//! never the other way around.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::clipboard::{ClipboardBridge, OutboundClipboard};
use crate::encoder::EncoderPipeline;
use crate::endpoint::Endpoint;
use crate::events::{AgentEvent, EventBus};
use crate::framing::{self, FrameDecoder};
use crate::input::{InputSink, PlatformInputSink};
use crate::protocol::{self, relay_message};

/// Upper bound the teacher's `RelayManager::stop()` applies to each
/// sub-component's shutdown wait before forcing it.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// `RelayManager::start`'s connect timeout before giving up on this relay
/// attempt entirely.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Disable Nagle and turn on OS-level keepalive, matching
/// `RelayManager::start`'s "keepalive and low-delay" socket setup. Tokio's
/// `TcpStream` has no direct keepalive knob, so this goes through `socket2`
/// on the stream's raw handle, the same pattern as the example RDP client's
/// `session_runner.rs` connect path.
fn tune_socket(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));

    #[cfg(unix)]
    let sock = {
        use std::os::unix::io::AsRawFd;
        unsafe { socket2::Socket::from_raw_fd(stream.as_raw_fd()) }
    };
    #[cfg(windows)]
    let sock = {
        use std::os::windows::io::AsRawSocket;
        unsafe { socket2::Socket::from_raw_socket(stream.as_raw_socket()) }
    };

    let result = sock.set_tcp_keepalive(&keepalive);
    // The `Socket` does not own the underlying fd/handle; forget it so
    // dropping it does not close the connection out from under `stream`.
    std::mem::forget(sock);
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaySessionState {
    Absent,
    Connecting,
    Active,
}

enum Command {
    Stop,
}

pub struct RelaySession {
    events: EventBus,
    cmd_tx: Option<mpsc::Sender<Command>>,
    task: Option<tokio::task::JoinHandle<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

impl RelaySession {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            cmd_tx: None,
            task: None,
            done_rx: None,
        }
    }

    pub fn start(&mut self, relay: Endpoint, uuid: String) {
        if self.cmd_tx.is_some() {
            return;
        }

        self.events
            .publish(AgentEvent::RelaySessionState(RelaySessionState::Connecting));

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (done_tx, done_rx) = oneshot::channel();
        let events = self.events.clone();
        let task = tokio::spawn(run_session(relay, uuid, events, cmd_rx, done_tx));
        self.cmd_tx = Some(cmd_tx);
        self.task = Some(task);
        self.done_rx = Some(done_rx);
    }

    /// Resolves once the session's run loop has ended for any reason —
    /// an explicit [`stop`](Self::stop) or a spontaneous relay-socket
    /// disconnect — matching `PeerClient::onRelayDisconnected()`'s signal.
    /// Pends forever once no session has ever been started, or the prior
    /// signal has already been consumed.
    pub async fn wait_disconnected(&mut self) {
        match self.done_rx.as_mut() {
            Some(rx) => {
                let _ = rx.await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Stop the relay socket/IO task, bounded by [`STOP_GRACE`] before
    /// forcing it — the encoder and clipboard bound and terminate
    /// themselves inside the task, mirroring `RelayManager::stop()`'s three
    /// independent `wait(3000)`/`terminate()` pairs.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Stop).await;
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                self.events
                    .error("relay session task did not stop in time, forcing termination");
                task.abort();
            }
        }
        self.done_rx = None;
        self.events
            .publish(AgentEvent::RelaySessionState(RelaySessionState::Absent));
    }
}

async fn run_session(
    relay: Endpoint,
    uuid: String,
    events: EventBus,
    cmd_rx: mpsc::Receiver<Command>,
    done_tx: oneshot::Sender<()>,
) {
    run_session_inner(relay, uuid, events, cmd_rx).await;
    // Unconditional: fires whether the loop below exited via an explicit
    // Stop command, a socket error, or connect failure.
    let _ = done_tx.send(());
}

async fn run_session_inner(
    relay: Endpoint,
    uuid: String,
    events: EventBus,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let mut stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(relay.addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            events.error(format!("relay connect failed: {e}"));
            events.publish(AgentEvent::RelaySessionState(RelaySessionState::Absent));
            return;
        }
        Err(_) => {
            events.error("relay connect timed out");
            events.publish(AgentEvent::RelaySessionState(RelaySessionState::Absent));
            return;
        }
    };

    if let Err(e) = tune_socket(&stream) {
        events.error(format!("failed to set relay socket options: {e}"));
    }

    let request = protocol::encode(&protocol::request_relay(&uuid));
    if framing::write_frame(&mut stream, &request).await.is_err() {
        events.error("failed to send RequestRelay");
        events.publish(AgentEvent::RelaySessionState(RelaySessionState::Absent));
        return;
    }

    events.publish(AgentEvent::RelaySessionState(RelaySessionState::Active));

    let input_sink = PlatformInputSink::new();
    let mut encoder = EncoderPipeline::new();
    let mut video_rx = encoder.start(events.clone());

    let mut clipboard = ClipboardBridge::new();
    let mut clip_rx = clipboard.start(events.clone());

    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(4096);
    let mut read_buf = [0u8; 4096];

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                if matches!(cmd, Some(Command::Stop) | None) {
                    break;
                }
            }
            frame = video_rx.recv() => {
                if let Some(encoded) = frame {
                    let msg = protocol::encode(&protocol::video_frame(encoded));
                    if framing::write_frame(&mut stream, &msg).await.is_err() {
                        events.error("failed to forward encoded video frame");
                        break;
                    }
                }
            }
            clip = clip_rx.recv() => {
                if let Some(payload) = clip {
                    let msg = match payload {
                        OutboundClipboard::Text(text) => protocol::clipboard_text(&text),
                        OutboundClipboard::File { name, bytes } => protocol::clipboard_file(&name, bytes),
                    };
                    let encoded = protocol::encode(&msg);
                    if framing::write_frame(&mut stream, &encoded).await.is_err() {
                        events.error("failed to forward clipboard event");
                        break;
                    }
                }
            }
            read = stream.read(&mut read_buf) => {
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.extend_from_slice(&read_buf[..n]);
                        loop {
                            match decoder.decode(&mut buf) {
                                Ok(Some(payload)) => {
                                    dispatch_relay_frame(&payload, &input_sink, &mut clipboard, &events);
                                }
                                Ok(None) => break,
                                Err(_) => {
                                    events.error("failed to decode relay frame");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        events.error(format!("relay socket error: {e}"));
                        break;
                    }
                }
            }
        }
    }

    // Encoder first, then clipboard, then the socket — matches
    // `RelayManager::stop()`'s ordering exactly.
    encoder.stop().await;
    clipboard.stop().await;
    drop(stream);
    events.publish(AgentEvent::RelaySessionState(RelaySessionState::Absent));
}

fn dispatch_relay_frame(
    payload: &[u8],
    input_sink: &PlatformInputSink,
    clipboard: &mut ClipboardBridge,
    events: &EventBus,
) {
    let msg = match protocol::decode_relay(payload) {
        Ok(msg) => msg,
        Err(_) => {
            events.error("malformed relay frame, skipping");
            return;
        }
    };

    match msg.union {
        Some(relay_message::Union::InputControlEvent(event)) => {
            input_sink.dispatch(event);
        }
        Some(relay_message::Union::ClipboardEvent(event)) => {
            clipboard.apply_remote(event);
        }
        Some(relay_message::Union::RequestRelay(_)) | Some(relay_message::Union::VideoFrame(_)) => {
            // This agent never receives its own outbound variants back.
        }
        None => {
            events.error("empty relay frame union");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_transitions_are_distinct() {
        assert_ne!(RelaySessionState::Absent, RelaySessionState::Active);
        assert_ne!(RelaySessionState::Connecting, RelaySessionState::Active);
    }

    #[tokio::test]
    async fn tune_socket_succeeds_on_a_connected_stream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let client = TcpStream::connect(addr).await.unwrap();
        let _server = accept.await.unwrap();

        assert!(tune_socket(&client).is_ok());
    }
}
