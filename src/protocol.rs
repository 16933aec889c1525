//! Wire message types for the rendezvous, relay, and heartbeat channels.
//!
//! Generated from `protos/agent.proto` at build time via `prost_build`,
//! mirroring the teacher's `rustdesk/protocol.rs` codegen mechanism but
//! scoped to exactly the variants this agent's rendezvous/relay protocol
//! uses — no `RegisterPk`, `AddrMangle`, NAT-negotiation, or intranet
//! messages, none of which this agent's original program ever spoke.

use prost::Message;

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/agent.rs"));
}

pub use pb::{
    rendezvous_message, ClipboardEvent, ClipboardFile, Heartbeat, HeartbeatMessage,
    InputControlEvent, KeyboardEvent, MouseEvent, MouseMask, PunchHole, PunchHoleResult,
    PunchHoleSent, RegisterPeer, RegisterPeerResponse, RelayMessage, RelayRole, RendezvousMessage,
    RequestRelay, TouchEvent, TouchPhase, TouchPoint, VideoFrame,
};
pub use pb::{input_control_event, relay_message};

/// Encode any generated message to its length-free protobuf byte form; the
/// 4-byte frame prefix is added separately by [`crate::framing`].
pub fn encode<M: Message>(msg: &M) -> Vec<u8> {
    let mut buf = Vec::with_capacity(msg.encoded_len());
    msg.encode(&mut buf).expect("protobuf encoding is infallible for owned buffers");
    buf
}

pub fn decode_rendezvous(buf: &[u8]) -> Result<RendezvousMessage, prost::DecodeError> {
    RendezvousMessage::decode(buf)
}

pub fn decode_relay(buf: &[u8]) -> Result<RelayMessage, prost::DecodeError> {
    RelayMessage::decode(buf)
}

pub fn decode_heartbeat(buf: &[u8]) -> Result<HeartbeatMessage, prost::DecodeError> {
    HeartbeatMessage::decode(buf)
}

pub fn register_peer(uuid: &str) -> RendezvousMessage {
    RendezvousMessage {
        union: Some(rendezvous_message::Union::RegisterPeer(RegisterPeer {
            uuid: uuid.to_string(),
        })),
    }
}

pub fn punch_hole_sent_ok(id: &str, relay_server: &str, relay_port: u16) -> RendezvousMessage {
    RendezvousMessage {
        union: Some(rendezvous_message::Union::PunchHoleSent(PunchHoleSent {
            id: id.to_string(),
            relay_server: relay_server.to_string(),
            relay_port: relay_port as u32,
            result: PunchHoleResult::Ok as i32,
        })),
    }
}

pub fn punch_hole_sent_offline(id: &str) -> RendezvousMessage {
    RendezvousMessage {
        union: Some(rendezvous_message::Union::PunchHoleSent(PunchHoleSent {
            id: id.to_string(),
            relay_server: String::new(),
            relay_port: 0,
            result: PunchHoleResult::RelayOffline as i32,
        })),
    }
}

pub fn request_relay(uuid: &str) -> RelayMessage {
    RelayMessage {
        union: Some(relay_message::Union::RequestRelay(RequestRelay {
            uuid: uuid.to_string(),
            role: RelayRole::Server as i32,
        })),
    }
}

pub fn video_frame(data: Vec<u8>) -> RelayMessage {
    RelayMessage {
        union: Some(relay_message::Union::VideoFrame(VideoFrame { data })),
    }
}

pub fn clipboard_text(text: &str) -> RelayMessage {
    RelayMessage {
        union: Some(relay_message::Union::ClipboardEvent(ClipboardEvent {
            payload: Some(pb::clipboard_event::Payload::Text(text.to_string())),
        })),
    }
}

pub fn clipboard_file(name: &str, bytes: Vec<u8>) -> RelayMessage {
    RelayMessage {
        union: Some(relay_message::Union::ClipboardEvent(ClipboardEvent {
            payload: Some(pb::clipboard_event::Payload::File(ClipboardFile {
                name: name.to_string(),
                bytes,
            })),
        })),
    }
}

pub fn heartbeat() -> HeartbeatMessage {
    HeartbeatMessage {
        union: Some(pb::heartbeat_message::Union::Heartbeat(Heartbeat {})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_peer_round_trips() {
        let msg = register_peer("abc-123");
        let encoded = encode(&msg);
        let decoded = decode_rendezvous(&encoded).unwrap();
        match decoded.union {
            Some(rendezvous_message::Union::RegisterPeer(rp)) => assert_eq!(rp.uuid, "abc-123"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn punch_hole_sent_offline_round_trips() {
        let msg = punch_hole_sent_offline("42");
        let encoded = encode(&msg);
        let decoded = decode_rendezvous(&encoded).unwrap();
        match decoded.union {
            Some(rendezvous_message::Union::PunchHoleSent(p)) => {
                assert_eq!(p.id, "42");
                assert_eq!(p.result, PunchHoleResult::RelayOffline as i32);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn video_frame_round_trips() {
        let msg = video_frame(vec![1, 2, 3, 4]);
        let encoded = encode(&msg);
        let decoded = decode_relay(&encoded).unwrap();
        match decoded.union {
            Some(relay_message::Union::VideoFrame(v)) => assert_eq!(v.data, vec![1, 2, 3, 4]),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_round_trips() {
        let msg = heartbeat();
        let encoded = encode(&msg);
        let decoded = decode_heartbeat(&encoded).unwrap();
        assert!(matches!(
            decoded.union,
            Some(pb::heartbeat_message::Union::Heartbeat(_))
        ));
    }
}
