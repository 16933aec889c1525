//! deskserver-agent - headless P2P remote-desktop host agent
//!
//! Registers with a rendezvous server, answers punch-hole requests, and
//! streams an H.264-encoded desktop plus input/clipboard over a relay TCP
//! connection once the rendezvous server has vouched for one.

pub mod clipboard;
pub mod config;
pub mod encoder;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod framing;
pub mod handoff;
pub mod input;
pub mod prober;
pub mod protocol;
pub mod relay;
pub mod rendezvous;
pub mod supervisor;

pub use error::{AgentError, Result};
