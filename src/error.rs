//! Agent-wide error taxonomy.
//!
//! One variant per failure domain from the error handling design, mirroring
//! the teacher's `AppError` shape (`#[from]` for mechanical conversions,
//! structured fields where a bare string loses information) but without the
//! axum `IntoResponse` coupling — this agent has no HTTP surface, so errors
//! are reported as `AgentEvent::Error` over the status broadcast channel
//! instead of turned into a response body.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("transient I/O error: {0}")]
    Transient(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] prost::DecodeError),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("input injection error: {0}")]
    Input(String),

    #[error("clipboard error: {0}")]
    Clipboard(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Transient(_)));
    }
}
