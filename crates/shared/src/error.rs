use thiserror::Error;

/// Failure to decode or encode a message exchanged with the device host.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}
