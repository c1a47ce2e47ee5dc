use std::time::Duration;

/// Errors surfaced by the Frame Codec and Stream I/O. Per the error
/// taxonomy, only `Io` and `Protocol` ever originate here; `Cancelled`,
/// `Config`, and `Peer` are assembled by higher layers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed unexpectedly mid-frame")]
    UnexpectedEof,

    #[error("operation exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("stalled: no byte progress for {0:?}")]
    Stalled(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        TransportError::Protocol(msg.into())
    }
}
