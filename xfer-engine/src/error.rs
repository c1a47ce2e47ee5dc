use xfer_buffer::BufferError;
use xfer_transport::TransportError;

/// Errors surfaced by the Transfer Engine (§7). Wraps the lower layers'
/// errors rather than flattening them, so a caller can still match on
/// `Io` vs `Protocol` vs the engine-level `Peer`/`Cancelled` kinds.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(#[from] BufferError),

    #[error("peer reported an error: {0}")]
    Peer(String),
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => EngineError::Io(e.to_string()),
            TransportError::UnexpectedEof => EngineError::Io("connection closed unexpectedly mid-frame".to_string()),
            TransportError::Timeout(d) => EngineError::Io(format!("operation exceeded deadline of {d:?}")),
            TransportError::Stalled(d) => EngineError::Io(format!("stalled: no byte progress for {d:?}")),
            TransportError::Protocol(msg) => EngineError::Protocol(msg),
        }
    }
}

impl EngineError {
    /// A short, stable machine-readable kind, attached to the `TaskError`
    /// event published alongside this error (§7).
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Io(_) => "io",
            EngineError::Protocol(_) => "protocol",
            EngineError::Cancelled => "cancelled",
            EngineError::Config(_) => "config",
            EngineError::Peer(_) => "peer",
        }
    }
}
