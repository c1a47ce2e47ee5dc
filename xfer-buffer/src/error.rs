/// The Buffer Manager only ever produces `Config` errors, and only at
/// construction (§7): invalid bounds or an invalid strategy.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("min_buffer_size ({min}) must be <= max_buffer_size ({max})")]
    InvalidBounds { min: usize, max: usize },

    #[error("buffer size {0} must be a positive power of two")]
    NotPowerOfTwo(usize),

    #[error("history_size must be at least 1")]
    InvalidHistorySize,
}
