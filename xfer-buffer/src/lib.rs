//! Adaptive chunk-size controller (§4.D): a Bandwidth-Delay Product based,
//! trend-aware, damped buffer manager. Picks a chunk size that keeps the
//! pipe full without wasting memory or oscillating under noisy samples.

mod error;
mod manager;

pub use error::BufferError;
pub use manager::{AdaptationStrategy, BufferManager, BufferManagerConfig, Metrics, Trend};
