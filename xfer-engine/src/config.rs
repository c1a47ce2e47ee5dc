use std::time::Duration;

use serde::Deserialize;
use xfer_buffer::AdaptationStrategy;

/// Configuration recognized by the core (§6). An external collaborator
/// (CLI flags, a YAML file -- neither of which the core parses itself)
/// supplies this as a plain value; `xfer-engine` never opens a
/// configuration file on its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub initial_buffer_size: Option<usize>,
    pub min_buffer_size: usize,
    pub max_buffer_size: usize,
    pub history_size: usize,
    pub adjust_cooldown_sec: f64,
    pub adaptation_strategy: AdaptationStrategy,
    pub use_rich_progress: bool,
    pub control_frame_deadline_sec: f64,
    pub stall_deadline_sec: f64,
    pub connect_retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            initial_buffer_size: None,
            min_buffer_size: xfer_buffer::BufferManagerConfig::default().min,
            max_buffer_size: xfer_buffer::BufferManagerConfig::default().max,
            history_size: xfer_buffer::BufferManagerConfig::default().history_size,
            adjust_cooldown_sec: 1.0,
            adaptation_strategy: AdaptationStrategy::Balanced,
            use_rich_progress: true,
            control_frame_deadline_sec: 30.0,
            stall_deadline_sec: 60.0,
            connect_retries: 3,
        }
    }
}

impl TransferConfig {
    pub fn control_frame_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.control_frame_deadline_sec)
    }

    pub fn stall_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.stall_deadline_sec)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.adjust_cooldown_sec)
    }

    /// Derives the `xfer_buffer` construction config; `initial` is
    /// resolved by the caller once an RTT is known (either the configured
    /// override or `suggest_initial`).
    pub fn buffer_config(&self, initial: usize) -> xfer_buffer::BufferManagerConfig {
        xfer_buffer::BufferManagerConfig {
            min: self.min_buffer_size,
            max: self.max_buffer_size,
            initial,
            history_size: self.history_size,
            cooldown: self.cooldown(),
        }
    }
}
