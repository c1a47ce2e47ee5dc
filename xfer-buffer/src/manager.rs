use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::BufferError;

pub const DEFAULT_MIN: usize = 4 * 1024;
pub const DEFAULT_MAX: usize = 16 * 1024 * 1024;
pub const DEFAULT_INITIAL: usize = 64 * 1024;
pub const DEFAULT_HISTORY: usize = 32;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);
const MIN_RTT_FLOOR: Duration = Duration::from_millis(10);
const DAMPING_ALPHA: f64 = 0.25;

/// One measured `(bytes, duration)` sample, timestamped on arrival.
#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: usize,
    duration: Duration,
    rate: f64, // bytes/sec
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
}

/// Strategy used by [`BufferManager::suggest_initial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptationStrategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

/// Construction-time configuration; validated once by
/// [`BufferManager::new`].
#[derive(Debug, Clone, Copy)]
pub struct BufferManagerConfig {
    pub min: usize,
    pub max: usize,
    pub initial: usize,
    pub history_size: usize,
    pub cooldown: Duration,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        BufferManagerConfig {
            min: DEFAULT_MIN,
            max: DEFAULT_MAX,
            initial: DEFAULT_INITIAL,
            history_size: DEFAULT_HISTORY,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Derived statistics over the retained sample history (§4.D.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub mean_rate: f64,
    pub peak_rate: f64,
    pub stability_score: f64,
    pub adjustments_per_minute: f64,
}

/// The adaptive chunk-size controller. `current` is always a power of two
/// within `[min, max]`; this invariant holds after every public method
/// returns.
pub struct BufferManager {
    min: usize,
    max: usize,
    current: usize,
    history_size: usize,
    cooldown: Duration,
    history: VecDeque<Sample>,
    last_adjust: Option<Instant>,
    rtt: Duration,
    adjustments: u64,
    created_at: Instant,
}

impl BufferManager {
    pub fn new(config: BufferManagerConfig) -> Result<Self, BufferError> {
        if config.min == 0 || config.max == 0 {
            return Err(BufferError::InvalidBounds {
                min: config.min,
                max: config.max,
            });
        }
        if config.min > config.max {
            return Err(BufferError::InvalidBounds {
                min: config.min,
                max: config.max,
            });
        }
        if !config.min.is_power_of_two() || !config.max.is_power_of_two() {
            let bad = if !config.min.is_power_of_two() { config.min } else { config.max };
            return Err(BufferError::NotPowerOfTwo(bad));
        }
        if config.history_size == 0 {
            return Err(BufferError::InvalidHistorySize);
        }
        let current = snap_to_power_of_two(config.initial, config.min, config.max);
        Ok(BufferManager {
            min: config.min,
            max: config.max,
            current,
            history_size: config.history_size,
            cooldown: config.cooldown,
            history: VecDeque::with_capacity(config.history_size),
            last_adjust: None,
            rtt: Duration::from_millis(50),
            adjustments: 0,
            created_at: Instant::now(),
        })
    }

    /// Supplies the latest externally-measured RTT (from the Latency
    /// Prober); used as the BDP multiplier in the next adjustment.
    pub fn set_rtt(&mut self, rtt: Duration) {
        self.rtt = rtt;
    }

    pub fn current_size(&self) -> usize {
        self.current
    }

    pub fn adjustment_count(&self) -> u64 {
        self.adjustments
    }

    /// Appends `(bytes, duration)` to the history, evicting the oldest
    /// sample once over capacity.
    pub fn record(&mut self, bytes: usize, duration: Duration) {
        self.record_at(Instant::now(), bytes, duration);
    }

    fn record_at(&mut self, now: Instant, bytes: usize, duration: Duration) {
        let rate = if duration.as_secs_f64() > 0.0 {
            bytes as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        if self.history.len() >= self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(Sample { at: now, bytes, duration, rate });
    }

    /// Runs the full control loop described in §4.D.3: append the sample,
    /// rate-limit, classify the trend, compute a BDP target, damp toward
    /// it, snap to a power of two, clamp, and (unless within cooldown)
    /// advance `current`.
    pub fn adaptive_adjust(&mut self, bytes: usize, duration: Duration) -> usize {
        self.adaptive_adjust_at(Instant::now(), bytes, duration)
    }

    fn adaptive_adjust_at(&mut self, now: Instant, bytes: usize, duration: Duration) -> usize {
        self.record_at(now, bytes, duration);

        if let Some(last) = self.last_adjust {
            if now.saturating_duration_since(last) < self.cooldown {
                trace!(current = self.current, "buffer adjust skipped: within cooldown");
                return self.current;
            }
        }

        if self.history.len() < 3 {
            return self.current;
        }

        let trend = self.classify_trend();
        let latest_rate = self.history.back().map(|s| s.rate).unwrap_or(0.0);
        let rtt = self.rtt.max(MIN_RTT_FLOOR);
        let bdp = latest_rate * rtt.as_secs_f64();
        let factor = match trend {
            Trend::Improving => 1.4,
            Trend::Degrading => 0.7,
            Trend::Stable => 1.1,
        };
        let target = (bdp * factor).clamp(self.min as f64, self.max as f64);
        let damped = self.current as f64 + (target - self.current as f64) * DAMPING_ALPHA;
        let next = snap_to_power_of_two(damped.round().max(0.0) as usize, self.min, self.max);

        self.last_adjust = Some(now);
        self.adjustments += 1;
        if next != self.current {
            debug!(
                from = self.current,
                to = next,
                ?trend,
                bdp,
                "adjusted buffer size"
            );
            self.current = next;
        }
        self.current
    }

    fn classify_trend(&self) -> Trend {
        let len = self.history.len();
        let third = (len / 3).max(1);
        let older: Vec<f64> = self.history.iter().take(third).map(|s| s.rate).collect();
        let recent: Vec<f64> = self.history.iter().rev().take(third).map(|s| s.rate).collect();
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let older_mean = mean(&older);
        let recent_mean = mean(&recent);
        if older_mean <= 0.0 {
            return Trend::Stable;
        }
        if recent_mean > older_mean * 1.05 {
            Trend::Improving
        } else if recent_mean < older_mean * 0.95 {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }

    /// Rounds `size` to the nearest power of two within `[min, max]`.
    pub fn validate(&self, size: usize) -> usize {
        snap_to_power_of_two(size, self.min, self.max)
    }

    pub fn metrics(&self) -> Metrics {
        if self.history.is_empty() {
            return Metrics {
                mean_rate: 0.0,
                peak_rate: 0.0,
                stability_score: 1.0,
                adjustments_per_minute: 0.0,
            };
        }
        let rates: Vec<f64> = self.history.iter().map(|s| s.rate).collect();
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        let peak = rates.iter().cloned().fold(0.0, f64::max);
        let variance = if rates.len() > 1 {
            rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rates.len() as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let coef_of_variation = if mean > 0.0 { std_dev / mean } else { 0.0 };
        let stability = (1.0 - coef_of_variation).clamp(0.0, 1.0);

        let elapsed_minutes = self.created_at.elapsed().as_secs_f64() / 60.0;
        let adjustments_per_minute = if elapsed_minutes > 0.0 {
            self.adjustments as f64 / elapsed_minutes
        } else {
            0.0
        };

        Metrics {
            mean_rate: mean,
            peak_rate: peak,
            stability_score: stability,
            adjustments_per_minute,
        }
    }

    /// Suggests an initial chunk size from an RTT bucket crossed with a
    /// strategy (§4.D supplement table, resolving the spec's open
    /// question -- see DESIGN.md).
    pub fn suggest_initial(rtt: Duration, strategy: AdaptationStrategy) -> usize {
        let millis = rtt.as_secs_f64() * 1000.0;
        let bucket = if millis < 20.0 {
            RttBucket::Excellent
        } else if millis < 50.0 {
            RttBucket::Good
        } else if millis < 150.0 {
            RttBucket::Fair
        } else {
            RttBucket::Poor
        };
        use AdaptationStrategy::*;
        use RttBucket::*;
        let kib = 1024;
        let size = match (bucket, strategy) {
            (Excellent, Conservative) => 64 * kib,
            (Excellent, Balanced) => 128 * kib,
            (Excellent, Aggressive) => 256 * kib,
            (Good, Conservative) => 64 * kib,
            (Good, Balanced) => 64 * kib,
            (Good, Aggressive) => 128 * kib,
            (Fair, Conservative) => 32 * kib,
            (Fair, Balanced) => 64 * kib,
            (Fair, Aggressive) => 64 * kib,
            (Poor, Conservative) => 32 * kib,
            (Poor, Balanced) => 32 * kib,
            (Poor, Aggressive) => 64 * kib,
        };
        snap_to_power_of_two(size, DEFAULT_MIN, DEFAULT_MAX)
    }
}

#[derive(Debug, Clone, Copy)]
enum RttBucket {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Rounds to the nearest power of two, then clamps into `[min, max]`.
/// `min`/`max` are themselves required to already be powers of two
/// (checked at construction), so the clamp cannot itself break the
/// invariant.
fn snap_to_power_of_two(size: usize, min: usize, max: usize) -> usize {
    let size = size.max(1);
    // Short-circuit the extremes: avoids computing `lower << 1` on a value
    // close to `usize::MAX`, which would overflow.
    if size <= min {
        return min;
    }
    if size >= max {
        return max;
    }
    let lower = 1usize << size.ilog2();
    let upper = lower << 1;
    let snapped = if size - lower <= upper - size { lower } else { upper };
    snapped.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> BufferManager {
        BufferManager::new(BufferManagerConfig::default()).unwrap()
    }

    #[test]
    fn rejects_non_power_of_two_bounds() {
        let err = BufferManager::new(BufferManagerConfig {
            min: 4000,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, BufferError::NotPowerOfTwo(_)));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = BufferManager::new(BufferManagerConfig {
            min: 1024 * 1024,
            max: 4096,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, BufferError::InvalidBounds { .. }));
    }

    #[test]
    fn initial_size_is_clamped_and_snapped() {
        let mgr = BufferManager::new(BufferManagerConfig {
            initial: 100_000,
            ..Default::default()
        })
        .unwrap();
        assert!(mgr.current_size().is_power_of_two());
    }

    #[test]
    fn validate_snaps_to_nearest_power_of_two_in_range() {
        let mgr = manager();
        assert_eq!(mgr.validate(70_000), 65536);
        assert_eq!(mgr.validate(1), DEFAULT_MIN);
        assert_eq!(mgr.validate(usize::MAX), DEFAULT_MAX);
    }

    #[test]
    fn fewer_than_three_samples_is_a_no_op() {
        let mut mgr = manager();
        let before = mgr.current_size();
        let t0 = Instant::now();
        assert_eq!(mgr.adaptive_adjust_at(t0, 65536, Duration::from_millis(500)), before);
        assert_eq!(
            mgr.adaptive_adjust_at(t0 + Duration::from_millis(1100), 65536, Duration::from_millis(500)),
            before
        );
    }

    #[test]
    fn cooldown_blocks_adjustment_within_one_second() {
        let mut mgr = manager();
        let t0 = Instant::now();
        mgr.adaptive_adjust_at(t0, 65536, Duration::from_millis(100));
        mgr.adaptive_adjust_at(t0 + Duration::from_millis(10), 65536, Duration::from_millis(100));
        let before = mgr.adaptive_adjust_at(t0 + Duration::from_millis(20), 65536, Duration::from_millis(100));
        // A fourth sample arriving <1s after the last adjustment must not move `current`.
        let after = mgr.adaptive_adjust_at(t0 + Duration::from_millis(900), 65536, Duration::from_millis(100));
        assert_eq!(before, after);
    }

    #[test]
    fn stable_throughput_adjusts_within_one_power_of_two_step() {
        let mut mgr = manager();
        mgr.set_rtt(Duration::from_millis(50));
        let t0 = Instant::now();
        // ~65536 bytes every 100ms => ~655KB/s, stable across samples.
        for i in 0..4u32 {
            mgr.adaptive_adjust_at(t0 + Duration::from_millis(i as u64 * 1100), 65536, Duration::from_millis(100));
        }
        let size = mgr.current_size();
        assert!(
            [32 * 1024usize, 64 * 1024, 128 * 1024].contains(&size),
            "unexpected chunk size {size}"
        );
    }

    #[test]
    fn degrading_throughput_eventually_shrinks_current_but_never_below_min() {
        let mut mgr = BufferManager::new(BufferManagerConfig {
            initial: 1024 * 1024,
            ..Default::default()
        })
        .unwrap();
        mgr.set_rtt(Duration::from_millis(50));
        let mut rate_bytes = 1024 * 1024usize;
        let t0 = Instant::now();
        let start = mgr.current_size();
        for i in 0..20u32 {
            rate_bytes = (rate_bytes as f64 * 0.8) as usize;
            mgr.adaptive_adjust_at(
                t0 + Duration::from_millis(i as u64 * 1100),
                rate_bytes,
                Duration::from_millis(100),
            );
        }
        assert!(mgr.current_size() < start);
        assert!(mgr.current_size() >= DEFAULT_MIN);
    }

    #[test]
    fn metrics_report_zero_stability_noise_free_when_empty() {
        let mgr = manager();
        let m = mgr.metrics();
        assert_eq!(m.mean_rate, 0.0);
        assert_eq!(m.stability_score, 1.0);
    }

    #[test]
    fn suggest_initial_is_always_power_of_two() {
        for millis in [5, 30, 100, 300] {
            for strategy in [
                AdaptationStrategy::Conservative,
                AdaptationStrategy::Balanced,
                AdaptationStrategy::Aggressive,
            ] {
                let size = BufferManager::suggest_initial(Duration::from_millis(millis), strategy);
                assert!(size.is_power_of_two());
                assert!(size >= DEFAULT_MIN && size <= DEFAULT_MAX);
            }
        }
    }
}
