//! Latency prober (§4.C): PING/PONG round-trip measurement with
//! statistical filtering (discard the max of `k` samples, average the
//! rest).

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::frame::Kind;
use crate::io::StreamIo;

/// Non-fatal default used whenever probing fails or is skipped.
pub const DEFAULT_RTT: Duration = Duration::from_millis(50);

/// Samples `k` PING/PONG round trips, discards the single worst sample,
/// and averages the rest. Errors from individual rounds (`Timeout`,
/// `Protocol`) are swallowed: probing is a best-effort optimization, never
/// a hard dependency for the handshake to proceed.
pub struct Prober {
    pub k: usize,
}

impl Default for Prober {
    fn default() -> Self {
        Prober { k: 3 }
    }
}

impl Prober {
    pub fn new(k: usize) -> Self {
        Prober { k: k.max(1) }
    }

    /// Runs the prober as the sender side: sends `PING`, awaits `PONG`,
    /// for each of `k` rounds. Returns [`DEFAULT_RTT`] if every round
    /// fails (e.g. the peer never replies).
    pub async fn probe<S: AsyncRead + AsyncWrite + Unpin>(&self, io: &mut StreamIo<S>) -> Duration {
        let mut samples = Vec::with_capacity(self.k);
        for attempt in 0..self.k {
            match self.sample_once(io).await {
                Ok(rtt) => samples.push(rtt),
                Err(e) => debug!(attempt, error = %e, "rtt probe round failed, skipping sample"),
            }
        }
        if samples.is_empty() {
            return DEFAULT_RTT;
        }
        samples.sort();
        samples.pop(); // discard the worst (max) sample
        if samples.is_empty() {
            return DEFAULT_RTT;
        }
        let total: Duration = samples.iter().sum();
        total / samples.len() as u32
    }

    async fn sample_once<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        io: &mut StreamIo<S>,
    ) -> Result<Duration, crate::TransportError> {
        let start = Instant::now();
        io.write_frame(Kind::Ping, &[]).await?;
        let frame = io.read_frame().await?;
        if frame.kind != Kind::Pong {
            return Err(crate::TransportError::protocol(format!(
                "expected PONG in response to PING, got {:?}",
                frame.kind
            )));
        }
        Ok(start.elapsed())
    }
}

/// Echoes `PING` with `PONG` immediately; the receiver side of a probe
/// round. Intended to be driven in a loop alongside normal frame
/// processing -- callers peek the frame kind first and dispatch here only
/// for `PING`.
pub async fn respond_to_ping<S: AsyncRead + AsyncWrite + Unpin>(io: &mut StreamIo<S>) -> Result<(), crate::TransportError> {
    io.write_frame(Kind::Pong, &[]).await
}

/// Convenience wrapper used by tests and the handshake: runs [`Prober`]
/// with the default sample count.
pub async fn probe_rtt<S: AsyncRead + AsyncWrite + Unpin>(io: &mut StreamIo<S>) -> Duration {
    Prober::default().probe(io).await
}
