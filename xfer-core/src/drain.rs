//! Graceful shutdown primitive: a trigger/watcher pair.
//!
//! Adapted from the sibling gateway-style projects in this tree, minus the
//! hyper-specific connection-wrapping half (this workspace has no HTTP
//! connections to gracefully half-close -- just TCP sessions that poll a
//! cancel flag between frames, see `xfer_engine::cancel`).

use std::time::Duration;

pub use internal::{DrainMode, Signal as DrainTrigger, Watch as DrainWatcher};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, warn};

/// Constructs a new drain pair.
/// * [`DrainTrigger`] starts a drain and waits for it to complete.
/// * [`DrainWatcher`] should be held by anything that wants to participate.
///   It can be cloned; the drain will not complete until every clone is
///   dropped.
pub fn new() -> (DrainTrigger, DrainWatcher) {
    internal::channel()
}

/// Runs a future with graceful-shutdown support. The caller's future takes
/// two arguments:
/// * `drain`: while held, the future is marked active and blocks the
///   owning component from completing its drain. Can be watched with
///   `drain.wait_for_drain()` to learn when to start winding down.
/// * `force_shutdown`: fired when the graceful deadline is exceeded; any
///   outstanding work must terminate immediately.
pub async fn run_with_drain<F, O>(component: String, drain: DrainWatcher, deadline: Duration, make_future: F)
where
    F: AsyncFnOnce(DrainWatcher, watch::Receiver<()>) -> O,
    O: Send + 'static,
{
    let (sub_drain_signal, sub_drain) = new();
    let (trigger_force_shutdown, force_shutdown) = watch::channel(());
    let trigger_force_shutdown_cpy = trigger_force_shutdown.clone();

    let fut = make_future(sub_drain, force_shutdown).in_current_span();
    let watch = async move {
        let res = drain.wait_for_drain().await;
        if res.mode() == DrainMode::Graceful {
            info!(component, "drain started, waiting {:?} for any sessions to complete", deadline);
            if tokio::time::timeout(deadline, sub_drain_signal.start_drain_and_wait(DrainMode::Graceful))
                .await
                .is_err()
            {
                warn!(component, "drain duration expired with pending sessions, forcing shutdown");
            }
        } else {
            debug!(component, "terminating");
        }
        let _ = trigger_force_shutdown.send(());
        info!(component, "shutdown complete");
    };
    tokio::select! {
        _ = fut => {
            let _ = trigger_force_shutdown_cpy.send(());
        },
        _ = watch => {}
    }
}

mod internal {
    use tokio::sync::{mpsc, watch};

    pub fn channel() -> (Signal, Watch) {
        let (signal_tx, signal_rx) = watch::channel(None);
        let (drained_tx, drained_rx) = mpsc::channel(1);
        (
            Signal { drained_rx, signal_tx },
            Watch { drained_tx, signal_rx },
        )
    }

    enum Never {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum DrainMode {
        Immediate,
        Graceful,
    }

    /// Sends a drain command to all watchers.
    pub struct Signal {
        drained_rx: mpsc::Receiver<Never>,
        signal_tx: watch::Sender<Option<DrainMode>>,
    }

    /// Watches for a drain command. Every clone must be dropped for the
    /// matching [`Signal::start_drain_and_wait`] call to complete.
    #[derive(Clone)]
    pub struct Watch {
        drained_tx: mpsc::Sender<Never>,
        signal_rx: watch::Receiver<Option<DrainMode>>,
    }

    #[must_use = "ReleaseShutdown should be dropped explicitly to release the drain"]
    #[derive(Clone)]
    #[allow(dead_code)]
    pub struct ReleaseShutdown(mpsc::Sender<Never>, DrainMode);

    impl ReleaseShutdown {
        pub fn mode(&self) -> DrainMode {
            self.1
        }
    }

    impl Signal {
        pub async fn closed(&mut self) {
            self.signal_tx.closed().await;
        }

        pub fn count(&self) -> usize {
            self.signal_tx.receiver_count()
        }

        /// Signals all watchers to begin draining and waits for all handles
        /// to be released.
        pub async fn start_drain_and_wait(mut self, mode: DrainMode) {
            let _ = self.signal_tx.send(Some(mode));
            match self.drained_rx.recv().await {
                None => {},
                Some(n) => match n {},
            }
        }
    }

    impl Watch {
        /// Returns a [`ReleaseShutdown`] handle once a drain has been
        /// signaled. Drop it when the in-flight work it guards has wound
        /// down.
        pub async fn wait_for_drain(mut self) -> ReleaseShutdown {
            let mode = self
                .signal_rx
                .wait_for(Option::is_some)
                .await
                .map(|mode| mode.expect("already asserted it is_some"))
                .unwrap_or(DrainMode::Immediate);
            ReleaseShutdown(self.drained_tx, mode)
        }
    }

    impl std::fmt::Debug for Signal {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Signal").finish_non_exhaustive()
        }
    }

    impl std::fmt::Debug for Watch {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Watch").finish_non_exhaustive()
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::drain;
    use crate::drain::DrainMode::Graceful;

    #[tokio::test]
    async fn drain_waits_for_all_watchers() {
        let (trigger, watcher) = drain::new();
        let completed = Arc::new(AtomicUsize::new(0));

        for i in 1..=3 {
            let watcher = watcher.clone();
            let completed = completed.clone();
            tokio::spawn(async move {
                let guard = watcher.wait_for_drain().await;
                tokio::time::sleep(std::time::Duration::from_millis(i * 5)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                drop(guard);
            });
        }
        drop(watcher);

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {
                panic!("timeout waiting for drain")
            },
            _ = trigger.start_drain_and_wait(Graceful) => {
                assert_eq!(completed.load(Ordering::SeqCst), 3);
            }
        }
    }

    #[tokio::test]
    async fn no_watchers_completes_immediately() {
        let (trigger, watcher) = drain::new();
        drop(watcher);
        trigger.start_drain_and_wait(Graceful).await;
    }
}
