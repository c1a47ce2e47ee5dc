use tokio::sync::watch;

/// Cooperative cancellation, polled between frame boundaries on both
/// engines (§5). Built on a `watch` channel rather than a custom flag so
/// a cancelled session can also be `select!`-ed on directly if a future
/// caller wants to preempt a long-running I/O op, not just poll it.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

/// Constructs a new cancel trigger/token pair, analogous in shape to
/// `xfer_core::drain::new` but scoped to a single session rather than
/// process-wide shutdown.
pub fn cancel_pair() -> (CancelTrigger, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelTrigger { tx }, CancelToken { rx })
}

impl CancelTrigger {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Never resolves if the token is never cancelled for the lifetime of
    /// its trigger; intended for `tokio::select!` against a socket read.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|c| *c).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        cancel_pair().1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_observed_by_every_clone() {
        let (trigger, token) = cancel_pair();
        let mut token2 = token.clone();
        assert!(!token.is_cancelled());
        trigger.cancel();
        assert!(token.is_cancelled());
        token2.cancelled().await;
    }
}
