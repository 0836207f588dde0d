use tokio::sync::watch;

/// Cooperative cancellation signal threaded through adapter calls, sub-task
/// rounds, and scheduler workers (§5 "a cancellable context (deadline +
/// cancellation signal) threaded through every call"). Cloning a
/// [`CancelToken`] shares the same underlying signal; firing [`CancelSource::cancel`]
/// is visible to every clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

impl CancelSource {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    /// A token that never fires, for call sites with no enclosing turn to
    /// cancel from (e.g. standalone tests).
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled. Intended for use in
    /// `tokio::select!` alongside the work being cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_the_source_wakes_every_clone() {
        let (source, token) = cancel_pair();
        let token2 = token.clone();
        assert!(!token.is_cancelled());
        source.cancel();
        token2.cancelled().await;
        assert!(token.is_cancelled());
    }
}
