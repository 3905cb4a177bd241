use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::Notify;

/// Cancellation signal handed to the async function for one Attempt.
///
/// The function may `select!` on [`CancelSignal::cancelled`] to return early,
/// but the core never trusts it to: correctness is enforced independently by
/// comparing the Attempt token against `inFlight` once the function resolves
/// (see [`crate::execution::FixedExecution`]).
#[derive(Clone)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once `cancel` has been called on the owning Attempt.
    ///
    /// Takes `self` by value (cloning is cheap) so the returned future owns
    /// everything it borrows instead of tying its lifetime to a temporary.
    pub async fn cancelled(self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
