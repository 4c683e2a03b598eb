//! One-shot completion gate.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Boolean gate that flips from unset to set exactly once
///
/// Shared between the capture path, which sets it, and the session, which
/// waits on it.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    set: AtomicBool,
    notify: Notify,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform the unset to set transition
    ///
    /// Returns `true` only for the single caller that made the transition;
    /// every other caller, concurrent or later, gets `false`.
    pub fn try_set(&self) -> bool {
        let won = self
            .set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Resolve once the gate is set
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
