//! Countdown timer driving round timeouts.
//!
//! Runs as a dedicated task (§5): on expiry it notifies its owner, which takes the
//! engine lock and calls `send_timeout`. Resetting the timer (on every `set_new_round`)
//! does not cancel and restart the task — it just bumps a generation counter the task
//! checks after sleeping, so a timer that fires right as it's being reset harmlessly
//! no-ops instead of racing a fresh sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Resettable countdown. Call [`CountdownTimer::spawn`] once; call
/// [`CountdownTimer::reset`] on every round change.
pub struct CountdownTimer {
    generation: Arc<AtomicU64>,
    reset_notify: Arc<Notify>,
    duration: Mutex<Duration>,
}

use parking_lot::Mutex;

impl CountdownTimer {
    pub fn new(initial_duration: Duration) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            reset_notify: Arc::new(Notify::new()),
            duration: Mutex::new(initial_duration),
        }
    }

    /// Re-arm the timer with `duration`, invalidating any in-flight sleep from a
    /// previous generation.
    pub fn reset(&self, duration: Duration) {
        *self.duration.lock() = duration;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.reset_notify.notify_waiters();
    }

    /// Spawn the background task. `on_expire` is invoked (via the returned receiver)
    /// each time the timer runs out without being reset first; the caller is
    /// responsible for taking the engine lock before acting on it.
    pub fn spawn(self: &Arc<Self>) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let generation = this.generation.load(Ordering::SeqCst);
                let duration = *this.duration.lock();
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        if this.generation.load(Ordering::SeqCst) == generation {
                            if tx.send(()).is_err() {
                                break;
                            }
                        }
                    }
                    _ = this.reset_notify.notified() => {}
                }
            }
        });
        rx
    }
}
