use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Single-shot countdown that can be paused and resumed.
///
/// The countdown starts on construction and runs as a tokio task, so the
/// timer must be created inside a runtime. Dropping the timer cancels any
/// pending countdown.
pub struct PausableTimer {
    callback: Callback,
    remaining: Duration,
    started_at: Instant,
    pending: Option<JoinHandle<()>>,
}

impl PausableTimer {
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut timer = Self {
            callback: Arc::new(callback),
            remaining: delay,
            started_at: Instant::now(),
            pending: None,
        };
        timer.resume();
        timer
    }

    /// Freezes the countdown, keeping whatever time is left. No-op when
    /// already paused.
    pub fn pause(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
            self.remaining = self.remaining.saturating_sub(self.started_at.elapsed());
        }
    }

    /// (Re)starts the countdown for the stored remaining time.
    pub fn resume(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.started_at = Instant::now();
        let deadline = self.started_at.checked_add(self.remaining);
        let callback = Arc::clone(&self.callback);
        self.pending = Some(tokio::spawn(async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
            callback();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Time left on the countdown as of now.
    pub fn remaining(&self) -> Duration {
        if self.is_running() {
            self.remaining.saturating_sub(self.started_at.elapsed())
        } else if self.pending.is_some() {
            Duration::ZERO
        } else {
            self.remaining
        }
    }
}

impl Drop for PausableTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for PausableTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PausableTimer")
            .field("remaining", &self.remaining())
            .field("running", &self.is_running())
            .finish()
    }
}
