//! Timer plumbing over the tokio runtime.
//!
//! One-shot, periodic, and next-tick scheduling, each returning a
//! [`TimerToken`] that cancels the underlying task. [`StateHandle`]
//! (crate::StateHandle) collects these tokens so that leaving a state
//! cancels everything the state scheduled.

use std::time::Duration;
use tokio::task::JoinHandle;

/// Cancellable token for a scheduled callback.
///
/// Dropping the token does *not* cancel the timer; only
/// [`cancel`](TimerToken::cancel) does.
#[derive(Debug)]
pub struct TimerToken {
    task: JoinHandle<()>,
}

impl TimerToken {
    /// Cancel the scheduled callback. Idempotent; has no effect once the
    /// callback has already run.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

/// Run `f` once after `delay`.
///
/// Must be called from within a tokio runtime.
pub fn set_timeout<F>(delay: Duration, f: F) -> TimerToken
where
    F: FnOnce() + Send + 'static,
{
    TimerToken {
        task: tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }),
    }
}

/// Run `f` every `period`, starting one full period from now.
pub fn set_interval<F>(period: Duration, mut f: F) -> TimerToken
where
    F: FnMut() + Send + 'static,
{
    TimerToken {
        task: tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                ticks.tick().await;
                f();
            }
        }),
    }
}

/// Run `f` on a later scheduler turn, as soon as the runtime gets around
/// to it.
pub fn set_immediate<F>(f: F) -> TimerToken
where
    F: FnOnce() + Send + 'static,
{
    TimerToken {
        task: tokio::spawn(async move {
            f();
        }),
    }
}
