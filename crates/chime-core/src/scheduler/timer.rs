//! Scheduled-task abstraction over the runtime's timer facilities.
//!
//! `arm` delays a future and returns a handle that can cancel it. The rest
//! of the scheduler talks to this interface only, never to a timer library
//! directly.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to an armed timer. Dropping the handle does NOT cancel the timer;
/// call [`TimerHandle::cancel`] explicitly.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Disarm the timer. Safe to call after the timer has fired (no-op).
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the armed future has run to completion (or was cancelled).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Arm a timer: after `delay`, run `task` to completion.
///
/// A zero delay fires on the next scheduler tick, which is how overdue jobs
/// execute "immediately" at startup.
pub fn arm<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        task.await;
    });

    TimerHandle { task }
}
