//! Delayed tasks for CONNACK/PINGRESP/operation timeouts (§4.3), scheduled
//! on the connection's I/O task.
//!
//! §9 DESIGN NOTES: the source uses a mutual nulling pointer pair so a
//! request and its timer can each free the other exactly once without a
//! use-after-free. The idiomatic Rust shape is a shared cell holding a
//! generation token: whichever side runs first atomically takes it, the
//! other becomes a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Shared between a `Request` and its `TimeoutTask`. `take()` is the
/// mutual-null: only the first caller (request completion or timer fire)
/// gets `true` back.
#[derive(Clone)]
pub struct TimeoutLink {
    fired: Arc<AtomicU64>,
    generation: u64,
}

impl TimeoutLink {
    fn new(generation: u64, fired: Arc<AtomicU64>) -> Self {
        TimeoutLink { fired, generation }
    }

    /// Returns true exactly once per generation: to whichever side (the
    /// owning `Request` completing normally, or the timer firing) calls it
    /// first.
    pub fn take(&self) -> bool {
        self.fired
            .compare_exchange(self.generation, self.generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// A handle to an armed timer. Dropping or calling `cancel` takes the link
/// so the timer's own fire-callback becomes a no-op; the underlying tokio
/// task is also aborted as a courtesy (not required for correctness, since
/// the link already short-circuits it).
pub struct TimerHandle {
    link: TimeoutLink,
    join: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(self) {
        self.link.take();
        self.join.abort();
    }

    pub fn link(&self) -> TimeoutLink {
        self.link.clone()
    }
}

/// Schedules delayed callbacks on the tokio runtime driving the I/O task.
/// There is one `TimerSet` per connection; it doesn't track timers beyond
/// handing back a `TimerHandle` the caller is responsible for holding (or
/// explicitly detaching) and a `TimeoutLink` for requests that need to
/// race completion against the deadline.
#[derive(Default)]
pub struct TimerSet;

impl TimerSet {
    pub fn new() -> TimerSet {
        TimerSet
    }

    /// Arms a one-shot timer. `on_fire` runs only if it wins the race
    /// against whatever else holds the returned link (a completing
    /// Request, or an explicit `cancel`).
    pub fn arm<F>(&self, after: Duration, on_fire: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let fired = Arc::new(AtomicU64::new(0));
        let link = TimeoutLink::new(0, fired);
        let fire_link = link.clone();

        let join = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if fire_link.take() {
                on_fire();
            }
        });

        TimerHandle { link, join }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_when_nothing_cancels_it() {
        let timers = TimerSet::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();

        let handle = timers.arm(Duration::from_secs(1), move || {
            fired2.store(true, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert!(fired.load(Ordering::SeqCst));
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn taking_the_link_first_suppresses_the_timer() {
        let timers = TimerSet::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();

        let handle = timers.arm(Duration::from_secs(1), move || {
            fired2.store(true, Ordering::SeqCst);
        });

        // Simulate the request completing first: it takes the link itself.
        assert!(handle.link().take());

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_a_pending_timer_from_firing() {
        let timers = TimerSet::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();

        let handle = timers.arm(Duration::from_secs(1), move || {
            fired2.store(true, Ordering::SeqCst);
        });

        handle.cancel();

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert!(!fired.load(Ordering::SeqCst));
    }
}
