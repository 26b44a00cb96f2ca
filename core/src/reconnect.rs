//! Reconnect backoff (§3 `ReconnectState`, §4.6). The "stable connection"
//! reset is driven by a `TimerSet` timer armed for 10s at connect time
//! (`next_attempt_reset_timer` in the spec); see `eventloop.rs`, which owns
//! that timer and calls [`ReconnectState::reset_to_min`] if it fires while
//! still connected.

use std::time::Duration;

use crate::options::ReconnectOptions;

/// How long a connection must stay up before backoff resets to `min_sec`.
pub const STABLE_CONNECTION_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct ReconnectState {
    min_sec: u64,
    max_sec: u64,
    current_backoff_sec: u64,
}

impl Default for ReconnectState {
    fn default() -> Self {
        ReconnectState::new(ReconnectOptions::default())
    }
}

impl ReconnectState {
    pub fn new(options: ReconnectOptions) -> ReconnectState {
        ReconnectState {
            min_sec: options.min_sec,
            max_sec: options.max_sec,
            current_backoff_sec: options.min_sec,
        }
    }

    pub fn current_backoff(&self) -> Duration {
        Duration::from_secs(self.current_backoff_sec)
    }

    /// Records a successful CONNACK. Does not itself reset the backoff —
    /// only a connection that survives `STABLE_CONNECTION_WINDOW` earns
    /// that (see `reset_to_min`).
    pub fn on_connected(&mut self) {}

    /// Doubles the backoff, clamped at `max_sec`.
    pub fn on_failed_attempt(&mut self) {
        self.current_backoff_sec = (self.current_backoff_sec * 2).min(self.max_sec);
    }

    /// Called by the 10-second stability timer if it fires while the
    /// connection is still up.
    pub fn reset_to_min(&mut self) {
        self.current_backoff_sec = self.min_sec;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_doubles_and_clamps_at_max() {
        let mut reconnect = ReconnectState::new(ReconnectOptions { min_sec: 1, max_sec: 8 });
        assert_eq!(reconnect.current_backoff(), Duration::from_secs(1));

        reconnect.on_failed_attempt();
        assert_eq!(reconnect.current_backoff(), Duration::from_secs(2));
        reconnect.on_failed_attempt();
        assert_eq!(reconnect.current_backoff(), Duration::from_secs(4));
        reconnect.on_failed_attempt();
        assert_eq!(reconnect.current_backoff(), Duration::from_secs(8));
        reconnect.on_failed_attempt();
        assert_eq!(reconnect.current_backoff(), Duration::from_secs(8));
    }

    #[test]
    fn resets_only_when_explicitly_told_the_connection_was_stable() {
        let mut reconnect = ReconnectState::new(ReconnectOptions { min_sec: 1, max_sec: 128 });
        reconnect.on_failed_attempt();
        reconnect.on_failed_attempt();
        assert_eq!(reconnect.current_backoff(), Duration::from_secs(4));

        reconnect.reset_to_min();
        assert_eq!(reconnect.current_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_is_monotonically_non_decreasing_under_repeated_failure() {
        let mut reconnect = ReconnectState::new(ReconnectOptions { min_sec: 1, max_sec: 128 });
        let mut last = reconnect.current_backoff();
        for _ in 0..20 {
            reconnect.on_failed_attempt();
            let next = reconnect.current_backoff();
            assert!(next >= last);
            assert!(next <= Duration::from_secs(128));
            last = next;
        }
    }
}
