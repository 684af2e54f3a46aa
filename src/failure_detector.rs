//! Sliding-window failure detector (§4.5): trips "stop this resolver"
//! once enough recent outcomes are in-window and the timeout fraction
//! crosses the threshold.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::FailureWindowConfig;

struct Outcome {
    timed_out: bool,
    at: Instant,
}

/// Per-resolver window of recent outcomes.
pub struct FailureWindow {
    config: FailureWindowConfig,
    outcomes: Mutex<VecDeque<Outcome>>,
}

impl FailureWindow {
    pub fn new(config: FailureWindowConfig) -> Self {
        Self {
            config,
            outcomes: Mutex::new(VecDeque::with_capacity(config.max_entries)),
        }
    }

    fn evict_stale(&self, outcomes: &mut VecDeque<Outcome>) {
        let now = Instant::now();
        while let Some(front) = outcomes.front() {
            if now.duration_since(front.at) > self.config.horizon {
                outcomes.pop_front();
            } else {
                break;
            }
        }
        while outcomes.len() > self.config.max_entries {
            outcomes.pop_front();
        }
    }

    /// `updateTimeouts(key, didTimeout) -> shouldStop` (§4.5). The `key`
    /// is implicit: one `FailureWindow` per resolver.
    pub fn record(&self, timed_out: bool) -> bool {
        let mut outcomes = self.outcomes.lock();
        self.evict_stale(&mut outcomes);
        outcomes.push_back(Outcome {
            timed_out,
            at: Instant::now(),
        });

        if outcomes.len() < self.config.min_outcomes {
            return false;
        }

        let timeouts = outcomes.iter().filter(|o| o.timed_out).count();
        (timeouts as f64 / outcomes.len() as f64) >= self.config.threshold
    }

    /// Current timeout fraction in-window, for metrics/diagnostics.
    pub fn current_fraction(&self) -> f64 {
        let mut outcomes = self.outcomes.lock();
        self.evict_stale(&mut outcomes);
        if outcomes.is_empty() {
            return 0.0;
        }
        let timeouts = outcomes.iter().filter(|o| o.timed_out).count();
        timeouts as f64 / outcomes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FailureWindowConfig {
        FailureWindowConfig {
            max_entries: 50,
            horizon: Duration::from_secs(30),
            min_outcomes: 5,
            threshold: 0.9,
        }
    }

    #[test]
    fn does_not_trip_below_min_outcomes() {
        let window = FailureWindow::new(config());
        for _ in 0..4 {
            assert!(!window.record(true));
        }
    }

    #[test]
    fn trips_once_threshold_crossed() {
        let window = FailureWindow::new(config());
        let mut tripped = false;
        for i in 0..10 {
            tripped = window.record(i < 9);
        }
        assert!(tripped);
    }

    #[test]
    fn fraction_returns_to_zero_once_window_empties() {
        let cfg = FailureWindowConfig {
            horizon: Duration::from_millis(10),
            ..config()
        };
        let window = FailureWindow::new(cfg);
        window.record(true);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(window.current_fraction(), 0.0);
    }

    #[test]
    fn mixed_outcomes_below_threshold_do_not_trip() {
        let window = FailureWindow::new(config());
        let mut tripped = false;
        for i in 0..10 {
            tripped = window.record(i % 2 == 0);
        }
        assert!(!tripped);
    }
}
