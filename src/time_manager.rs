//! Fixed-rate loop pacing for the worker threads.
//!
//! Each loop calls [`TimeManager::tick()`] at the top of an iteration and
//! [`TimeManager::wait_until()`] at the bottom. Iterations are paced
//! independently: a slow iteration is reported and the next one starts right
//! away, there is no catching up on missed deadlines.

use log::warn;
use std::time::{Duration, Instant};

/// The result of waiting for the end of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// The iteration finished early and we slept until its deadline.
    OnTime,
    /// The iteration ran past its deadline by the given amount.
    Overrun(Duration),
}

/// Paces one loop. Not shared between threads; each worker owns its own.
#[derive(Debug)]
pub struct TimeManager {
    name: String,
    start_time: Instant,
    loop_start: Instant,
    overruns: u64,
}

impl TimeManager {
    /// Makes a new [`TimeManager`]. The name shows up in slow iteration
    /// diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            start_time: now,
            loop_start: now,
            overruns: 0,
        }
    }

    /// Records the epoch that [`TimeManager::total_duration()`] counts from.
    pub fn start(&mut self) {
        self.start_time = Instant::now();
        self.loop_start = self.start_time;
    }

    /// Marks the start of the current iteration.
    pub fn tick(&mut self) {
        self.loop_start = Instant::now();
    }

    /// Blocks until `target` has elapsed since the last [`TimeManager::tick()`].
    /// If that deadline has already passed, logs the overrun and returns
    /// immediately.
    pub fn wait_until(&mut self, target: Duration) -> Pacing {
        if target.is_zero() {
            return Pacing::OnTime;
        }

        let deadline = self.loop_start + target;
        let now = Instant::now();
        if now <= deadline {
            spin_sleep::sleep(deadline - now);
            Pacing::OnTime
        } else {
            let took = now - self.loop_start;
            self.overruns += 1;
            warn!(
                "{}: slow iteration ({} ms)",
                self.name,
                took.as_millis()
            );
            Pacing::Overrun(took - target)
        }
    }

    /// Time elapsed since [`TimeManager::start()`].
    pub fn total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// How many iterations have overrun their target so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn waits_out_the_rest_of_a_fast_iteration() {
        let target = Duration::from_millis(30);
        let mut tm = TimeManager::new("test");
        tm.start();
        tm.tick();
        let tick_start = Instant::now();

        sleep(Duration::from_millis(5));

        assert_eq!(tm.wait_until(target), Pacing::OnTime);
        assert!(tick_start.elapsed() >= target - Duration::from_millis(1));
        assert_eq!(tm.overruns(), 0);
    }

    #[test]
    fn slow_iteration_returns_immediately_with_overrun() {
        let target = Duration::from_millis(5);
        let mut tm = TimeManager::new("test");
        tm.start();
        tm.tick();

        sleep(Duration::from_millis(20));

        let before = Instant::now();
        let pacing = tm.wait_until(target);
        assert!(before.elapsed() < Duration::from_millis(5));
        match pacing {
            Pacing::Overrun(by) => assert!(by >= Duration::from_millis(10)),
            Pacing::OnTime => panic!("expected an overrun"),
        }
        assert_eq!(tm.overruns(), 1);
    }

    #[test]
    fn zero_target_free_runs() {
        let mut tm = TimeManager::new("test");
        tm.tick();
        sleep(Duration::from_millis(2));
        assert_eq!(tm.wait_until(Duration::ZERO), Pacing::OnTime);
        assert_eq!(tm.overruns(), 0);
    }

    #[test]
    fn total_duration_counts_from_start() {
        let mut tm = TimeManager::new("test");
        tm.start();
        sleep(Duration::from_millis(10));
        assert!(tm.total_duration() >= Duration::from_millis(10));
    }
}
