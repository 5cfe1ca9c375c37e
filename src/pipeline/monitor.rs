//! Runs blocking work on a worker thread while the caller ticks progress.

use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, warn};

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Polls a worker every `poll` and reports elapsed time between polls.
pub struct Monitor<'c> {
    clock: &'c dyn Clock,
    poll: Duration,
}

impl<'c> Monitor<'c> {
    pub fn new(clock: &'c dyn Clock, poll: Duration) -> Self {
        Self {
            clock,
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    /// Runs `work` on a scoped thread and calls `on_tick` with the elapsed
    /// time each time `poll` passes without a result.
    ///
    /// Returns `None` if the worker died without producing a value.
    pub fn run<T, W, P>(&self, work: W, mut on_tick: P) -> Option<T>
    where
        T: Send,
        W: FnOnce() -> T + Send,
        P: FnMut(Duration),
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::scope(|scope| {
            let worker = scope.spawn(move || {
                if tx.send(work()).is_err() {
                    debug!("monitor dropped before the worker finished");
                }
            });

            let start = self.clock.now();
            loop {
                match rx.recv_timeout(self.poll) {
                    Ok(value) => return Some(value),
                    Err(RecvTimeoutError::Timeout) => {
                        on_tick(self.clock.now().saturating_duration_since(start));
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        if worker.join().is_err() {
                            warn!("worker thread panicked");
                        }
                        return None;
                    }
                }
            }
        })
    }
}

/// `elapsed / expected`, or 0 when nothing is expected.
pub fn elapsed_fraction(elapsed: Duration, expected: Duration) -> f64 {
    if expected.is_zero() {
        return 0.0;
    }
    elapsed.as_secs_f64() / expected.as_secs_f64()
}
