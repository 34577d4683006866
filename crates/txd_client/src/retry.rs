//! Retry strategies for transport failures.

use crate::config::BackoffConfig;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Decides whether a failed call is attempted again, and how long to wait.
///
/// A strategy is stateful: build a fresh one for every logical call.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Up to `max_attempts` attempts without delay.
    NTimes {
        /// Total attempts allowed.
        max_attempts: u32,
        /// Failures recorded so far.
        failures: u32,
    },
    /// Delays growing by `multiplier` until `max_delay` is reached.
    Backoff {
        /// Delay before the next retry.
        delay: Duration,
        /// Growth factor.
        multiplier: u32,
        /// Retrying stops once `delay` reaches this.
        max_delay: Duration,
        /// Optional cap on total attempts.
        max_attempts: Option<u32>,
        /// Optional cap on time since the first failure.
        max_elapsed: Option<Duration>,
        /// Failures recorded so far.
        failures: u32,
        /// Time of the first failure.
        first_failure: Option<Instant>,
    },
}

impl RetryStrategy {
    /// Creates a strategy allowing `max_attempts` attempts in total.
    pub fn n_times(max_attempts: u32) -> Self {
        RetryStrategy::NTimes {
            max_attempts,
            failures: 0,
        }
    }

    /// Creates a backoff strategy.
    pub fn backoff(config: &BackoffConfig) -> Self {
        RetryStrategy::Backoff {
            delay: config.initial_delay,
            multiplier: config.multiplier,
            max_delay: config.max_delay,
            max_attempts: config.max_attempts,
            max_elapsed: config.max_elapsed,
            failures: 0,
            first_failure: None,
        }
    }

    /// Records one failure and returns whether another attempt is allowed.
    pub fn fail_once(&mut self) -> bool {
        match self {
            RetryStrategy::NTimes {
                max_attempts,
                failures,
            } => {
                *failures += 1;
                *failures < *max_attempts
            }
            RetryStrategy::Backoff {
                delay,
                max_delay,
                max_attempts,
                max_elapsed,
                failures,
                first_failure,
                ..
            } => {
                *failures += 1;
                let started = *first_failure.get_or_insert_with(Instant::now);
                if max_attempts.is_some_and(|max| *failures >= max) {
                    return false;
                }
                if max_elapsed.is_some_and(|max| started.elapsed() >= max) {
                    return false;
                }
                *delay < *max_delay
            }
        }
    }

    /// Returns the failures recorded so far.
    pub fn failures(&self) -> u32 {
        match self {
            RetryStrategy::NTimes { failures, .. } | RetryStrategy::Backoff { failures, .. } => {
                *failures
            }
        }
    }

    /// Returns the wait before the next attempt and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        match self {
            RetryStrategy::NTimes { .. } => Duration::ZERO,
            RetryStrategy::Backoff {
                delay, multiplier, ..
            } => {
                let current = *delay;
                *delay = current.saturating_mul(*multiplier);
                current
            }
        }
    }

    /// Blocks the calling thread until the next attempt is due.
    pub fn before_retry(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Cancellation flag for one logical call.
///
/// Pass it to [`TransactionServiceClient::cancellable`](crate::TransactionServiceClient::cancellable);
/// cancelling wakes the call if it is waiting between retries and stops any
/// further attempt. Calls made without the token are not affected.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every call made with this token.
    pub fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.wakeup.notify_all();
    }

    /// Clears a previous [`cancel`](Self::cancel).
    pub fn reset(&self) {
        *self.cancelled.lock() = false;
    }

    /// Returns whether the token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Waits up to `timeout`. Returns true if cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.wakeup.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}
