// Copyright (c) Microsoft. All rights reserved.

use std::time::Duration;

/// Retry schedule for the Workload API streams: exponential growth from an
/// initial delay up to a cap. `reset` is called after every successfully
/// delivered update so a healthy stream always restarts the schedule.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    initial: Duration,
    multiplier: u32,
    cap: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::new(Duration::from_secs(1), 2, Duration::from_secs(60), None)
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(
        initial: Duration,
        multiplier: u32,
        cap: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        BackoffPolicy {
            initial,
            multiplier,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay to wait before the next retry. Non-decreasing until it
    /// saturates at the cap.
    pub fn next_delay(&mut self) -> Duration {
        let mut delay = self.initial;
        for _ in 0..self.attempt {
            if delay >= self.cap {
                break;
            }
            delay = delay
                .checked_mul(self.multiplier)
                .unwrap_or(self.cap)
                .min(self.cap);
        }

        self.attempt = self.attempt.saturating_add(1);

        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub fn did_exceed_max_attempts(&self) -> bool {
        matches!(self.max_attempts, Some(max) if self.attempt >= max)
    }
}
