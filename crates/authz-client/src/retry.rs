use std::time::Duration;

use rand::Rng;

use crate::policy::{BackoffCfg, RetryPolicy};

/// Tracks attempts of one logical request and hands out backoff delays.
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// Retries issued so far.
    pub fn retries(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` once `max_attempts` is spent.
    pub fn next_delay(&mut self, policy: &RetryPolicy, backoff: &BackoffCfg) -> Option<Duration> {
        if !policy.enabled {
            return None;
        }
        if self.attempts + 1 >= policy.max_attempts {
            return None;
        }
        self.attempts += 1;

        let power = (self.attempts - 1) as i32;
        let multiplier = backoff.multiplier as f64;
        let mut secs = backoff.base_delay.as_secs_f64() * multiplier.powi(power);
        if secs <= 0.0 {
            secs = backoff.base_delay.as_secs_f64();
        }
        let max_secs = backoff.max_delay.as_secs_f64();
        if max_secs > 0.0 && secs > max_secs {
            secs = max_secs;
        }
        let mut delay = Duration::from_secs_f64(secs);
        if backoff.jitter {
            let millis = delay.as_millis().max(1) as u64;
            let jitter = rand::thread_rng().gen_range(0..millis);
            delay = Duration::from_millis(jitter);
        }
        Some(delay)
    }
}

/// Longest time one logical request can take: every attempt running into
/// `request_timeout` plus each backoff delay at its unjittered length.
pub fn worst_case_duration(
    policy: &RetryPolicy,
    backoff: &BackoffCfg,
    request_timeout: Duration,
) -> Duration {
    let unjittered = BackoffCfg {
        jitter: false,
        ..backoff.clone()
    };
    let mut state = RetryState::new();
    let mut sleeping = Duration::ZERO;
    while let Some(delay) = state.next_delay(policy, &unjittered) {
        sleeping += delay;
    }
    request_timeout * (state.retries() + 1) + sleeping
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}
