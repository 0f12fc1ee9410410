//! Retry policy and the per-attempt retry decision.
//!
//! The decision is a pure function of the attempt context and the class of
//! the error that ended the attempt, so it can be tested without any I/O.
//!
//! | Error class  | Condition                                   | Decision        |
//! |--------------|---------------------------------------------|-----------------|
//! | no host      | always                                      | `GiveUp`        |
//! | undecodable  | every host returned an undecodable payload  | `GiveUp`        |
//! | network      | host just disabled, untried host available  | `Failover`      |
//! | any          | attempts exhausted                          | `GiveUp`        |
//! | any          | another enabled host exists                 | `RetryNextHost` |
//! | any          | current host still enabled                  | `RetrySameHost` |
//! | any          | otherwise                                   | `GiveUp`        |

use std::time::Duration;

/// Default number of attempts per chunk, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial delay for exponential backoff (500ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

/// Default maximum delay for exponential backoff (10 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 10;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a chunk fetch handles failed attempts.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Delay cap.
        max_delay: Duration,
        /// Multiplier applied to the delay after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Exponential backoff starting at 500ms, doubling, capped at 10s.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Retries without waiting. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based), or `None` if no attempts remain.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            return None;
        }
        match self {
            Self::Fixed { delay, .. } => Some(*delay),
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64) as u64;
                Some(Duration::from_millis(capped).min(*max_delay))
            }
        }
    }

    /// Maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Fixed { max_attempts, .. } | Self::ExponentialBackoff { max_attempts, .. } => {
                *max_attempts
            }
        }
    }
}

/// Broad class of the error that ended an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection failure, bad status, or wrong body size.
    Network,
    /// Decrypted and decompressed, but hash or length did not match.
    Integrity,
    /// The payload could not be decrypted or decompressed.
    Undecodable,
    /// No enabled host was left to ask.
    NoHost,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Ask the same host again after the backoff delay.
    RetrySameHost,
    /// Ask the next enabled host after the backoff delay.
    RetryNextHost,
    /// Move to an untried host at once without consuming an attempt.
    Failover,
    /// Stop; the item failed permanently.
    GiveUp,
}

impl RetryDecision {
    /// Whether the failed attempt counts against the retry budget.
    pub fn consumes_attempt(self) -> bool {
        !matches!(self, Self::Failover)
    }
}

/// Everything the decision needs to know about the item's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptContext {
    /// Number of the attempt that just failed (1-based, failovers excluded).
    pub attempt: u32,
    pub max_attempts: u32,
    /// The host that was asked is now disabled.
    pub host_disabled: bool,
    /// Enabled hosts other than the one just asked.
    pub other_hosts: usize,
    /// Enabled hosts not yet asked for this item.
    pub untried_hosts: usize,
    /// Distinct hosts that returned an undecodable payload for this item.
    pub undecodable_hosts: usize,
    /// Size of the pool.
    pub total_hosts: usize,
}

/// Decide how to continue after a failed attempt.
///
/// An undecodable payload is retried at least once; it fails the item early
/// only after every host has returned one.
pub fn decide(ctx: &AttemptContext, class: ErrorClass) -> RetryDecision {
    match class {
        ErrorClass::NoHost => return RetryDecision::GiveUp,
        ErrorClass::Undecodable
            if ctx.undecodable_hosts >= ctx.total_hosts
                && ctx.attempt >= 2u32.min(ctx.max_attempts) =>
        {
            return RetryDecision::GiveUp
        }
        ErrorClass::Network if ctx.host_disabled && ctx.untried_hosts > 0 => {
            return RetryDecision::Failover
        }
        _ => {}
    }

    if ctx.attempt >= ctx.max_attempts {
        RetryDecision::GiveUp
    } else if ctx.other_hosts > 0 {
        RetryDecision::RetryNextHost
    } else if !ctx.host_disabled {
        RetryDecision::RetrySameHost
    } else {
        RetryDecision::GiveUp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx(attempt: u32) -> AttemptContext {
        AttemptContext {
            attempt,
            max_attempts: 3,
            total_hosts: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_for_attempt(3), None);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(10);
        assert_eq!(policy.delay_for_attempt(9), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_fixed_and_immediate() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(7));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(7)));
        assert_eq!(policy.delay_for_attempt(2), None);
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
    }

    #[test]
    fn test_no_host_gives_up() {
        assert_eq!(decide(&ctx(1), ErrorClass::NoHost), RetryDecision::GiveUp);
    }

    #[test]
    fn test_single_host_retries_same_host() {
        assert_eq!(decide(&ctx(1), ErrorClass::Network), RetryDecision::RetrySameHost);
        assert_eq!(decide(&ctx(2), ErrorClass::Integrity), RetryDecision::RetrySameHost);
        assert_eq!(decide(&ctx(3), ErrorClass::Network), RetryDecision::GiveUp);
    }

    #[test]
    fn test_rotates_when_other_hosts_enabled() {
        let c = AttemptContext {
            other_hosts: 2,
            total_hosts: 3,
            ..ctx(1)
        };
        assert_eq!(decide(&c, ErrorClass::Network), RetryDecision::RetryNextHost);
    }

    #[test]
    fn test_disabled_host_fails_over_without_consuming() {
        let c = AttemptContext {
            host_disabled: true,
            other_hosts: 1,
            untried_hosts: 1,
            total_hosts: 2,
            ..ctx(3)
        };
        let decision = decide(&c, ErrorClass::Network);
        assert_eq!(decision, RetryDecision::Failover);
        assert!(!decision.consumes_attempt());
    }

    #[test]
    fn test_disabled_host_with_nothing_left_gives_up() {
        let c = AttemptContext {
            host_disabled: true,
            ..ctx(1)
        };
        assert_eq!(decide(&c, ErrorClass::Network), RetryDecision::GiveUp);
    }

    #[test]
    fn test_undecodable_everywhere_gives_up() {
        let c = AttemptContext {
            undecodable_hosts: 2,
            other_hosts: 1,
            total_hosts: 2,
            ..ctx(2)
        };
        assert_eq!(decide(&c, ErrorClass::Undecodable), RetryDecision::GiveUp);

        let c = AttemptContext {
            undecodable_hosts: 1,
            ..c
        };
        assert_eq!(decide(&c, ErrorClass::Undecodable), RetryDecision::RetryNextHost);
    }

    #[test]
    fn test_undecodable_single_host_is_retried_once() {
        let c = AttemptContext {
            undecodable_hosts: 1,
            ..ctx(1)
        };
        assert_eq!(decide(&c, ErrorClass::Undecodable), RetryDecision::RetrySameHost);
        assert_eq!(
            decide(&AttemptContext { attempt: 2, ..c.clone() }, ErrorClass::Undecodable),
            RetryDecision::GiveUp
        );

        let single_attempt = AttemptContext { max_attempts: 1, ..c };
        assert_eq!(
            decide(&single_attempt, ErrorClass::Undecodable),
            RetryDecision::GiveUp
        );
    }

    proptest! {
        /// With one always-failing host that never gets disabled, exactly
        /// `max_attempts` attempts are made.
        #[test]
        fn prop_retry_bound_is_exact(max_attempts in 1u32..16) {
            let mut attempts = 0;
            loop {
                attempts += 1;
                let c = AttemptContext {
                    attempt: attempts,
                    max_attempts,
                    total_hosts: 1,
                    ..Default::default()
                };
                if decide(&c, ErrorClass::Network) == RetryDecision::GiveUp {
                    break;
                }
            }
            prop_assert_eq!(attempts, max_attempts);
        }

        #[test]
        fn prop_consumed_attempts_never_exceed_budget(
            attempt in 1u32..32,
            max_attempts in 1u32..16,
            other_hosts in 0usize..4,
            host_disabled: bool,
        ) {
            let c = AttemptContext {
                attempt,
                max_attempts,
                host_disabled,
                other_hosts,
                untried_hosts: 0,
                undecodable_hosts: 0,
                total_hosts: other_hosts + 1,
            };
            let decision = decide(&c, ErrorClass::Integrity);
            if attempt >= max_attempts {
                prop_assert_eq!(decision, RetryDecision::GiveUp);
            }
        }
    }
}
