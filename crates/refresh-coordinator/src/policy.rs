//! Retry/cooldown policy
//!
//! All three knobs are externally configurable; the defaults are the values
//! the API was tuned against (3 attempts, 5 s cooldown, 1 s between retries).

use std::time::Duration;

use serde::Deserialize;

/// Policy governing the refresh loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Refresh attempts per logical request before the session is aborted
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum spacing between two refresh calls
    #[serde(default = "default_cooldown_window_ms")]
    pub cooldown_window_ms: u64,
    /// Pause after a refresh (successful or not) before the next step
    #[serde(default = "default_inter_retry_delay_ms")]
    pub inter_retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_cooldown_window_ms() -> u64 {
    5_000
}

fn default_inter_retry_delay_ms() -> u64 {
    1_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_window_ms: default_cooldown_window_ms(),
            inter_retry_delay_ms: default_inter_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn cooldown_window(&self) -> Duration {
        Duration::from_millis(self.cooldown_window_ms)
    }

    pub fn inter_retry_delay(&self) -> Duration {
        Duration::from_millis(self.inter_retry_delay_ms)
    }

    /// Reject policies that would never attempt a refresh.
    pub fn validate(&self) -> common::Result<()> {
        if self.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default)]
        retry: RetryPolicy,
    }

    #[test]
    fn defaults_match_tuned_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.cooldown_window(), Duration::from_millis(5000));
        assert_eq!(policy.inter_retry_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Wrapper = toml::from_str("[retry]\nmax_attempts = 5\n").unwrap();
        assert_eq!(parsed.retry.max_attempts, 5);
        assert_eq!(parsed.retry.cooldown_window_ms, 5_000);
        assert_eq!(parsed.retry.inter_retry_delay_ms, 1_000);
    }

    #[test]
    fn missing_section_uses_defaults() {
        let parsed: Wrapper = toml::from_str("").unwrap();
        assert_eq!(parsed.retry, RetryPolicy::default());
    }

    #[test]
    fn zero_attempts_rejected() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"), "got: {err}");
    }

    #[test]
    fn zero_delays_are_allowed() {
        let policy = RetryPolicy {
            max_attempts: 1,
            cooldown_window_ms: 0,
            inter_retry_delay_ms: 0,
        };
        assert!(policy.validate().is_ok());
    }
}
