//! Resilience configuration for the policy chain
//!
//! This module defines configuration structures for the retry, throttling,
//! provider-registration and long-running-operation polling behaviour.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for transient transport and server failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether retry is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff_ms: 100,
            max_backoff_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Backoff before attempt number `attempt` (1-based count of failures so far)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self.backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Per-scope throttling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    /// Whether 429 responses are handled by the throttling policy
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wait used when neither `Retry-After` nor the body names one
    #[serde(default = "default_throttle_wait")]
    pub default_wait_secs: u64,

    /// Added to every computed wait before replaying
    #[serde(default = "default_safety_margin")]
    pub safety_margin_ms: u64,

    /// Longest wait the policy accepts; longer requests fail the call
    #[serde(default = "default_max_throttle_wait")]
    pub max_wait_secs: u64,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_wait_secs: 30,
            safety_margin_ms: 100,
            max_wait_secs: 3600,
        }
    }
}

/// Provider auto-registration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Whether missing provider registrations are fixed transparently
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between registration state checks
    #[serde(default = "default_registration_interval")]
    pub poll_interval_secs: u64,

    /// Number of state checks before giving up
    #[serde(default = "default_registration_polls")]
    pub max_polls: u32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            max_polls: 60,
        }
    }
}

/// Long-running operation polling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval used when the service sends no `Retry-After`
    #[serde(default = "default_poll_interval")]
    pub default_interval_secs: u64,

    /// Consecutive failed status checks tolerated before the operation fails
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// Overall wait bound; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 30,
            max_poll_failures: 3,
            timeout_secs: None,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_throttle_wait() -> u64 {
    30
}

fn default_safety_margin() -> u64 {
    100
}

fn default_max_throttle_wait() -> u64 {
    3600
}

fn default_registration_interval() -> u64 {
    5
}

fn default_registration_polls() -> u32 {
    60
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_poll_failures() -> u32 {
    3
}
