//! Backoff schedule for failed backend calls

use std::time::Duration;

use crate::app_config::TranslationCommonConfig;

/// How often and how patiently a backend call is repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra calls after the first failed one
    pub api_retries: u32,
    /// Base delay, doubled for each failed call
    pub base_backoff_ms: u64,
    /// Upper bound for a single delay
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(api_retries: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            api_retries,
            base_backoff_ms,
            max_backoff_ms,
        }
    }

    pub fn from_config(common: &TranslationCommonConfig) -> Self {
        Self::new(common.api_retries, common.retry_backoff_ms, common.max_backoff_ms)
    }

    /// Total calls allowed per attempt
    pub fn max_calls(&self) -> u32 {
        self.api_retries.saturating_add(1)
    }

    /// Delay after the `failed_call`-th failed call (1-based): `base * 2^n`, capped
    pub fn backoff(&self, failed_call: u32) -> Duration {
        let factor = 1u64.checked_shl(failed_call).unwrap_or(u64::MAX);
        let delay = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}
