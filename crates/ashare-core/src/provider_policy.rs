use std::time::Duration;

use crate::retry::{Backoff, RetryConfig};
use crate::ProviderId;

/// Request budget for one upstream provider.
///
/// The quote endpoints are unauthenticated and tolerate bursts, while the
/// limit-up pool endpoint is hit once per trading day and is paced harder.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub max_concurrency: usize,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub retry_backoff: BackoffPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            backoff: Backoff::Exponential {
                base: self.initial_delay,
                factor: self.multiplier,
                max: self.max_delay,
                jitter: true,
            },
            ..RetryConfig::default()
        }
    }
}

impl ProviderPolicy {
    pub fn tencent_default() -> Self {
        Self {
            provider_id: ProviderId::Tencent,
            max_concurrency: 8,
            quota_window: Duration::from_secs(1),
            quota_limit: 20,
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(2),
                multiplier: 2.0,
                max_retries: 2,
            },
        }
    }

    pub fn sina_default() -> Self {
        Self {
            provider_id: ProviderId::Sina,
            max_concurrency: 4,
            quota_window: Duration::from_secs(1),
            quota_limit: 10,
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(300),
                max_delay: Duration::from_secs(3),
                multiplier: 2.0,
                max_retries: 2,
            },
        }
    }

    /// Shared by the quote feed and the limit-up roster source.
    pub fn eastmoney_default() -> Self {
        Self {
            provider_id: ProviderId::Eastmoney,
            max_concurrency: 4,
            quota_window: Duration::from_secs(1),
            quota_limit: 5,
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(4),
                multiplier: 2.0,
                max_retries: 3,
            },
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Tencent => Self::tencent_default(),
            ProviderId::Eastmoney => Self::eastmoney_default(),
            ProviderId::Sina => Self::sina_default(),
        }
    }
}
