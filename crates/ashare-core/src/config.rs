use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::aggregator::{
    AggregatorConfig, DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_DAYS, DEFAULT_EXTRA_LOOKBACK,
    DEFAULT_MAX_CONCURRENCY, MAX_DAYS, MAX_EXTRA_LOOKBACK,
};
use crate::cache::DEFAULT_TTL;
use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::routing::SourceStrategy;

pub const ENV_CACHE_TTL_SECS: &str = "ASHARE_CACHE_TTL_SECS";
pub const ENV_TIMEOUT_MS: &str = "ASHARE_TIMEOUT_MS";
pub const ENV_HEATMAP_DAYS: &str = "ASHARE_HEATMAP_DAYS";
pub const ENV_EXTRA_LOOKBACK: &str = "ASHARE_EXTRA_LOOKBACK";
pub const ENV_ACTIVITY_THRESHOLD: &str = "ASHARE_ACTIVITY_THRESHOLD";
pub const ENV_MAX_CONCURRENCY: &str = "ASHARE_MAX_CONCURRENCY";

/// Runtime knobs shared by the library entry points.
///
/// Resolution order is defaults, then environment, then whatever the caller
/// sets explicitly (CLI flags).
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub cache_ttl: Duration,
    pub timeout_ms: u64,
    pub heatmap_days: usize,
    pub extra_lookback: usize,
    pub activity_threshold: u32,
    pub max_concurrency: usize,
    pub source_strategy: SourceStrategy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            heatmap_days: DEFAULT_DAYS,
            extra_lookback: DEFAULT_EXTRA_LOOKBACK,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            source_strategy: SourceStrategy::Auto,
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by `ASHARE_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Values that do not parse, that are
    /// zero where zero makes no sense, or that exceed the window bounds are
    /// ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secs) = read::<u64>(&lookup, ENV_CACHE_TTL_SECS, true) {
            self.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(timeout_ms) = read(&lookup, ENV_TIMEOUT_MS, false) {
            self.timeout_ms = timeout_ms;
        }
        if let Some(days) = read(&lookup, ENV_HEATMAP_DAYS, false) {
            if let Some(days) = at_most(ENV_HEATMAP_DAYS, days, MAX_DAYS) {
                self.heatmap_days = days;
            }
        }
        if let Some(extra) = read(&lookup, ENV_EXTRA_LOOKBACK, true) {
            if let Some(extra) = at_most(ENV_EXTRA_LOOKBACK, extra, MAX_EXTRA_LOOKBACK) {
                self.extra_lookback = extra;
            }
        }
        if let Some(threshold) = read(&lookup, ENV_ACTIVITY_THRESHOLD, true) {
            self.activity_threshold = threshold;
        }
        if let Some(concurrency) = read(&lookup, ENV_MAX_CONCURRENCY, false) {
            self.max_concurrency = concurrency;
        }
        self
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            days: self.heatmap_days,
            extra_lookback: self.extra_lookback,
            activity_threshold: self.activity_threshold,
            max_concurrency: self.max_concurrency,
            ..AggregatorConfig::default()
        }
    }
}

trait Unsigned: FromStr + PartialEq + Default {}

impl Unsigned for u32 {}
impl Unsigned for u64 {}
impl Unsigned for usize {}

fn read<T: Unsigned>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    allow_zero: bool,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if allow_zero || value != T::default() => Some(value),
        _ => {
            warn!(key, value = %raw, "ignoring invalid environment override");
            None
        }
    }
}

fn at_most(key: &str, value: usize, max: usize) -> Option<usize> {
    if value > max {
        warn!(key, value, max, "ignoring out-of-range environment override");
        return None;
    }
    Some(value)
}
