use std::collections::{HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::{EastmoneyFeed, SinaFeed, TencentFeed, Upstream};
use crate::feed::{HealthState, HealthStatus, QuoteBatch, QuoteFeed, QuoteRequest, SourceError};
use crate::{EnvelopeError, ProviderId, ValidationError};

/// Order in which feeds are tried.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceStrategy {
    /// Registration order, with feeds whose breaker is open moved last.
    #[default]
    Auto,
    /// Explicit order; unlisted feeds are not consulted.
    Priority(Vec<ProviderId>),
    /// Exactly one feed, no failover.
    Strict(ProviderId),
}

impl SourceStrategy {
    fn is_strict(&self) -> bool {
        matches!(self, Self::Strict(_))
    }

    /// `auto` or a provider name. A named provider is tried first and the
    /// others follow unless `strict` is set.
    pub fn parse(value: &str, strict: bool) -> Result<Self, ValidationError> {
        if value.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }

        let preferred = ProviderId::from_str(value)?;
        if strict {
            return Ok(Self::Strict(preferred));
        }

        let mut chain = vec![preferred];
        chain.extend(ProviderId::ALL.into_iter().filter(|id| *id != preferred));
        Ok(Self::Priority(chain))
    }
}

impl Display for SourceStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Priority(chain) => {
                let names: Vec<&str> = chain.iter().map(|id| id.as_str()).collect();
                write!(f, "priority:{}", names.join(","))
            }
            Self::Strict(id) => write!(f, "strict:{id}"),
        }
    }
}

/// Successful routed call.
#[derive(Debug, Clone)]
pub struct RouteSuccess<T> {
    pub data: T,
    pub selected_source: ProviderId,
    pub source_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
}

/// Every planned feed failed.
#[derive(Debug, Clone)]
pub struct RouteFailure {
    pub source_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
}

impl RouteFailure {
    /// Collapses the per-feed errors into one retryable upstream error.
    pub fn into_source_error(self) -> SourceError {
        let detail = self
            .errors
            .iter()
            .map(|error| match error.source {
                Some(source) => format!("{source}: {}", error.message),
                None => error.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        SourceError::unavailable(format!("all quote sources failed ({detail})"))
    }
}

pub type RouteResult<T> = Result<RouteSuccess<T>, RouteFailure>;

/// One row of the `sources` command.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SourceSnapshot {
    pub id: ProviderId,
    pub health: HealthStatus,
}

impl SourceSnapshot {
    pub fn status_label(self) -> &'static str {
        if !self.health.rate_available && self.health.state != HealthState::Unhealthy {
            return "rate_limited";
        }

        match self.health.state {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

/// Pending warnings kept for [`FeedRouter::drain_warnings`].
pub const MAX_PENDING_WARNINGS: usize = 32;

/// Ordered failover across quote feeds.
///
/// The router is itself a [`QuoteFeed`], so a cache can sit on top of it
/// without knowing about failover. Warnings produced while serving those
/// calls are kept, deduplicated and capped at [`MAX_PENDING_WARNINGS`]
/// with the oldest dropped first, until [`FeedRouter::drain_warnings`]
/// collects them.
pub struct FeedRouter {
    feeds: Vec<Arc<dyn QuoteFeed>>,
    strategy: SourceStrategy,
    warnings: Mutex<VecDeque<String>>,
    attempted: Mutex<Vec<ProviderId>>,
}

impl Default for FeedRouter {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(TencentFeed::default()),
            Arc::new(EastmoneyFeed::default()),
            Arc::new(SinaFeed::default()),
        ])
    }
}

impl FeedRouter {
    pub fn new(feeds: Vec<Arc<dyn QuoteFeed>>) -> Self {
        Self {
            feeds,
            strategy: SourceStrategy::Auto,
            warnings: Mutex::new(VecDeque::new()),
            attempted: Mutex::new(Vec::new()),
        }
    }

    /// The three live feeds sharing one request timeout.
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        let upstream = |provider| Upstream::reqwest(provider).with_timeout_ms(timeout_ms);
        Self::new(vec![
            Arc::new(TencentFeed::with_upstream(upstream(ProviderId::Tencent))),
            Arc::new(EastmoneyFeed::with_upstream(upstream(ProviderId::Eastmoney))),
            Arc::new(SinaFeed::with_upstream(upstream(ProviderId::Sina))),
        ])
    }

    pub fn with_strategy(mut self, strategy: SourceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> &SourceStrategy {
        &self.strategy
    }

    fn feed(&self, provider: ProviderId) -> Option<&Arc<dyn QuoteFeed>> {
        self.feeds.iter().find(|feed| feed.id() == provider)
    }

    pub async fn snapshots(&self) -> Vec<SourceSnapshot> {
        let mut snapshots = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            snapshots.push(SourceSnapshot {
                id: feed.id(),
                health: feed.health().await,
            });
        }
        snapshots
    }

    /// Feeds in the order `route` will try them.
    pub async fn plan(&self) -> Vec<ProviderId> {
        match &self.strategy {
            SourceStrategy::Auto => {
                let mut healthy = Vec::with_capacity(self.feeds.len());
                let mut unhealthy = Vec::new();
                for feed in &self.feeds {
                    if feed.health().await.is_unhealthy() {
                        unhealthy.push(feed.id());
                    } else {
                        healthy.push(feed.id());
                    }
                }
                healthy.extend(unhealthy);
                dedupe_chain(&healthy)
            }
            SourceStrategy::Priority(priority) => dedupe_chain(priority),
            SourceStrategy::Strict(provider) => vec![*provider],
        }
    }

    pub async fn route(&self, req: &QuoteRequest) -> RouteResult<QuoteBatch> {
        let started = Instant::now();
        let planned_chain = self.plan().await;
        let mut source_chain = Vec::with_capacity(planned_chain.len());
        let mut errors = Vec::new();

        for provider in planned_chain {
            source_chain.push(provider);
            let Some(feed) = self.feed(provider) else {
                errors.push(EnvelopeError::from_source(
                    provider,
                    &SourceError::adapter_not_registered(provider),
                ));
                if self.strategy.is_strict() {
                    break;
                }
                continue;
            };

            match feed.fetch(req.clone()).await {
                Ok(data) => {
                    let mut warnings = Vec::new();
                    if !errors.is_empty() {
                        let warning = format!(
                            "source fallback succeeded with '{provider}' after {} failed attempt(s)",
                            errors.len()
                        );
                        info!(%provider, failed = errors.len(), "quote fallback succeeded");
                        warnings.push(warning);
                    }

                    return Ok(RouteSuccess {
                        data,
                        selected_source: provider,
                        source_chain,
                        warnings,
                        errors,
                        latency_ms: elapsed_ms(started),
                    });
                }
                Err(error) => {
                    warn!(%provider, error = %error, "quote source failed");
                    errors.push(EnvelopeError::from_source(provider, &error));
                    if self.strategy.is_strict() {
                        break;
                    }
                }
            }
        }

        if errors.is_empty() {
            errors.push(EnvelopeError {
                code: String::from("source.no_candidate"),
                message: String::from("no quote source is configured"),
                retryable: Some(false),
                source: None,
            });
        }

        Err(RouteFailure {
            source_chain,
            warnings: vec![String::from("all quote sources failed")],
            errors,
            latency_ms: elapsed_ms(started),
        })
    }

    /// Warnings accumulated by calls made through the [`QuoteFeed`] impl.
    pub fn drain_warnings(&self) -> Vec<String> {
        let mut warnings = self.warnings.lock().unwrap_or_else(PoisonError::into_inner);
        warnings.drain(..).collect()
    }

    /// Feeds actually tried by calls made through the [`QuoteFeed`] impl
    /// since the last take, in first-tried order.
    pub fn take_attempted_chain(&self) -> Vec<ProviderId> {
        let mut attempted = self.attempted.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *attempted)
    }

    fn record_chain(&self, chain: &[ProviderId]) {
        let mut attempted = self.attempted.lock().unwrap_or_else(PoisonError::into_inner);
        for provider in chain {
            if !attempted.contains(provider) {
                attempted.push(*provider);
            }
        }
    }

    fn record_warnings(&self, new: Vec<String>) {
        if new.is_empty() {
            return;
        }
        let mut warnings = self.warnings.lock().unwrap_or_else(PoisonError::into_inner);
        for warning in new {
            if warnings.contains(&warning) {
                continue;
            }
            if warnings.len() == MAX_PENDING_WARNINGS {
                warnings.pop_front();
            }
            warnings.push_back(warning);
        }
    }
}

impl QuoteFeed for FeedRouter {
    fn id(&self) -> ProviderId {
        match &self.strategy {
            SourceStrategy::Strict(provider) => *provider,
            SourceStrategy::Priority(chain) if !chain.is_empty() => chain[0],
            _ => self
                .feeds
                .first()
                .map(|feed| feed.id())
                .unwrap_or(ProviderId::Tencent),
        }
    }

    fn fetch<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteBatch, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            match self.route(&req).await {
                Ok(success) => {
                    self.record_chain(&success.source_chain);
                    self.record_warnings(success.warnings);
                    Ok(success.data)
                }
                Err(failure) => {
                    self.record_chain(&failure.source_chain);
                    self.record_warnings(failure.warnings.clone());
                    Err(failure.into_source_error())
                }
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move {
            let mut best = HealthStatus::new(HealthState::Unhealthy, false);
            for feed in &self.feeds {
                let health = feed.health().await;
                if rank(health.state) > rank(best.state) {
                    best = health;
                }
            }
            best
        })
    }
}

fn rank(state: HealthState) -> u8 {
    match state {
        HealthState::Healthy => 2,
        HealthState::Degraded => 1,
        HealthState::Unhealthy => 0,
    }
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    chain
        .iter()
        .copied()
        .filter(|provider| seen.insert(*provider))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
