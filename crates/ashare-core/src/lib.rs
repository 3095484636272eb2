//! # ashare core
//!
//! Symbol lookup, live quotes and limit-up aggregation for Shanghai and
//! Shenzhen listed securities.
//!
//! ## Overview
//!
//! - **Symbol catalog** loaded once from CSV listings, queried by code
//!   prefix/suffix and fuzzy name
//! - **Resolver** from a bare six-digit code to an exchange-qualified id
//! - **Quote feeds** for Tencent, Eastmoney and Sina behind one trait, with
//!   ordered failover
//! - **Snapshot cache** with TTL, stale-serve and single-flight refresh
//! - **Temporal aggregator** turning daily limit-up rosters into a
//!   category by date heatmap
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider quote feeds and guarded upstream access |
//! | [`aggregator`] | Trailing-window limit-up heatmap |
//! | [`cache`] | Snapshot cache |
//! | [`calendar`] | Business-day window arithmetic |
//! | [`catalog`] | Symbol catalog and queries |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`config`] | Defaults and environment overrides |
//! | [`domain`] | Codes, symbols, quote snapshots, timestamps |
//! | [`envelope`] | Response envelope with metadata |
//! | [`error`] | Core error types |
//! | [`export`] | CSV export of query results |
//! | [`feed`] | Quote feed trait and request/response types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`provider_policy`] | Per-provider budgets |
//! | [`resolver`] | Code to exchange-qualified id |
//! | [`retry`] | Bounded retry with backoff |
//! | [`roster`] | Daily limit-up roster sources |
//! | [`routing`] | Feed selection and failover |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Rate limiting |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use ashare_core::{FeedRouter, SecurityCode, SnapshotCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = SnapshotCache::with_default_ttl(Arc::new(FeedRouter::default()));
//!     let quote = cache.get(&SecurityCode::parse("600519")?).await?;
//!     println!("{} {:.2} ({})", quote.snapshot.code, quote.snapshot.price, quote.freshness.as_str());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / caller   │
//! └──┬───────────┬──┘
//!    │           │
//!    ▼           ▼
//! ┌─────────┐ ┌─────────────────┐     ┌──────────────────┐
//! │ Catalog │ │ Snapshot Cache  │     │ Temporal         │
//! └─────────┘ └────────┬────────┘     │ Aggregator       │
//!                      ▼              └────────┬─────────┘
//!             ┌─────────────────┐              ▼
//!             │  Feed Router    │     ┌──────────────────┐
//!             └────────┬────────┘     │ Roster Source    │
//!                      ▼              └────────┬─────────┘
//!             ┌─────────────────┐              │
//!             │ Quote Feeds     │              │
//!             └────────┬────────┘              │
//!                      ▼                       ▼
//!             ┌──────────────────────────────────────────┐
//!             │ Upstream: breaker, throttle, retry, HTTP │
//!             └──────────────────────────────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Feed failures carry a stable code and a retry hint:
//!
//! ```rust
//! use ashare_core::{SourceError, SourceErrorKind};
//!
//! fn handle_error(error: SourceError) {
//!     match error.kind() {
//!         SourceErrorKind::Timeout | SourceErrorKind::Unavailable => {
//!             // another feed may still answer
//!         }
//!         SourceErrorKind::Parse => {
//!             // provider changed its format
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod calendar;
pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod export;
pub mod feed;
pub mod http_client;
pub mod provider_policy;
pub mod resolver;
pub mod retry;
pub mod roster;
pub mod routing;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{EastmoneyFeed, SinaFeed, TencentFeed, Upstream};

// Aggregation
pub use aggregator::{
    ActivityMatrix, AggregationReport, AggregatorConfig, DailyCategoryCount, TemporalAggregator,
};
pub use roster::{EastmoneyRosterSource, Roster, RosterSource};

// Caching
pub use cache::{CachedQuote, Freshness, SnapshotCache};

// Catalog
pub use catalog::{fuzzy_match, Catalog, CatalogQuery, CatalogSource};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use config::CoreConfig;

// Domain models
pub use domain::{shanghai_today, InstrumentKind, QuoteSnapshot, SecurityCode, Symbol, UtcDateTime};

// Envelope types
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};

// Error types
pub use error::{CacheError, CatalogError, CoreError, ValidationError};

pub use export::QuotedSymbol;

// Quote feed trait and types
pub use feed::{
    HealthState, HealthStatus, QuoteBatch, QuoteFeed, QuoteRequest, SourceError, SourceErrorKind,
};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Provider policies
pub use provider_policy::{BackoffPolicy, ProviderPolicy};

pub use resolver::{resolve, Exchange, ExchangeQualifiedId};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Routing types
pub use routing::{FeedRouter, RouteFailure, RouteResult, RouteSuccess, SourceSnapshot, SourceStrategy};

// Source identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::{Throttle, ThrottlePermit};
