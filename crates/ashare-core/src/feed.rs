//! Quote feed contract and its request/response types.
//!
//! Every live-quote provider implements [`QuoteFeed`]. A feed receives a
//! de-duplicated set of codes, issues one batched upstream call and returns
//! whatever records it could parse. Missing codes are not an error: a
//! [`QuoteBatch`] is allowed to be partial.
//!
//! ```rust,ignore
//! use ashare_core::{QuoteFeed, QuoteRequest, SecurityCode, TencentFeed};
//!
//! async fn price_of(feed: &TencentFeed) -> Result<(), ashare_core::SourceError> {
//!     let code = SecurityCode::parse("600519")?;
//!     let batch = feed.fetch(QuoteRequest::new(vec![code.clone()])?).await?;
//!     if let Some(quote) = batch.quotes.get(&code) {
//!         println!("{}: {:.2}", quote.code, quote.price);
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{ProviderId, QuoteSnapshot, SecurityCode, ValidationError};

/// Coarse health used by `auto` routing and the `sources` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }

    pub const fn is_unhealthy(self) -> bool {
        matches!(self.state, HealthState::Unhealthy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    Timeout,
    RateLimited,
    Parse,
    InvalidRequest,
    AdapterNotRegistered,
}

/// Structured upstream error carried through routing and into envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    /// An upstream failure that repeating the call will not fix (4xx etc).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Parse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn adapter_not_registered(provider: ProviderId) -> Self {
        Self {
            kind: SourceErrorKind::AdapterNotRegistered,
            message: format!("source adapter '{provider}' is not registered"),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::AdapterNotRegistered => "source.adapter_not_registered",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

/// A non-empty, de-duplicated set of codes to quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    codes: Vec<SecurityCode>,
}

impl QuoteRequest {
    /// Keeps the first occurrence of each code, in input order.
    pub fn new(codes: impl IntoIterator<Item = SecurityCode>) -> Result<Self, SourceError> {
        let mut seen = BTreeSet::new();
        let codes: Vec<SecurityCode> = codes
            .into_iter()
            .filter(|code| seen.insert(code.clone()))
            .collect();

        if codes.is_empty() {
            return Err(SourceError::invalid_request(
                "quote request must include at least one code",
            ));
        }
        Ok(Self { codes })
    }

    pub fn codes(&self) -> &[SecurityCode] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Parsed records of one upstream call.
///
/// `dropped` counts records the provider returned but that could not be
/// normalized (bad numeric field, unknown code, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteBatch {
    pub quotes: BTreeMap<SecurityCode, QuoteSnapshot>,
    pub dropped: usize,
}

impl QuoteBatch {
    pub fn insert(&mut self, snapshot: QuoteSnapshot) {
        self.quotes.insert(snapshot.code.clone(), snapshot);
    }

    /// Requested codes with no record in this batch.
    pub fn missing<'a>(&'a self, request: &'a QuoteRequest) -> impl Iterator<Item = &'a SecurityCode> {
        request
            .codes()
            .iter()
            .filter(|code| !self.quotes.contains_key(*code))
    }
}

/// Live-quote provider contract.
///
/// Implementations must be `Send + Sync`; the router and cache share them
/// behind `Arc`.
pub trait QuoteFeed: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Fetches quotes for every code in `req` with a single upstream call.
    ///
    /// Transport failures and non-2xx statuses are
    /// [`SourceErrorKind::Unavailable`] or [`SourceErrorKind::Timeout`]; a
    /// body that cannot be interpreted at all is [`SourceErrorKind::Parse`].
    fn fetch<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteBatch, SourceError>> + Send + 'a>>;

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>>;
}
