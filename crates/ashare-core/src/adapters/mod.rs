//! Provider adapters.
//!
//! | Adapter | Wire format |
//! |---------|-------------|
//! | [`TencentFeed`] | `v_sh600519="1~name~code~price~prev_close~open~...";` |
//! | [`SinaFeed`] | `var hq_str_sh600519="name,open,prev_close,price,...";` |
//! | [`EastmoneyFeed`] | JSONP-wrapped `data.diff[]` records |
//! | [`EastmoneyRosterSource`](crate::roster::EastmoneyRosterSource) | daily limit-up pool JSON |
//!
//! All of them reach the network through [`Upstream`], which layers the
//! circuit breaker, the provider throttle and bounded retry over an
//! [`HttpClient`].

mod eastmoney;
mod sina;
mod tencent;

pub use eastmoney::EastmoneyFeed;
pub use sina::SinaFeed;
pub use tencent::TencentFeed;

pub(crate) use eastmoney::strip_jsonp;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::feed::{HealthState, HealthStatus, SourceError, SourceErrorKind};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient, DEFAULT_TIMEOUT_MS};
use crate::provider_policy::ProviderPolicy;
use crate::retry::RetryConfig;
use crate::throttling::Throttle;
use crate::ProviderId;

/// Guarded HTTP access for one provider.
#[derive(Clone)]
pub struct Upstream {
    provider: ProviderId,
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    throttle: Throttle,
    retry: RetryConfig,
    timeout_ms: u64,
}

impl Upstream {
    pub fn new(provider: ProviderId, http_client: Arc<dyn HttpClient>) -> Self {
        let policy = ProviderPolicy::default_for(provider);
        Self {
            provider,
            http_client,
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            throttle: Throttle::from_policy(&policy),
            retry: policy.retry_backoff.to_retry_config(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn reqwest(provider: ProviderId) -> Self {
        Self::new(provider, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub const fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Health derived from the breaker: open means unhealthy.
    pub fn health(&self) -> HealthStatus {
        match self.circuit_breaker.state() {
            CircuitState::Closed => HealthStatus::healthy(),
            CircuitState::HalfOpen => HealthStatus::new(HealthState::Degraded, true),
            CircuitState::Open => HealthStatus::new(HealthState::Unhealthy, false),
        }
    }

    /// Issues `request` and returns the body of a 2xx response.
    pub async fn get_text(&self, request: HttpRequest) -> Result<String, SourceError> {
        let request = request.with_timeout_ms(self.timeout_ms);
        let retry = &self.retry;

        retry
            .run(
                |attempt| {
                    let request = request.clone();
                    async move {
                        if attempt > 0 {
                            debug!(provider = %self.provider, attempt, "retrying upstream call");
                        }
                        self.attempt(request).await
                    }
                },
                |error| match error.kind() {
                    SourceErrorKind::Timeout => retry.retry_timeouts && error.retryable(),
                    _ => error.retryable(),
                },
            )
            .await
    }

    async fn attempt(&self, request: HttpRequest) -> Result<String, SourceError> {
        if !self.circuit_breaker.allow_request() {
            return Err(SourceError::rejected(format!(
                "{} circuit breaker is open; skipping upstream call",
                self.provider
            )));
        }

        let _permit = self.throttle.acquire().await;

        let response = self.http_client.execute(request).await.map_err(|error| {
            self.circuit_breaker.record_failure();
            warn!(provider = %self.provider, error = error.message(), "transport error");
            let message = format!("{} {error}", self.provider);
            if error.timed_out() {
                SourceError::timeout(message)
            } else if error.retryable() {
                SourceError::unavailable(message)
            } else {
                SourceError::rejected(message)
            }
        })?;

        if !response.is_success() {
            self.circuit_breaker.record_failure();
            let message = format!("{} upstream returned status {}", self.provider, response.status);
            return Err(if response.status == 429 {
                SourceError::rate_limited(message)
            } else if self.retry.is_transient_status(response.status) {
                SourceError::unavailable(message)
            } else {
                SourceError::rejected(message)
            });
        }

        self.circuit_breaker.record_success();
        Ok(response.body)
    }
}

/// Parses one numeric field. Providers use `-` or an empty string for
/// "no value"; those and anything non-finite come back as `None`.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Text between the first and the last double quote of a line.
pub(crate) fn quoted_payload(line: &str) -> Option<&str> {
    let start = line.find('"')?;
    let end = line.rfind('"')?;
    (end > start).then(|| &line[start + 1..end])
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingHttpClient;
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::http_client::{HttpError, HttpResponse};
    use std::time::Duration;

    fn upstream(client: Arc<RecordingHttpClient>) -> Upstream {
        Upstream::new(ProviderId::Tencent, client)
            .with_retry(RetryConfig::fixed(Duration::from_millis(1), 2))
    }

    #[test]
    fn parse_number_treats_dash_as_missing() {
        assert_eq!(parse_number(" 12.50 "), Some(12.5));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let client = Arc::new(RecordingHttpClient::respond(Ok(HttpResponse::with_status(
            503, "",
        ))));
        let error = upstream(client.clone())
            .get_text(HttpRequest::get("https://qt.gtimg.cn/q=sh600519"))
            .await
            .expect_err("503 must fail");

        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert_eq!(client.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let client = Arc::new(RecordingHttpClient::respond(Ok(HttpResponse::with_status(
            404, "",
        ))));
        let error = upstream(client.clone())
            .get_text(HttpRequest::get("https://qt.gtimg.cn/q=sh600519"))
            .await
            .expect_err("404 must fail");

        assert!(!error.retryable());
        assert_eq!(client.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn timeouts_map_to_timeout_kind() {
        let client = Arc::new(RecordingHttpClient::respond(Err(HttpError::timeout("slow"))));
        let error = upstream(client)
            .with_retry(RetryConfig::no_retry())
            .get_text(HttpRequest::get("https://qt.gtimg.cn/q=sh600519"))
            .await
            .expect_err("timeout must fail");

        assert_eq!(error.kind(), SourceErrorKind::Timeout);
        assert_eq!(error.code(), "source.timeout");
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_and_reports_unhealthy() {
        let client = Arc::new(RecordingHttpClient::respond(Err(HttpError::transport("reset"))));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        }));
        let upstream = upstream(client.clone()).with_circuit_breaker(breaker);

        let _ = upstream
            .get_text(HttpRequest::get("https://qt.gtimg.cn/q=sh600519"))
            .await;

        assert_eq!(client.recorded_requests().len(), 1);
        assert!(upstream.health().is_unhealthy());
    }

    #[tokio::test]
    async fn request_carries_configured_timeout() {
        let client = Arc::new(RecordingHttpClient::body("ok"));
        let body = upstream(client.clone())
            .with_timeout_ms(1_234)
            .get_text(HttpRequest::get("https://qt.gtimg.cn/q=sh600519"))
            .await
            .expect("success");

        assert_eq!(body, "ok");
        assert_eq!(client.recorded_requests()[0].timeout_ms, 1_234);
    }

    #[tokio::test]
    async fn concurrency_slot_is_released_after_each_call() {
        let client = Arc::new(RecordingHttpClient::respond(Ok(HttpResponse::with_status(
            503, "",
        ))));
        let upstream = upstream(client);
        let slots = ProviderPolicy::tencent_default().max_concurrency;
        assert_eq!(upstream.throttle.available_slots(), slots);

        let _ = upstream
            .get_text(HttpRequest::get("https://qt.gtimg.cn/q=sh600519"))
            .await;

        assert_eq!(upstream.throttle.available_slots(), slots);
    }
}
