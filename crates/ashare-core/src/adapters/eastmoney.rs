use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::adapters::{parse_number, Upstream};
use crate::feed::{HealthStatus, QuoteBatch, QuoteFeed, QuoteRequest, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::resolver::resolve;
use crate::{ProviderId, QuoteSnapshot, SecurityCode, UtcDateTime};

const ENDPOINT: &str = "https://push2.eastmoney.com/api/qt/ulist.np/get";
// f2 price, f12 code, f14 name, f17 open, f18 previous close
const FIELDS: &str = "f2,f12,f14,f17,f18";
const CALLBACK: &str = "ashare_quote";

/// Eastmoney `push2` batch quote feed (JSONP).
#[derive(Clone)]
pub struct EastmoneyFeed {
    upstream: Upstream,
}

impl Default for EastmoneyFeed {
    fn default() -> Self {
        Self {
            upstream: Upstream::reqwest(ProviderId::Eastmoney),
        }
    }
}

impl EastmoneyFeed {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Eastmoney, http_client),
        }
    }

    pub fn with_upstream(upstream: Upstream) -> Self {
        Self { upstream }
    }

    pub fn endpoint(req: &QuoteRequest) -> String {
        let secids = req
            .codes()
            .iter()
            .map(|code| resolve(code).secid())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{ENDPOINT}?fltt=2&invt=2&secids={}&fields={FIELDS}&cb={CALLBACK}",
            urlencoding::encode(&secids)
        )
    }
}

impl QuoteFeed for EastmoneyFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Eastmoney
    }

    fn fetch<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteBatch, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let body = self
                .upstream
                .get_text(HttpRequest::get(Self::endpoint(&req)))
                .await?;
            parse_body(&body, UtcDateTime::now())
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

#[derive(Debug, Deserialize)]
struct UlistEnvelope {
    data: Option<UlistData>,
}

#[derive(Debug, Deserialize)]
struct UlistData {
    #[serde(default)]
    diff: Vec<Value>,
}

/// Strips a `callback(...)` / `callback(...);` wrapper. Plain JSON passes
/// through untouched.
pub(crate) fn strip_jsonp(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }

    let unterminated = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    match (unterminated.find('('), unterminated.rfind(')')) {
        (Some(open), Some(close)) if close > open => &unterminated[open + 1..close],
        _ => trimmed,
    }
}

pub(crate) fn parse_body(body: &str, fetched_at: UtcDateTime) -> Result<QuoteBatch, SourceError> {
    let envelope: UlistEnvelope = serde_json::from_str(strip_jsonp(body)).map_err(|error| {
        SourceError::parse(format!("eastmoney quote body is not valid JSON: {error}"))
    })?;

    let mut batch = QuoteBatch::default();
    let Some(data) = envelope.data else {
        return Ok(batch);
    };

    for record in &data.diff {
        match parse_record(record) {
            Some(snapshot) => batch.insert(snapshot.with_fetched_at(fetched_at)),
            None => {
                debug!(%record, "dropping unparsable eastmoney record");
                batch.dropped += 1;
            }
        }
    }

    Ok(batch)
}

fn parse_record(record: &Value) -> Option<QuoteSnapshot> {
    let code = SecurityCode::parse(record.get("f12")?.as_str()?).ok()?;
    let price = number_field(record, "f2")?;
    let prev_close = number_field(record, "f18")?;
    let open = number_field(record, "f17")?;
    let name = record
        .get("f14")
        .and_then(Value::as_str)
        .map(|name| name.trim().to_owned());

    QuoteSnapshot::new(code, name, price, prev_close, open, ProviderId::Eastmoney).ok()
}

/// Fields arrive as JSON numbers, numeric strings or `"-"`.
fn number_field(record: &Value, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_number(text),
        _ => None,
    }
}
