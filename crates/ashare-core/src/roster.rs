//! Daily limit-up rosters.
//!
//! A [`Roster`] is a small string table: one row per security that closed
//! at its limit on a given trading day, with a category column the
//! aggregator tallies.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use time::Date;
use tracing::debug;

use crate::adapters::{strip_jsonp, Upstream};
use crate::feed::SourceError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::ProviderId;

pub const CODE_COLUMN: &str = "代码";
pub const NAME_COLUMN: &str = "名称";
pub const INDUSTRY_COLUMN: &str = "所属行业";

const ENDPOINT: &str = "https://push2ex.eastmoney.com/getTopicZTPool";
const UT: &str = "7eea3edcaed734bea9cbfc24409ed989";

/// Column-named table returned by a [`RosterSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Roster {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// A roster with the standard columns and no rows.
    pub fn empty_pool() -> Self {
        Self::new(standard_columns(), Vec::new())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Value at (`row`, `column`); short rows read as absent.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn standard_columns() -> Vec<String> {
    [CODE_COLUMN, NAME_COLUMN, INDUSTRY_COLUMN]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Provider of one roster per trading day.
pub trait RosterSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn fetch_roster<'a>(
        &'a self,
        date: Date,
    ) -> Pin<Box<dyn Future<Output = Result<Roster, SourceError>> + Send + 'a>>;
}

/// Eastmoney limit-up pool (`getTopicZTPool`).
///
/// The upstream is built without its own retry so the aggregator owns the
/// retry budget and the per-day timeout.
#[derive(Clone)]
pub struct EastmoneyRosterSource {
    upstream: Upstream,
}

impl Default for EastmoneyRosterSource {
    fn default() -> Self {
        Self::with_upstream(Upstream::reqwest(ProviderId::Eastmoney))
    }
}

impl EastmoneyRosterSource {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_upstream(Upstream::new(ProviderId::Eastmoney, http_client))
    }

    pub fn with_upstream(upstream: Upstream) -> Self {
        Self {
            upstream: upstream.with_retry(RetryConfig::no_retry()),
        }
    }

    pub fn endpoint(date: Date) -> String {
        format!(
            "{ENDPOINT}?ut={UT}&dpt=wz.ztzt&Pageindex=0&pagesize=10000&sort=fbt:asc&date={}",
            compact_date(date)
        )
    }
}

impl RosterSource for EastmoneyRosterSource {
    fn id(&self) -> ProviderId {
        ProviderId::Eastmoney
    }

    fn fetch_roster<'a>(
        &'a self,
        date: Date,
    ) -> Pin<Box<dyn Future<Output = Result<Roster, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let body = self
                .upstream
                .get_text(HttpRequest::get(Self::endpoint(date)))
                .await?;
            let roster = parse_pool(&body)?;
            debug!(%date, rows = roster.len(), "fetched limit-up roster");
            Ok(roster)
        })
    }
}

/// `YYYYMMDD`, as the pool endpoint expects.
fn compact_date(date: Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[derive(Debug, Deserialize)]
struct PoolEnvelope {
    data: Option<PoolData>,
}

#[derive(Debug, Deserialize)]
struct PoolData {
    #[serde(default)]
    pool: Vec<PoolEntry>,
}

#[derive(Debug, Deserialize)]
struct PoolEntry {
    #[serde(default)]
    c: String,
    #[serde(default)]
    n: String,
    #[serde(default)]
    hybk: String,
}

pub(crate) fn parse_pool(body: &str) -> Result<Roster, SourceError> {
    let envelope: PoolEnvelope = serde_json::from_str(strip_jsonp(body)).map_err(|error| {
        SourceError::parse(format!("eastmoney roster body is not valid JSON: {error}"))
    })?;

    let Some(data) = envelope.data else {
        return Ok(Roster::empty_pool());
    };

    let rows = data
        .pool
        .into_iter()
        .map(|entry| vec![entry.c, entry.n, entry.hybk.trim().to_owned()])
        .collect();

    Ok(Roster::new(standard_columns(), rows))
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::adapters::testing::{block_on, RecordingHttpClient};
    use crate::feed::SourceErrorKind;
    use crate::http_client::{HttpError, HttpResponse};

    const POOL: &str = r#"{"rc":0,"data":{"tc":3,"pool":[
        {"c":"600519","n":"贵州茅台","hybk":"酿酒行业"},
        {"c":"000858","n":"五粮液","hybk":"酿酒行业"},
        {"c":"300750","n":"宁德时代","hybk":" 电池 "}
    ]}}"#;

    #[test]
    fn formats_compact_date() {
        assert_eq!(compact_date(date!(2024 - 03 - 08)), "20240308");
    }

    #[test]
    fn endpoint_carries_date_and_page_size() {
        let url = EastmoneyRosterSource::endpoint(date!(2024 - 03 - 29));
        assert!(url.starts_with(ENDPOINT));
        assert!(url.ends_with("&date=20240329"));
        assert!(url.contains("pagesize=10000"));
    }

    #[test]
    fn maps_pool_entries_to_columns() {
        let roster = parse_pool(POOL).expect("valid pool");

        assert_eq!(roster.len(), 3);
        let industry = roster.column_index(INDUSTRY_COLUMN).expect("industry column");
        assert_eq!(roster.cell(0, industry), Some("酿酒行业"));
        assert_eq!(roster.cell(2, industry), Some("电池"));
        assert_eq!(roster.cell(1, 0), Some("000858"));
    }

    #[test]
    fn null_data_is_empty_roster_with_columns() {
        let roster = parse_pool(r#"{"rc":0,"data":null}"#).expect("null data is fine");

        assert!(roster.is_empty());
        assert!(roster.column_index(INDUSTRY_COLUMN).is_some());
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let error = parse_pool("<html>").expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Parse);
    }

    #[test]
    fn fetch_roster_requests_the_day() {
        let client = Arc::new(RecordingHttpClient::body(POOL));
        let source = EastmoneyRosterSource::with_http_client(client.clone());

        let roster = block_on(source.fetch_roster(date!(2024 - 03 - 29))).expect("fetch succeeds");
        assert_eq!(roster.len(), 3);
        assert!(client.recorded_requests()[0].url.ends_with("date=20240329"));
    }

    #[test]
    fn upstream_failures_are_not_retried_here() {
        let client = Arc::new(RecordingHttpClient::respond(Ok(HttpResponse::with_status(
            503, "",
        ))));
        let source = EastmoneyRosterSource::with_http_client(client.clone());

        let error = block_on(source.fetch_roster(date!(2024 - 03 - 29))).expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert_eq!(client.recorded_requests().len(), 1);
    }

    #[test]
    fn transport_timeout_surfaces_as_timeout() {
        let client = Arc::new(RecordingHttpClient::respond(Err(HttpError::timeout(
            "deadline elapsed",
        ))));
        let source = EastmoneyRosterSource::with_http_client(client);

        let error = block_on(source.fetch_roster(date!(2024 - 03 - 29))).expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Timeout);
    }
}
