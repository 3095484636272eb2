use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::adapters::{parse_number, quoted_payload, Upstream};
use crate::feed::{HealthStatus, QuoteBatch, QuoteFeed, QuoteRequest, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::resolver::resolve;
use crate::{ProviderId, QuoteSnapshot, SecurityCode, UtcDateTime};

const ENDPOINT: &str = "https://qt.gtimg.cn/q=";
const MIN_FIELDS: usize = 6;

/// Tencent `qt.gtimg.cn` quote feed.
#[derive(Clone)]
pub struct TencentFeed {
    upstream: Upstream,
}

impl Default for TencentFeed {
    fn default() -> Self {
        Self {
            upstream: Upstream::reqwest(ProviderId::Tencent),
        }
    }
}

impl TencentFeed {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Tencent, http_client),
        }
    }

    pub fn with_upstream(upstream: Upstream) -> Self {
        Self { upstream }
    }

    pub fn endpoint(req: &QuoteRequest) -> String {
        let ids = req
            .codes()
            .iter()
            .map(|code| resolve(code).prefixed())
            .collect::<Vec<_>>()
            .join(",");
        format!("{ENDPOINT}{ids}")
    }
}

impl QuoteFeed for TencentFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Tencent
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
            Ok(parse_body(&body, UtcDateTime::now()))
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Parses a `v_<id>="f0~f1~..."`-per-line body.
///
/// Lines with fewer than six fields (unknown codes come back as
/// `v_pv_none_match="1";`) are skipped silently; lines with enough fields
/// but an unusable code or number count towards `dropped`.
pub(crate) fn parse_body(body: &str, fetched_at: UtcDateTime) -> QuoteBatch {
    let mut batch = QuoteBatch::default();

    for line in body.lines() {
        let Some(payload) = quoted_payload(line) else {
            continue;
        };
        let fields: Vec<&str> = payload.split('~').collect();
        if fields.len() < MIN_FIELDS {
            continue;
        }

        match parse_fields(&fields) {
            Some(snapshot) => batch.insert(snapshot.with_fetched_at(fetched_at)),
            None => {
                debug!(line = line.trim(), "dropping unparsable tencent record");
                batch.dropped += 1;
            }
        }
    }

    batch
}

fn parse_fields(fields: &[&str]) -> Option<QuoteSnapshot> {
    let code = SecurityCode::parse(fields[2]).ok()?;
    let price = parse_number(fields[3])?;
    let prev_close = parse_number(fields[4])?;
    let open = parse_number(fields[5])?;
    let name = Some(fields[1].trim().to_owned());

    QuoteSnapshot::new(code, name, price, prev_close, open, ProviderId::Tencent).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{block_on, RecordingHttpClient};

    const BODY: &str = "v_sh600519=\"1~贵州茅台~600519~1700.00~1680.00~1690.50~12345~0~0\";\n\
                        v_sz000001=\"51~平安银行~000001~10.50~10.00~10.10~998\";\n";

    fn code(raw: &str) -> SecurityCode {
        SecurityCode::parse(raw).expect("valid code")
    }

    #[test]
    fn parses_tilde_records() {
        let batch = parse_body(BODY, UtcDateTime::now());

        assert_eq!(batch.quotes.len(), 2);
        assert_eq!(batch.dropped, 0);

        let moutai = &batch.quotes[&code("600519")];
        assert_eq!(moutai.name.as_deref(), Some("贵州茅台"));
        assert_eq!(moutai.price, 1700.0);
        assert_eq!(moutai.prev_close, 1680.0);
        assert_eq!(moutai.open, 1690.5);
        assert_eq!(moutai.source, ProviderId::Tencent);

        let pct = batch.quotes[&code("000001")].change_pct.expect("pct");
        assert!((pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn skips_short_and_none_match_lines() {
        let body = "v_pv_none_match=\"1\";\nv_sh600000=\"1~浦发银行~600000\";\n\n";
        let batch = parse_body(body, UtcDateTime::now());

        assert!(batch.quotes.is_empty());
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn bad_numeric_field_drops_only_that_record() {
        let body = format!("{BODY}v_sz300750=\"51~宁德时代~300750~abc~200.00~201.00\";\n");
        let batch = parse_body(&body, UtcDateTime::now());

        assert_eq!(batch.quotes.len(), 2);
        assert_eq!(batch.dropped, 1);
        assert!(!batch.quotes.contains_key(&code("300750")));
    }

    #[test]
    fn zero_prev_close_is_partial_not_dropped() {
        let body = "v_sh688999=\"1~新股~688999~25.00~0.00~0.00\";";
        let batch = parse_body(body, UtcDateTime::now());

        assert!(batch.quotes[&code("688999")].is_partial());
    }

    #[test]
    fn fetch_issues_one_batched_request() {
        let client = Arc::new(RecordingHttpClient::body(BODY));
        let feed = TencentFeed::with_http_client(client.clone());
        let request = QuoteRequest::new(vec![code("600519"), code("000001")]).expect("valid");

        let batch = block_on(feed.fetch(request)).expect("fetch should succeed");
        assert_eq!(batch.quotes.len(), 2);

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://qt.gtimg.cn/q=sh600519,sz000001");
    }
}
