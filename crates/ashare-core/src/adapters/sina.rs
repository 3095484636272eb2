use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::adapters::{parse_number, quoted_payload, Upstream};
use crate::feed::{HealthStatus, QuoteBatch, QuoteFeed, QuoteRequest, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::resolver::resolve;
use crate::{ProviderId, QuoteSnapshot, SecurityCode, UtcDateTime};

const ENDPOINT: &str = "https://hq.sinajs.cn/list=";
// Requests without this referer are answered with 403.
const REFERER: &str = "https://finance.sina.com.cn";
const VAR_PREFIX: &str = "hq_str_";
const MIN_FIELDS: usize = 4;

/// Sina `hq.sinajs.cn` quote feed.
#[derive(Clone)]
pub struct SinaFeed {
    upstream: Upstream,
}

impl Default for SinaFeed {
    fn default() -> Self {
        Self {
            upstream: Upstream::reqwest(ProviderId::Sina),
        }
    }
}

impl SinaFeed {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Sina, http_client),
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

impl QuoteFeed for SinaFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Sina
    }

    fn fetch<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteBatch, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let request = HttpRequest::get(Self::endpoint(&req)).with_header("Referer", REFERER);
            let body = self.upstream.get_text(request).await?;
            Ok(parse_body(&body, UtcDateTime::now()))
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Parses `var hq_str_sh600519="name,open,prev_close,price,...";` lines.
///
/// The code is taken from the variable name since the payload does not
/// repeat it.
pub(crate) fn parse_body(body: &str, fetched_at: UtcDateTime) -> QuoteBatch {
    let mut batch = QuoteBatch::default();

    for line in body.lines() {
        let Some(payload) = quoted_payload(line) else {
            continue;
        };
        let fields: Vec<&str> = payload.split(',').collect();
        if fields.len() < MIN_FIELDS {
            continue;
        }

        match parse_record(line, &fields) {
            Some(snapshot) => batch.insert(snapshot.with_fetched_at(fetched_at)),
            None => {
                debug!(line = line.trim(), "dropping unparsable sina record");
                batch.dropped += 1;
            }
        }
    }

    batch
}

fn parse_record(line: &str, fields: &[&str]) -> Option<QuoteSnapshot> {
    let code = code_from_var(line)?;
    let open = parse_number(fields[1])?;
    let prev_close = parse_number(fields[2])?;
    let price = parse_number(fields[3])?;
    let name = Some(fields[0].trim().to_owned());

    QuoteSnapshot::new(code, name, price, prev_close, open, ProviderId::Sina).ok()
}

/// `var hq_str_sz000001="..."` → `000001`.
fn code_from_var(line: &str) -> Option<SecurityCode> {
    let start = line.find(VAR_PREFIX)? + VAR_PREFIX.len();
    let end = start + line[start..].find('=')?;
    let qualified = &line[start..end];
    SecurityCode::parse(qualified.get(2..)?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{block_on, RecordingHttpClient};

    const BODY: &str = "var hq_str_sh600519=\"贵州茅台,1690.50,1680.00,1700.00,1710.00,1675.00\";\n\
                        var hq_str_sz000001=\"平安银行,10.10,10.00,10.50,10.60,9.90\";\n";

    fn code(raw: &str) -> SecurityCode {
        SecurityCode::parse(raw).expect("valid code")
    }

    #[test]
    fn parses_comma_records_using_var_name_for_code() {
        let batch = parse_body(BODY, UtcDateTime::now());

        assert_eq!(batch.quotes.len(), 2);
        let moutai = &batch.quotes[&code("600519")];
        assert_eq!(moutai.name.as_deref(), Some("贵州茅台"));
        assert_eq!(moutai.open, 1690.5);
        assert_eq!(moutai.prev_close, 1680.0);
        assert_eq!(moutai.price, 1700.0);
        assert_eq!(moutai.source, ProviderId::Sina);
    }

    #[test]
    fn empty_payload_for_unknown_code_is_skipped() {
        let body = format!("{BODY}var hq_str_sz999999=\"\";\n");
        let batch = parse_body(&body, UtcDateTime::now());

        assert_eq!(batch.quotes.len(), 2);
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn malformed_price_is_dropped() {
        let body = "var hq_str_sh600000=\"浦发银行,7.00,7.10,--,7.20\";";
        let batch = parse_body(body, UtcDateTime::now());

        assert!(batch.quotes.is_empty());
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn fetch_sends_referer_header() {
        let client = Arc::new(RecordingHttpClient::body(BODY));
        let feed = SinaFeed::with_http_client(client.clone());
        let request = QuoteRequest::new(vec![code("600519"), code("000001")]).expect("valid");

        let batch = block_on(feed.fetch(request)).expect("fetch should succeed");
        assert_eq!(batch.quotes.len(), 2);

        let requests = client.recorded_requests();
        assert_eq!(requests[0].url, "https://hq.sinajs.cn/list=sh600519,sz000001");
        assert_eq!(
            requests[0].headers.get("referer").map(String::as_str),
            Some(REFERER)
        );
    }
}
