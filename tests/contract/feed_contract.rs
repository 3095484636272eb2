use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use ashare_core::{
    EastmoneyFeed, HttpClient, HttpError, HttpRequest, HttpResponse, ProviderId, QuoteFeed,
    QuoteRequest, SecurityCode, SinaFeed, SourceErrorKind, TencentFeed,
};

/// Serves one canned response and keeps every request it saw.
struct CannedHttpClient {
    response: Result<HttpResponse, HttpError>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl CannedHttpClient {
    fn body(body: &str) -> Arc<Self> {
        Self::respond(Ok(HttpResponse::ok_text(body)))
    }

    fn respond(response: Result<HttpResponse, HttpError>) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }
}

impl HttpClient for CannedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .push(request);
        let response = self.response.clone();
        Box::pin(async move { response })
    }
}

const TENCENT_BODY: &str = "v_sh600519=\"1~贵州茅台~600519~1700.00~1680.00~1690.50~12345\";\n\
v_sz000001=\"51~平安银行~000001~10.50~10.00~10.10~98765\";\n\
v_sz000002=\"51~万科Ａ~000002~-~8.00~8.10\";\n";

const SINA_BODY: &str = "var hq_str_sh600519=\"贵州茅台,1690.50,1680.00,1700.00,1705.00,1685.00\";\n\
var hq_str_sz000001=\"平安银行,10.10,10.00,10.50,10.60,10.00\";\n\
var hq_str_sz000002=\"\";\n";

const EASTMONEY_BODY: &str = r#"ashare_quote({"rc":0,"data":{"total":3,"diff":[
    {"f2":1700.0,"f12":"600519","f14":"贵州茅台","f17":1690.5,"f18":1680.0},
    {"f2":"10.50","f12":"000001","f14":"平安银行","f17":"10.10","f18":"10.00"},
    {"f2":"-","f12":"000002","f14":"万科Ａ","f17":"-","f18":8.0}
]}});"#;

struct FeedCase {
    id: ProviderId,
    feed: Arc<dyn QuoteFeed>,
    client: Arc<CannedHttpClient>,
    /// Records in the canned body that the adapter must reject.
    malformed: usize,
}

fn feed_cases() -> Vec<FeedCase> {
    let tencent = CannedHttpClient::body(TENCENT_BODY);
    let sina = CannedHttpClient::body(SINA_BODY);
    let eastmoney = CannedHttpClient::body(EASTMONEY_BODY);

    vec![
        FeedCase {
            id: ProviderId::Tencent,
            feed: Arc::new(TencentFeed::with_http_client(tencent.clone())),
            client: tencent,
            malformed: 1,
        },
        FeedCase {
            id: ProviderId::Sina,
            feed: Arc::new(SinaFeed::with_http_client(sina.clone())),
            client: sina,
            malformed: 0,
        },
        FeedCase {
            id: ProviderId::Eastmoney,
            feed: Arc::new(EastmoneyFeed::with_http_client(eastmoney.clone())),
            client: eastmoney,
            malformed: 1,
        },
    ]
}

fn code(raw: &str) -> SecurityCode {
    SecurityCode::parse(raw).expect("valid code")
}

fn request() -> QuoteRequest {
    QuoteRequest::new(vec![code("600519"), code("000001"), code("000002")])
        .expect("valid quote request")
}

#[test]
fn every_feed_reports_its_own_id() {
    for case in feed_cases() {
        assert_eq!(case.feed.id(), case.id);
    }
}

#[test]
fn every_feed_normalizes_the_same_quotes() {
    for case in feed_cases() {
        let batch = block_on(case.feed.fetch(request()))
            .unwrap_or_else(|error| panic!("feed '{}' failed: {error}", case.id));

        assert_eq!(batch.quotes.len(), 2, "feed '{}': quote count", case.id);
        assert_eq!(batch.dropped, case.malformed, "feed '{}': dropped", case.id);

        let moutai = &batch.quotes[&code("600519")];
        assert_eq!(moutai.price, 1700.0, "feed '{}': price", case.id);
        assert_eq!(moutai.prev_close, 1680.0, "feed '{}': prev_close", case.id);
        assert_eq!(moutai.open, 1690.5, "feed '{}': open", case.id);
        assert_eq!(moutai.source, case.id);
        assert_eq!(moutai.change_abs, Some(20.0));
        let pct = moutai.change_pct.expect("derived percent");
        assert!((pct - 1.190_476).abs() < 1e-4, "feed '{}': change_pct {pct}", case.id);

        let pingan = &batch.quotes[&code("000001")];
        assert_eq!(pingan.name.as_deref(), Some("平安银行"));
        assert!((pingan.change_pct.expect("derived percent") - 5.0).abs() < 1e-9);

        let missing: Vec<_> = batch.missing(&request()).cloned().collect();
        assert_eq!(missing, vec![code("000002")], "feed '{}': missing", case.id);
    }
}

#[test]
fn every_feed_sends_one_batched_request() {
    for case in feed_cases() {
        block_on(case.feed.fetch(request())).expect("fetch succeeds");

        let urls = case.client.urls();
        assert_eq!(urls.len(), 1, "feed '{}': request count", case.id);
        let url = &urls[0];
        match case.id {
            ProviderId::Tencent | ProviderId::Sina => {
                assert!(url.contains("sh600519,sz000001,sz000002"), "{url}")
            }
            ProviderId::Eastmoney => assert!(url.contains("1.600519%2C0.000001%2C0.000002"), "{url}"),
        }
    }
}

fn feed_over(id: ProviderId, client: Arc<CannedHttpClient>) -> Arc<dyn QuoteFeed> {
    match id {
        ProviderId::Tencent => Arc::new(TencentFeed::with_http_client(client)),
        ProviderId::Sina => Arc::new(SinaFeed::with_http_client(client)),
        ProviderId::Eastmoney => Arc::new(EastmoneyFeed::with_http_client(client)),
    }
}

#[tokio::test]
async fn every_feed_maps_timeouts_to_timeout_kind_after_retrying() {
    for id in ProviderId::ALL {
        let client = CannedHttpClient::respond(Err(HttpError::timeout("deadline elapsed")));
        let feed = feed_over(id, client.clone());

        let error = feed.fetch(request()).await.expect_err("timeout must fail");
        assert_eq!(error.kind(), SourceErrorKind::Timeout, "feed '{id}'");
        assert_eq!(error.code(), "source.timeout");
        assert!(client.urls().len() > 1, "feed '{id}': timeouts are retried");
    }
}

#[test]
fn every_feed_gives_up_at_once_on_client_errors() {
    for id in ProviderId::ALL {
        let client = CannedHttpClient::respond(Ok(HttpResponse::with_status(404, "")));
        let feed = feed_over(id, client.clone());

        let error = block_on(feed.fetch(request())).expect_err("404 must fail");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable, "feed '{id}'");
        assert!(!error.retryable());
        assert_eq!(client.urls().len(), 1, "feed '{id}': no retry on 404");
    }
}

#[test]
fn an_empty_body_is_an_empty_batch_not_an_error() {
    for id in [ProviderId::Tencent, ProviderId::Sina] {
        let feed = feed_over(id, CannedHttpClient::body(""));

        let batch = block_on(feed.fetch(request())).expect("empty body is fine");
        assert!(batch.quotes.is_empty(), "feed '{id}'");
        assert_eq!(batch.dropped, 0);
    }
}

fn block_on<F>(future: F) -> F::Output
where
    F: Future,
{
    let waker = noop_waker();
    let mut context = Context::from_waker(&waker);
    let mut future = std::pin::pin!(future);

    loop {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(output) => return output,
            Poll::Pending => std::thread::yield_now(),
        }
    }
}

fn noop_waker() -> Waker {
    // SAFETY: The vtable functions never dereference the data pointer and are no-op operations.
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

fn noop_raw_waker() -> RawWaker {
    RawWaker::new(std::ptr::null(), &NOOP_RAW_WAKER_VTABLE)
}

unsafe fn noop_raw_waker_clone(_: *const ()) -> RawWaker {
    noop_raw_waker()
}

unsafe fn noop_raw_waker_noop(_: *const ()) {}

static NOOP_RAW_WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(
    noop_raw_waker_clone,
    noop_raw_waker_noop,
    noop_raw_waker_noop,
    noop_raw_waker_noop,
);
