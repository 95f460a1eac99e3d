use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use wanderer_sync::core::SyncError;
use wanderer_sync::core::http::middleware::{Middleware, Next, StatusCheck, Transport};
use wanderer_sync::core::http::retry_middleware::RetryMiddleware;
use wanderer_sync::core::http::{Auth, Request, Response, Service, parse_retry_after};

/// Serves a scripted sequence of responses without touching the network.
struct Scripted {
    responses: Mutex<VecDeque<Response>>,
}

impl Scripted {
    fn new(responses: Vec<Response>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl Middleware for Scripted {
    async fn call(&self, _request: Request, _next: Next<'_>) -> Result<Response, SyncError> {
        Ok(self
            .responses
            .lock()
            .pop_front()
            .expect("scripted responses exhausted"))
    }
}

fn response(status: u16, headers: &[(&str, &str)]) -> Response {
    Response {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        body: bytes::Bytes::from_static(b"{}"),
    }
}

fn request(service: Service) -> Request {
    Request::new(
        reqwest::Method::GET,
        "https://api.example.com/v1/thing",
        service,
    )
}

async fn run_chain(
    chain: Vec<Arc<dyn Middleware>>,
    req: Request,
) -> Result<Response, SyncError> {
    let transport = Transport::new().unwrap();
    Next::new(&chain, &transport).run(req).await
}

#[test]
fn test_parse_retry_after_integer_seconds() {
    assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
    assert_eq!(parse_retry_after(" 120 "), Some(Duration::from_secs(120)));
}

#[test]
fn test_parse_retry_after_http_date() {
    let future = chrono::Utc::now() + chrono::Duration::seconds(90);
    let parsed = parse_retry_after(&future.to_rfc2822()).unwrap();
    assert!(parsed >= Duration::from_secs(85));
    assert!(parsed <= Duration::from_secs(95));

    // A date in the past clamps to zero rather than failing.
    let past = chrono::Utc::now() - chrono::Duration::seconds(90);
    assert_eq!(parse_retry_after(&past.to_rfc2822()), Some(Duration::ZERO));
}

#[test]
fn test_parse_retry_after_garbage() {
    assert_eq!(parse_retry_after("soon"), None);
}

#[test]
fn test_auth_headers() {
    let mut headers = Vec::new();
    Auth::Bearer("tok".into()).apply(&mut headers);
    assert_eq!(
        headers,
        vec![("Authorization".to_string(), "Bearer tok".to_string())]
    );

    let mut headers = Vec::new();
    Auth::ApiKey("k-1".into()).apply(&mut headers);
    assert_eq!(headers, vec![("X-API-Key".to_string(), "k-1".to_string())]);

    let mut headers = Vec::new();
    Auth::Basic {
        user: "user".into(),
        pass: "pass".into(),
    }
    .apply(&mut headers);
    assert_eq!(
        headers,
        vec![(
            "Authorization".to_string(),
            "Basic dXNlcjpwYXNz".to_string()
        )]
    );

    let mut headers = Vec::new();
    Auth::None.apply(&mut headers);
    assert!(headers.is_empty());
}

#[test]
fn test_service_preset_table() {
    assert_eq!(Service::Esi.timeout(), Some(Duration::from_secs(3)));
    assert_eq!(Service::License.timeout(), Some(Duration::from_secs(3)));
    assert_eq!(Service::Map.timeout(), Some(Duration::from_secs(60)));
    assert_eq!(Service::Streaming.timeout(), None);

    assert_eq!(Service::Esi.max_retries(), 3);
    assert_eq!(Service::License.max_retries(), 2);
    assert_eq!(Service::Map.max_retries(), 2);
    assert_eq!(Service::Streaming.max_retries(), 0);

    // Client 4xx codes are never retryable.
    for service in [Service::Esi, Service::License, Service::Map] {
        let codes = service.retryable_status_codes();
        assert!(!codes.contains(&400));
        assert!(!codes.contains(&401));
        assert!(!codes.contains(&404));
    }
    assert!(Service::Map.retryable_status_codes().contains(&503));
    assert!(!Service::Map.retryable_status_codes().contains(&429));
    assert!(Service::Esi.retryable_status_codes().contains(&429));
}

#[tokio::test]
async fn test_status_check_passes_success_through() {
    let chain: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(StatusCheck),
        Scripted::new(vec![response(200, &[])]),
    ];
    let result = run_chain(chain, request(Service::Map)).await.unwrap();
    assert_eq!(result.status, 200);
}

#[tokio::test]
async fn test_status_check_maps_client_errors() {
    for (status, expected) in [
        (400, SyncError::BadRequest),
        (401, SyncError::Unauthorized),
        (403, SyncError::Forbidden),
        (404, SyncError::NotFound),
    ] {
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(StatusCheck),
            Scripted::new(vec![response(status, &[])]),
        ];
        let error = run_chain(chain, request(Service::Map)).await.unwrap_err();
        assert_eq!(error, expected);
    }
}

#[tokio::test]
async fn test_status_check_extracts_retry_after_on_429() {
    let chain: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(StatusCheck),
        Scripted::new(vec![response(429, &[("retry-after", "2")])]),
    ];
    let error = run_chain(chain, request(Service::License)).await.unwrap_err();
    assert_eq!(
        error,
        SyncError::RateLimited {
            retry_after: Some(Duration::from_secs(2))
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_request_honours_retry_after_then_succeeds() {
    // A 429 with Retry-After: 2 sleeps ~2 s, then the second attempt's 200
    // surfaces as success.
    let started = tokio::time::Instant::now();
    let chain: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(RetryMiddleware::for_service(Service::License)),
        Arc::new(StatusCheck),
        Scripted::new(vec![
            response(429, &[("retry-after", "2")]),
            response(200, &[]),
        ]),
    ];
    let result = run_chain(chain, request(Service::License)).await.unwrap();
    assert_eq!(result.status, 200);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_preset_attempts() {
    // License allows 2 attempts; a third 500 is never consumed.
    let chain: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(RetryMiddleware::for_service(Service::License)),
        Arc::new(StatusCheck),
        Scripted::new(vec![
            response(500, &[]),
            response(500, &[]),
            response(200, &[]),
        ]),
    ];
    let error = run_chain(chain, request(Service::License)).await.unwrap_err();
    assert_eq!(
        error,
        SyncError::HttpStatus {
            status: 500,
            retry_after: None
        }
    );
}

#[tokio::test]
async fn test_retry_does_not_touch_client_errors() {
    let chain: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(RetryMiddleware::for_service(Service::Map)),
        Arc::new(StatusCheck),
        Scripted::new(vec![response(404, &[]), response(200, &[])]),
    ];
    let error = run_chain(chain, request(Service::Map)).await.unwrap_err();
    assert_eq!(error, SyncError::NotFound);
}

#[test]
fn test_request_host_extraction() {
    assert_eq!(request(Service::Map).host(), "api.example.com");
    let bad = Request::new(reqwest::Method::GET, "not a url", Service::Map);
    assert_eq!(bad.host(), "unknown");
}
