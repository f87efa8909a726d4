//! Tests for provider queues and the reqwest transport.

use super::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Transport double: blocks on a gate, records concurrency and can fail on demand.
struct MockTransport {
    gate: Semaphore,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    failure: std::sync::Mutex<Option<TransportError>>,
}

impl MockTransport {
    fn open() -> Arc<Self> {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    fn gated() -> Arc<Self> {
        Self::with_permits(0)
    }

    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(permits),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            failure: std::sync::Mutex::new(None),
        })
    }

    fn fail_with(&self, error: Option<TransportError>) {
        *self.failure.lock().unwrap() = error;
    }

    fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(
        &self,
        request: &ProviderRequest,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(TransportResponse {
            status: 200,
            body: request.url.clone().into(),
        })
    }
}

/// Fails with a connection error once, then succeeds.
struct FlakyTransport {
    calls: AtomicUsize,
    failed: AtomicBool,
}

#[async_trait]
impl HttpTransport for FlakyTransport {
    async fn send(
        &self,
        _request: &ProviderRequest,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        Ok(TransportResponse {
            status: 200,
            body: "ok".into(),
        })
    }
}

async fn wait_for_stats(queue: &ProviderQueue, predicate: impl FnMut(&QueueStats) -> bool) {
    let mut stats = queue.subscribe_stats();
    tokio::time::timeout(Duration::from_secs(5), stats.wait_for(predicate))
        .await
        .expect("stats condition not reached")
        .expect("queue stopped");
}

#[tokio::test]
async fn test_successful_request() {
    let transport = MockTransport::open();
    let queue = ProviderQueue::spawn("custom", QueueSettings::default(), transport.clone());

    let response = queue
        .enqueue(ProviderRequest::get("https://auth.example.com/?a=1"), 0)
        .await;

    assert!(response.is_success());
    assert_eq!(response.status, Some(200));
    assert_eq!(response.body_text(), "https://auth.example.com/?a=1");
    assert_eq!(transport.calls(), 1);
    assert_eq!(queue.name(), "custom");
}

#[tokio::test]
async fn test_concurrency_is_capped() {
    let transport = MockTransport::gated();
    let settings = QueueSettings::default().with_max_concurrent_requests(2);
    let queue = ProviderQueue::spawn("capped", settings, transport.clone());

    let mut handles = Vec::new();
    for i in 0..5 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            queue
                .enqueue(ProviderRequest::get(format!("https://a/{i}")), 0)
                .await
        }));
    }

    wait_for_stats(&queue, |s| s.in_flight == 2 && s.queued == 3).await;

    transport.release(5);
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    assert_eq!(transport.calls(), 5);
    assert!(transport.max_active.load(Ordering::SeqCst) <= 2);
    wait_for_stats(&queue, |s| s.in_flight == 0 && s.queued == 0).await;
}

#[tokio::test]
async fn test_queue_full_is_answered_immediately() {
    let transport = MockTransport::gated();
    let settings = QueueSettings::default()
        .with_max_concurrent_requests(1)
        .with_max_queued_requests(1);
    let queue = ProviderQueue::spawn("full", settings, transport.clone());

    let first = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(ProviderRequest::get("https://a/1"), 0).await })
    };
    let second = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(ProviderRequest::get("https://a/2"), 0).await })
    };
    wait_for_stats(&queue, |s| s.in_flight == 1 && s.queued == 1).await;

    let rejected = queue.enqueue(ProviderRequest::get("https://a/3"), 0).await;
    assert_eq!(rejected.result, QueueResultCode::QueueFull);

    transport.release(2);
    assert!(first.await.unwrap().is_success());
    assert!(second.await.unwrap().is_success());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_times_out() {
    let transport = MockTransport::gated();
    let settings = QueueSettings::default()
        .with_max_concurrent_requests(1)
        .with_queue_timeout(Duration::from_secs(1));
    let queue = ProviderQueue::spawn("slow", settings, transport.clone());

    let first = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(ProviderRequest::get("https://a/1"), 0).await })
    };
    wait_for_stats(&queue, |s| s.in_flight == 1).await;

    let waited = queue.enqueue(ProviderRequest::get("https://a/2"), 0).await;
    assert_eq!(waited.result, QueueResultCode::QueueTimeout);
    assert!(waited.elapsed >= Duration::from_secs(1));

    transport.release(1);
    assert!(first.await.unwrap().is_success());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_offline_after_consecutive_errors() {
    let transport = MockTransport::open();
    transport.fail_with(Some(TransportError::Connect("refused".to_string())));
    let settings = QueueSettings::default().with_offline_threshold(3, Duration::from_secs(30));
    let queue = ProviderQueue::spawn("flaky", settings, transport.clone());

    for _ in 0..3 {
        let response = queue.enqueue(ProviderRequest::get("https://a/"), 0).await;
        assert_eq!(response.result, QueueResultCode::Error);
    }
    assert!(queue.stats().offline);

    let response = queue.enqueue(ProviderRequest::get("https://a/"), 0).await;
    assert_eq!(response.result, QueueResultCode::Offline);
    assert_eq!(transport.calls(), 3);

    // first request after the retry interval probes the provider
    tokio::time::advance(Duration::from_secs(31)).await;
    transport.fail_with(None);
    let response = queue.enqueue(ProviderRequest::get("https://a/"), 0).await;
    assert!(response.is_success());
    assert_eq!(transport.calls(), 4);

    let stats = queue.stats();
    assert!(!stats.offline);
    assert_eq!(stats.consecutive_errors, 0);
    assert_eq!(stats.total_errors, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_keeps_provider_offline() {
    let transport = MockTransport::open();
    transport.fail_with(Some(TransportError::Timeout));
    let settings = QueueSettings::default().with_offline_threshold(1, Duration::from_secs(10));
    let queue = ProviderQueue::spawn("down", settings, transport.clone());

    let response = queue.enqueue(ProviderRequest::get("https://a/"), 0).await;
    assert_eq!(response.result, QueueResultCode::RequestTimeout);

    tokio::time::advance(Duration::from_secs(11)).await;
    let probe = queue.enqueue(ProviderRequest::get("https://a/"), 0).await;
    assert_eq!(probe.result, QueueResultCode::RequestTimeout);

    let response = queue.enqueue(ProviderRequest::get("https://a/"), 0).await;
    assert_eq!(response.result, QueueResultCode::Offline);
    assert_eq!(transport.calls(), 2);
    assert_eq!(queue.stats().total_timeouts, 2);
}

#[tokio::test]
async fn test_connection_errors_are_retried() {
    let transport = Arc::new(FlakyTransport {
        calls: AtomicUsize::new(0),
        failed: AtomicBool::new(false),
    });
    let queue = ProviderQueue::spawn("retry", QueueSettings::default(), transport.clone());

    let response = queue.enqueue(ProviderRequest::get("https://a/"), 1).await;
    assert!(response.is_success());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_no_retry_without_retry_count() {
    let transport = Arc::new(FlakyTransport {
        calls: AtomicUsize::new(0),
        failed: AtomicBool::new(false),
    });
    let queue = ProviderQueue::spawn("no-retry", QueueSettings::default(), transport.clone());

    let response = queue.enqueue(ProviderRequest::get("https://a/"), 0).await;
    assert_eq!(response.result, QueueResultCode::Error);
    assert!(response.reason().contains("connection refused"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeouts_are_not_retried() {
    let transport = MockTransport::open();
    transport.fail_with(Some(TransportError::Timeout));
    let queue = ProviderQueue::spawn("timeout", QueueSettings::default(), transport.clone());

    let response = queue.enqueue(ProviderRequest::get("https://a/"), 3).await;
    assert_eq!(response.result, QueueResultCode::RequestTimeout);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_abandoned_caller_does_not_stop_queue() {
    let transport = MockTransport::gated();
    let queue = ProviderQueue::spawn("abandoned", QueueSettings::default(), transport.clone());

    let abandoned = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(ProviderRequest::get("https://a/1"), 0).await })
    };
    wait_for_stats(&queue, |s| s.in_flight == 1).await;
    abandoned.abort();

    transport.release(2);
    let response = queue.enqueue(ProviderRequest::get("https://a/2"), 0).await;
    assert!(response.is_success());
    wait_for_stats(&queue, |s| s.in_flight == 0).await;
}

#[tokio::test]
async fn test_reqwest_transport_get_with_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .and(query_param("ticket", "abc"))
        .and(query_param("appid", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ResultCode":1}"#))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new().unwrap();
    let request = ProviderRequest::get(format!("{}/auth?appid=42&ticket=abc", server.uri()));
    let response = transport
        .send(&request, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], br#"{"ResultCode":1}"#);
}

#[tokio::test]
async fn test_reqwest_transport_post_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"user": "a", "secret": "s"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new().unwrap();
    let request = ProviderRequest::post(
        format!("{}/auth", server.uri()),
        r#"{"user":"a","secret":"s"}"#,
    )
    .with_content_type("application/json");

    let response = transport
        .send(&request, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_reqwest_transport_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new().unwrap();
    let err = transport
        .send(&ProviderRequest::get(server.uri()), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        TransportError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_provider_queue_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let transport = Arc::new(ReqwestTransport::new().unwrap());
    let settings = QueueSettings::default().with_request_timeout(Duration::from_millis(50));
    let queue = ProviderQueue::spawn("http", settings, transport);

    let slow = queue
        .enqueue(ProviderRequest::get(format!("{}/slow", server.uri())), 1)
        .await;
    assert_eq!(slow.result, QueueResultCode::RequestTimeout);

    let broken = queue
        .enqueue(ProviderRequest::get(format!("{}/broken", server.uri())), 1)
        .await;
    assert_eq!(broken.result, QueueResultCode::Error);
    assert_eq!(broken.status, Some(500));
    assert_eq!(broken.body_text(), "boom");

    let stats = queue.stats();
    assert_eq!(stats.total_timeouts, 1);
    assert_eq!(stats.total_errors, 1);
    assert_eq!(stats.consecutive_errors, 2);
}

#[test]
fn test_request_query_accessor() {
    let request = ProviderRequest::get("https://a/auth?x=1&y=2");
    assert_eq!(request.query(), Some("x=1&y=2"));
    assert_eq!(ProviderRequest::get("https://a/auth").query(), None);
}
