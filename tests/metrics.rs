use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::Utc;
use quota_gateway::{
    identity::ClientId,
    metrics::{RATE_LIMITED, STORE_FAILURES},
    rate_limit::{FailurePolicy, Limits, RateLimiter, StoreKeys},
    state::AppState,
    store::{MemoryStore, QuotaStore, StoreError},
    upstream::Upstream,
    window::HourWindow,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const CLIENT_IP: &str = "203.0.113.7";

struct DownStore;

#[async_trait]
impl QuotaStore for DownStore {
    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        Err(StoreError::Corrupt {
            key: key.to_string(),
            value: "down".to_string(),
        })
    }

    async fn put(&self, key: &str, _value: u64, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Corrupt {
            key: key.to_string(),
            value: "down".to_string(),
        })
    }
}

fn app(store: Arc<dyn QuotaStore>) -> Router {
    let limiter = RateLimiter::new(store, Limits::default(), FailurePolicy::Open);
    // nothing listens on the discard port; no request here reaches upstream
    let upstream = Upstream::new(
        reqwest::Client::new(),
        "http://127.0.0.1:9/v1/messages",
        Some("test-key".to_string()),
    );
    quota_gateway::router(Arc::new(AppState::new(limiter, upstream)))
}

fn quota_status() -> Request<Body> {
    Request::builder()
        .uri("/api/quota")
        .header("x-forwarded-for", CLIENT_IP)
        .body(Body::empty())
        .unwrap()
}

fn user_rejections() -> f64 {
    RATE_LIMITED.with_label_values(&["user"]).get()
}

// Single test so no other request in this binary moves the counters.
#[tokio::test]
async fn quota_reads_leave_metrics_alone() {
    let store = Arc::new(MemoryStore::new());
    let keys = StoreKeys::new(&HourWindow::at(Utc::now()), &ClientId::from_address(CLIENT_IP));
    store
        .put(&keys.user, Limits::default().user, Duration::from_secs(3600))
        .await
        .unwrap();
    let exhausted = app(store);

    let before = user_rejections();
    for _ in 0..3 {
        let res = exhausted.clone().oneshot(quota_status()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    assert_eq!(user_rejections(), before);

    let failures = STORE_FAILURES.get();
    let res = app(Arc::new(DownStore)).oneshot(quota_status()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(STORE_FAILURES.get(), failures);

    // a real request from the same client is still counted
    let generate = Request::builder()
        .method(Method::POST)
        .uri("/api/generate")
        .header("x-forwarded-for", CLIENT_IP)
        .body(Body::from(
            json!({ "type": "copy", "messages": [{ "role": "user", "content": "hi" }] }).to_string(),
        ))
        .unwrap();
    let res = exhausted.oneshot(generate).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(user_rejections(), before + 1.0);
}
