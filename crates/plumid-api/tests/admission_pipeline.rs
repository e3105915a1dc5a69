//! 요청 수용 파이프라인 통합 테스트.
//!
//! 로컬 저장소로 전체 라우터를 구성하고 body 제한 → rate limit → 서명 검증 순서를
//! 실제 요청으로 확인합니다.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header::RETRY_AFTER, Request, StatusCode},
    response::Response,
    Router,
};
use futures::stream;
use plumid_api::admission::signature::{HEADER_NONCE, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use plumid_api::admission::{
    AdmissionError, AdmissionState, BucketDecision, LocalBucketStore, LocalNonceStore, NonceStore,
    TokenBucketBackend,
};
use plumid_api::routes::{create_app, UploadResponse};
use plumid_api::state::AppState;
use plumid_core::{AdmissionConfig, AppConfig};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

const UPLOAD_PATH: &str = "/upload/feather";

fn build(config: AdmissionConfig) -> (Router, AdmissionState) {
    let state = Arc::new(AppState::new(&AppConfig::default(), None));
    let admission = AdmissionState::local(&config).unwrap();
    (create_app(state, &admission), admission)
}

fn default_app() -> (Router, AdmissionState) {
    build(AdmissionConfig::default())
}

fn now() -> String {
    chrono::Utc::now().timestamp().to_string()
}

fn signed_upload(
    admission: &AdmissionState,
    timestamp: &str,
    nonce: &str,
    body: &'static [u8],
) -> Request<Body> {
    let signature = admission
        .verifier
        .sign("POST", UPLOAD_PATH, timestamp, nonce, body);

    Request::builder()
        .method("POST")
        .uri(UPLOAD_PATH)
        .header(HEADER_TIMESTAMP, timestamp)
        .header(HEADER_NONCE, nonce)
        .header(HEADER_SIGNATURE, signature)
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn error_code(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    json["code"].as_str().unwrap_or_default().to_string()
}

// ============================================================================
// 서명 검증
// ============================================================================

#[tokio::test]
async fn signed_upload_succeeds_once_then_replay_is_rejected() {
    let (app, admission) = default_app();
    let ts = now();

    let response = app
        .clone()
        .oneshot(signed_upload(&admission, &ts, "nonce-1", b"feather-bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-trace-id"));

    let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let upload: UploadResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(upload.status, "ok");
    assert_eq!(upload.size, b"feather-bytes".len());
    assert_eq!(upload.sha256, hex::encode(Sha256::digest(b"feather-bytes")));

    let replay = app
        .oneshot(signed_upload(&admission, &ts, "nonce-1", b"feather-bytes"))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(replay).await, "REPLAY_DETECTED");
}

#[tokio::test]
async fn unsigned_upload_is_unauthorized() {
    let (app, _) = default_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(UPLOAD_PATH)
                .body(Body::from("data"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "MISSING_SIGNATURE");
}

#[tokio::test]
async fn malformed_timestamp_is_bad_request() {
    let (app, admission) = default_app();

    let response = app
        .oneshot(signed_upload(&admission, "yesterday", "nonce-2", b"data"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "MALFORMED_TIMESTAMP");
}

#[tokio::test]
async fn stale_timestamp_is_unauthorized() {
    let (app, admission) = default_app();
    let stale = (chrono::Utc::now().timestamp() - 3_600).to_string();

    let response = app
        .oneshot(signed_upload(&admission, &stale, "nonce-3", b"data"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "STALE_TIMESTAMP");
}

#[tokio::test]
async fn tampered_body_is_unauthorized() {
    let (app, admission) = default_app();
    let ts = now();
    let signature = admission
        .verifier
        .sign("POST", UPLOAD_PATH, &ts, "nonce-4", b"original");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(UPLOAD_PATH)
                .header(HEADER_TIMESTAMP, ts.as_str())
                .header(HEADER_NONCE, "nonce-4")
                .header(HEADER_SIGNATURE, signature)
                .body(Body::from("tampered"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "BAD_SIGNATURE");
}

#[tokio::test]
async fn rate_limited_upload_leaves_nonce_unused() {
    let (app, admission) = build(AdmissionConfig {
        rl_default_per_min: 1,
        rl_burst: 1,
        ..Default::default()
    });
    let ts = now();
    let with_peer = |mut request: Request<Body>, peer: &str| {
        request
            .extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        request
    };

    let first = app
        .clone()
        .oneshot(with_peer(
            signed_upload(&admission, &ts, "nonce-a", b"one"),
            "203.0.113.1:5000",
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let limited = app
        .clone()
        .oneshot(with_peer(
            signed_upload(&admission, &ts, "nonce-b", b"two"),
            "203.0.113.1:5000",
        ))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    // 같은 nonce를 다른 클라이언트가 쓰면 통과한다: 429 요청은 검증 단계에 닿지 않았다
    let reused = app
        .oneshot(with_peer(
            signed_upload(&admission, &ts, "nonce-b", b"two"),
            "203.0.113.2:5000",
        ))
        .await
        .unwrap();
    assert_eq!(reused.status(), StatusCode::OK);
}

// ============================================================================
// 저장소 장애
// ============================================================================

struct DownBuckets;

#[async_trait::async_trait]
impl TokenBucketBackend for DownBuckets {
    async fn take(
        &self,
        _key: &str,
        _rate_per_sec: f64,
        _burst: u32,
        _cost: u32,
    ) -> Result<BucketDecision, AdmissionError> {
        Err(AdmissionError::BackendUnavailable("redis down".to_string()))
    }

    fn name(&self) -> &'static str {
        "down"
    }
}

struct DownNonces;

#[async_trait::async_trait]
impl NonceStore for DownNonces {
    async fn put_if_absent(&self, _nonce: &str, _ttl_secs: u64) -> Result<bool, AdmissionError> {
        Err(AdmissionError::BackendUnavailable("redis down".to_string()))
    }

    fn name(&self) -> &'static str {
        "down"
    }
}

fn build_with(
    buckets: Arc<dyn TokenBucketBackend>,
    nonces: Arc<dyn NonceStore>,
) -> (Router, AdmissionState) {
    let state = Arc::new(AppState::new(&AppConfig::default(), None));
    let admission = AdmissionState::new(&AdmissionConfig::default(), buckets, nonces).unwrap();
    (create_app(state, &admission), admission)
}

#[tokio::test]
async fn bucket_backend_outage_fails_closed() {
    let (app, admission) = build_with(Arc::new(DownBuckets), Arc::new(LocalNonceStore::new()));

    let response = app
        .clone()
        .oneshot(signed_upload(&admission, &now(), "nonce-6", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(response).await, "ADMISSION_BACKEND_UNAVAILABLE");

    // 제외 경로는 저장소를 거치지 않는다
    let health = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn nonce_backend_outage_fails_closed() {
    let (app, admission) = build_with(Arc::new(LocalBucketStore::new()), Arc::new(DownNonces));

    let response = app
        .oneshot(signed_upload(&admission, &now(), "nonce-7", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(response).await, "ADMISSION_BACKEND_UNAVAILABLE");
}

// ============================================================================
// Body 크기 제한
// ============================================================================

#[tokio::test]
async fn oversize_body_is_rejected_before_signature_check() {
    let (app, admission) = build(AdmissionConfig {
        max_request_body_bytes: 10,
        ..Default::default()
    });
    let ts = now();
    // 서명이 맞더라도 크기 제한이 먼저 적용된다
    let signature = admission
        .verifier
        .sign("POST", UPLOAD_PATH, &ts, "nonce-5", b"hello world");

    let chunks = stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"hello")),
        Ok(Bytes::from_static(b" world")),
    ]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(UPLOAD_PATH)
                .header(HEADER_TIMESTAMP, ts.as_str())
                .header(HEADER_NONCE, "nonce-5")
                .header(HEADER_SIGNATURE, signature.as_str())
                .body(Body::from_stream(chunks))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(response.headers().contains_key("x-trace-id"));

    // 거부된 요청은 nonce를 소비하지 않았다
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(UPLOAD_PATH)
                .header(HEADER_TIMESTAMP, ts.as_str())
                .header(HEADER_NONCE, "nonce-5")
                .header(
                    HEADER_SIGNATURE,
                    admission
                        .verifier
                        .sign("POST", UPLOAD_PATH, &ts, "nonce-5", b"small"),
                )
                .body(Body::from("small"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Rate limit
// ============================================================================

#[tokio::test]
async fn burst_exhaustion_returns_429_with_retry_after() {
    let (app, _) = build(AdmissionConfig {
        rl_default_per_min: 1,
        rl_burst: 2,
        ..Default::default()
    });

    for _ in 0..2 {
        let response = app.clone().oneshot(get("/species/1")).await.unwrap();
        // DB 미설정이므로 통과한 요청은 503
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    let response = app.oneshot(get("/species/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "60");
    assert_eq!(error_code(response).await, "RATE_LIMITED");
}

#[tokio::test]
async fn health_is_exempt_from_rate_limit() {
    let (app, _) = build(AdmissionConfig {
        rl_default_per_min: 1,
        rl_burst: 1,
        ..Default::default()
    });

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn login_uses_stricter_policy() {
    let (app, _) = build(AdmissionConfig {
        rl_burst: 5,
        rl_login_per_min: 1,
        ..Default::default()
    });

    let login = || {
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"mail":"kite@plumid.fr","password":"whatever1"}"#))
            .unwrap()
    };

    let first = app.clone().oneshot(login()).await.unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

    let second = app.clone().oneshot(login()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    // 다른 경로의 버킷은 영향받지 않는다
    let other = app.oneshot(get("/species/1")).await.unwrap();
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

fn from_peer(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/species/1");
    if let Some(value) = forwarded_for {
        builder = builder.header("x-forwarded-for", value);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
    request
}

#[tokio::test]
async fn clients_have_independent_buckets() {
    let (app, _) = build(AdmissionConfig {
        rl_default_per_min: 1,
        rl_burst: 1,
        ..Default::default()
    });

    let a1 = app.clone().oneshot(from_peer("203.0.113.1:5000", None)).await.unwrap();
    let a2 = app.clone().oneshot(from_peer("203.0.113.1:5001", None)).await.unwrap();
    let b1 = app.oneshot(from_peer("203.0.113.2:5000", None)).await.unwrap();

    assert_ne!(a1.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(a2.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_ne!(b1.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn spoofed_forwarded_for_does_not_reset_bucket() {
    let (app, _) = build(AdmissionConfig {
        rl_default_per_min: 1,
        rl_burst: 1,
        ..Default::default()
    });

    let first = app
        .clone()
        .oneshot(from_peer("198.51.100.7:40000", Some("10.0.0.1")))
        .await
        .unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

    for i in 2..10 {
        let forwarded = format!("10.0.0.{}", i);
        let response = app
            .clone()
            .oneshot(from_peer("198.51.100.7:40000", Some(&forwarded)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}

#[tokio::test]
async fn trusted_proxy_forwards_client_address() {
    let (app, _) = build(AdmissionConfig {
        rl_default_per_min: 1,
        rl_burst: 1,
        trusted_proxies: "10.1.1.1".to_string(),
        ..Default::default()
    });

    let a = app
        .clone()
        .oneshot(from_peer("10.1.1.1:443", Some("203.0.113.1")))
        .await
        .unwrap();
    let b = app
        .clone()
        .oneshot(from_peer("10.1.1.1:443", Some("203.0.113.2")))
        .await
        .unwrap();
    let a_again = app
        .oneshot(from_peer("10.1.1.1:443", Some("203.0.113.1")))
        .await
        .unwrap();

    assert_ne!(a.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_ne!(b.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
}
