//! 요청 수용(admission) 파이프라인.
//!
//! 모든 요청은 비즈니스 핸들러에 도달하기 전에 다음 단계를 순서대로 통과합니다:
//!
//! 1. [`body_limit`]: body를 스트리밍으로 읽으며 크기 상한을 넘으면 즉시 413
//! 2. [`rate_limit`]: 클라이언트/경로별 token bucket, 초과 시 429 + `Retry-After`
//! 3. [`signature`]: 서명이 필요한 라우트에서만 HMAC 검증과 nonce 재사용 검사
//!
//! 어느 단계든 거부하면 이후 단계와 핸들러는 실행되지 않습니다.
//! 공유 저장소(Redis) 장애는 요청 허용이 아니라 503 거부로 처리됩니다.

pub mod body_limit;
pub mod bucket;
pub mod nonce;
pub mod rate_limit;
pub mod signature;

pub use body_limit::{body_limit_middleware, buffer_body, BufferedBody};
pub use bucket::{BucketDecision, LocalBucketStore, RedisBucketStore, TokenBucketBackend};
pub use nonce::{LocalNonceStore, NonceStore, RedisNonceStore};
pub use rate_limit::{
    classify_path, extract_client_ip, rate_limit_middleware, RateLimiter, RatePolicy, RouteClass,
};
pub use signature::{signed_request_middleware, AntiReplayVerifier, SignedRequest};

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use plumid_core::{AdmissionConfig, AppConfig, PlumIdError, PlumIdResult};
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ApiErrorResponse;
use crate::metrics::{record_admission_rejection, set_tracked_buckets};

/// 요청 수용 단계의 거부 사유.
///
/// 각 변형은 정확히 하나의 HTTP 상태 코드로 매핑되며, 내부 재시도는 없습니다.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdmissionError {
    #[error("요청 본문이 허용 크기({limit} bytes)를 초과했습니다")]
    RequestTooLarge { limit: usize },

    #[error("요청이 너무 많습니다. {retry_after}초 후 다시 시도하세요")]
    RateLimited { retry_after: u64 },

    #[error("서명 헤더가 없습니다")]
    MissingCredentials,

    #[error("잘못된 타임스탬프 형식")]
    MalformedTimestamp,

    #[error("타임스탬프가 허용 범위를 벗어났습니다")]
    StaleTimestamp,

    #[error("서명이 일치하지 않습니다")]
    BadSignature,

    #[error("이미 사용된 nonce입니다")]
    ReplayDetected,

    #[error("요청 본문을 읽을 수 없습니다: {0}")]
    BodyRead(String),

    #[error("요청 검증 저장소를 사용할 수 없습니다: {0}")]
    BackendUnavailable(String),
}

impl AdmissionError {
    /// HTTP 상태 코드.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingCredentials | Self::StaleTimestamp | Self::BadSignature => {
                StatusCode::UNAUTHORIZED
            }
            Self::MalformedTimestamp | Self::BodyRead(_) => StatusCode::BAD_REQUEST,
            Self::ReplayDetected => StatusCode::CONFLICT,
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// 에러 코드 (응답 본문 및 메트릭 라벨).
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestTooLarge { .. } => "REQUEST_TOO_LARGE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::MissingCredentials => "MISSING_SIGNATURE",
            Self::MalformedTimestamp => "MALFORMED_TIMESTAMP",
            Self::StaleTimestamp => "STALE_TIMESTAMP",
            Self::BadSignature => "BAD_SIGNATURE",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::BodyRead(_) => "BODY_READ_ERROR",
            Self::BackendUnavailable(_) => "ADMISSION_BACKEND_UNAVAILABLE",
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        record_admission_rejection(self.code());

        let status = self.status_code();
        let body = match &self {
            // 내부 장애 상세는 로그에만 남긴다
            Self::BackendUnavailable(_) => {
                ApiErrorResponse::simple(self.code(), "요청 검증 저장소를 사용할 수 없습니다")
            }
            Self::RateLimited { retry_after } => ApiErrorResponse {
                details: Some(serde_json::json!({ "retry_after": retry_after })),
                ..ApiErrorResponse::simple(self.code(), self.to_string())
            },
            _ => ApiErrorResponse::simple(self.code(), self.to_string()),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

/// 파이프라인 공유 상태.
///
/// 저장소 구현은 시작 시 설정에 따라 한 번 선택되며, 이후 미들웨어 코드는
/// 어떤 백엔드를 쓰는지 알지 못합니다.
#[derive(Clone)]
pub struct AdmissionState {
    pub limiter: Arc<RateLimiter>,
    pub verifier: Arc<AntiReplayVerifier>,
    pub max_body_bytes: usize,
    /// 로컬 백엔드일 때만 존재 (정리 태스크용)
    local_buckets: Option<Arc<LocalBucketStore>>,
}

impl AdmissionState {
    /// 주어진 저장소로 상태를 구성합니다.
    pub fn new(
        config: &AdmissionConfig,
        buckets: Arc<dyn TokenBucketBackend>,
        nonces: Arc<dyn NonceStore>,
    ) -> PlumIdResult<Self> {
        Ok(Self {
            limiter: Arc::new(RateLimiter::new(buckets, config)),
            verifier: Arc::new(AntiReplayVerifier::new(
                &config.app_hmac_secret,
                config.max_clock_skew_sec,
                config.anti_replay_ttl_sec,
                nonces,
            )?),
            max_body_bytes: config.max_request_body_bytes,
            local_buckets: None,
        })
    }

    /// 프로세스 내부 저장소를 사용하는 상태 (단일 인스턴스 배포용).
    pub fn local(config: &AdmissionConfig) -> PlumIdResult<Self> {
        let buckets = Arc::new(LocalBucketStore::new());
        let mut state = Self::new(config, buckets.clone(), Arc::new(LocalNonceStore::new()))?;
        state.local_buckets = Some(buckets);
        Ok(state)
    }

    /// Redis를 공유 저장소로 사용하는 상태 (다중 인스턴스 배포용).
    ///
    /// 연결에 실패하면 에러를 반환합니다. 로컬 저장소로 대체하지 않습니다.
    pub async fn connect_redis(config: &AdmissionConfig, redis_url: &str) -> PlumIdResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| PlumIdError::Cache(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| PlumIdError::Cache(e.to_string()))?;

        info!("Redis connection established for admission pipeline");

        Self::new(
            config,
            Arc::new(RedisBucketStore::new(conn.clone())),
            Arc::new(RedisNonceStore::new(conn)),
        )
    }

    /// 설정에 따라 백엔드를 선택합니다 (`REDIS_URL`이 있으면 Redis).
    pub async fn from_config(config: &AppConfig) -> PlumIdResult<Self> {
        if config.has_redis() {
            Self::connect_redis(&config.admission, &config.redis.redis_url).await
        } else {
            Self::local(&config.admission)
        }
    }

    /// 사용 중인 백엔드 이름.
    pub fn backend_name(&self) -> &'static str {
        self.limiter.backend_name()
    }

    /// 가득 찬 로컬 버킷을 주기적으로 제거하는 태스크를 시작합니다.
    ///
    /// Redis 백엔드는 키 TTL로 정리되므로 `None`을 반환합니다.
    pub fn spawn_janitor(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let buckets = self.local_buckets.clone()?;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Bucket janitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = buckets.evict_full();
                        set_tracked_buckets(buckets.len());
                        if evicted > 0 {
                            debug!(evicted, remaining = buckets.len(), "Evicted idle rate-limit buckets");
                        }
                    }
                }
            }
        }))
    }
}

/// 라우터 전체에 body 크기 제한과 rate limit을 적용합니다.
///
/// 마지막에 추가한 레이어가 가장 바깥이므로 body 제한이 먼저 실행됩니다.
pub fn apply<S>(router: Router<S>, admission: &AdmissionState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(middleware::from_fn_with_state(
            admission.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            admission.clone(),
            body_limit_middleware,
        ))
        // 추출기(Json, Bytes)의 기본 2MB 제한을 파이프라인 상한에 맞춘다
        .layer(DefaultBodyLimit::max(admission.max_body_bytes))
}

/// 라우터의 모든 라우트에 서명 검증을 요구합니다.
pub fn require_signature<S>(router: Router<S>, admission: &AdmissionState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(
        admission.clone(),
        signed_request_middleware,
    ))
}
