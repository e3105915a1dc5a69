//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health`, `/health/ready` - 헬스 체크 (rate limit 제외)
//! - `/species`, `/feathers`, `/pictures` - 생성/조회/삭제
//! - `/auth` - 회원가입, 로그인, 이메일 인증, 비밀번호 재설정
//! - `/upload/feather` - 서명 필수 업로드

pub mod auth;
pub mod feathers;
pub mod health;
pub mod pictures;
pub mod species;
pub mod upload;

pub use auth::{auth_router, TokenResponse};
pub use feathers::feathers_router;
pub use health::{health_router, HealthResponse, ReadinessResponse};
pub use pictures::pictures_router;
pub use species::species_router;
pub use upload::{upload_router, UploadResponse};

use std::sync::Arc;

use axum::{middleware, Router};
use sqlx::PgPool;

use crate::admission::{self, AdmissionState};
use crate::error::{db_unavailable, ApiResult};
use crate::middleware::trace_id_middleware;
use crate::state::AppState;

/// DB 풀을 꺼냅니다. 설정되지 않았으면 503.
pub(crate) fn require_db(state: &AppState) -> ApiResult<&PgPool> {
    state.db_pool.as_ref().ok_or_else(db_unavailable)
}

/// 전체 API 라우터 생성.
pub fn create_api_router(admission: &AdmissionState) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/species", species_router())
        .nest("/feathers", feathers_router())
        .nest("/pictures", pictures_router())
        .nest("/auth", auth_router())
        .nest("/upload", upload_router(admission))
}

/// 요청 수용 파이프라인과 추적 ID를 적용한 애플리케이션 라우터.
///
/// 추적 ID가 가장 바깥에 있어 파이프라인의 거부 응답에도 `X-Trace-Id`가 붙습니다.
pub fn create_app(state: Arc<AppState>, admission: &AdmissionState) -> Router {
    let router = create_api_router(admission).with_state(state);

    admission::apply(router, admission).layer(middleware::from_fn(trace_id_middleware))
}
