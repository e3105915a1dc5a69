//! # Plum'ID API
//!
//! 깃털 식별 데이터(종, 깃털, 사진, 사용자)를 다루는 REST API 서버.
//!
//! 모든 요청은 핸들러에 닿기 전에 요청 수용 파이프라인([`admission`])을 통과합니다:
//! body 크기 제한 → rate limit → (서명 라우트에 한해) HMAC 서명과 nonce 검증.
//!
//! # 모듈 구조
//!
//! - [`admission`]: body 제한, token bucket rate limit, 서명/재전송 검증
//! - [`auth`]: JWT, 비밀번호 해싱, 현재 사용자 추출기
//! - [`repository`]: PostgreSQL 저장소
//! - [`routes`]: REST 엔드포인트
//! - [`services`]: 이메일 발송 포트
//! - [`metrics`], [`middleware`]: Prometheus 메트릭, 추적 ID

pub mod admission;
pub mod auth;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;

pub use admission::{AdmissionError, AdmissionState};
pub use error::{ApiErrorResponse, ApiResult};
pub use routes::{create_api_router, create_app};
pub use state::AppState;
