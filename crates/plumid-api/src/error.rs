//! 통합 API 에러 응답 타입.
//!
//! 모든 핸들러가 같은 JSON 형식으로 에러를 반환합니다.
//!
//! ```json
//! {
//!   "code": "NOT_FOUND",
//!   "message": "Species 42 not found",
//!   "timestamp": 1738300800
//! }
//! ```

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 통합 API 에러 응답.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "DB_ERROR", "VALIDATION_ERROR", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 시각 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    /// 타임스탬프 없는 간단한 에러.
    ///
    /// 요청 수용 단계의 거부 응답처럼 본문이 매번 같아야 하는 경우에 사용합니다.
    pub fn simple(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: None,
        }
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 상태 코드와 에러 본문 쌍 생성.
pub fn api_error(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiErrorResponse>) {
    (status, Json(ApiErrorResponse::new(code, message)))
}

/// 404 NOT_FOUND.
pub fn not_found(message: impl Into<String>) -> (StatusCode, Json<ApiErrorResponse>) {
    api_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// DB가 설정되지 않았을 때의 503 응답.
pub fn db_unavailable() -> (StatusCode, Json<ApiErrorResponse>) {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "DB_UNAVAILABLE",
        "Database not configured",
    )
}

/// sqlx 에러를 API 에러로 변환.
///
/// 외래 키 위반(23503)은 400, 유일성 위반(23505)은 409, 나머지는 500으로 매핑됩니다.
pub fn db_error(err: sqlx::Error) -> (StatusCode, Json<ApiErrorResponse>) {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23503") => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    "INVALID_REFERENCE",
                    "Referenced resource does not exist",
                );
            }
            Some("23505") => {
                return api_error(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
            }
            _ => {}
        }
    }

    tracing::error!(error = %err, "Database query failed");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "DB_ERROR",
        "Unexpected database error",
    )
}
