//! 검증 JSON 추출기.

use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiErrorResponse;

/// JSON body를 역직렬화한 뒤 `validator` 규칙으로 검증합니다.
///
/// 역직렬화 실패와 규칙 위반 모두 422 `VALIDATION_ERROR`를 반환합니다.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiErrorResponse>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                validation_error(serde_json::json!({ "errors": rejection.body_text() }))
            })?;

        value.validate().map_err(|errors| {
            validation_error(serde_json::json!({ "errors": errors }))
        })?;

        Ok(Self(value))
    }
}

fn validation_error(details: serde_json::Value) -> (StatusCode, Json<ApiErrorResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiErrorResponse::with_details(
            "VALIDATION_ERROR",
            "Invalid request payload",
            details,
        )),
    )
}
