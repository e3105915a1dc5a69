//! Bearer 토큰 인증 추출기.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        request::Parts,
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};

use super::{decode_token, JwtError};
use crate::error::ApiErrorResponse;
use crate::repository::{UserRecord, UserRepository};
use crate::state::AppState;

/// 인증된 현재 사용자.
///
/// ```rust,ignore
/// async fn me(CurrentUser(user): CurrentUser) -> Json<UserOut> { ... }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

/// 인증 에러.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("인증 토큰이 필요합니다")]
    MissingToken,
    #[error("잘못된 Authorization 헤더 형식")]
    InvalidAuthHeader,
    #[error("토큰이 만료되었습니다")]
    TokenExpired,
    #[error("유효하지 않은 토큰")]
    InvalidToken,
    #[error("비활성화된 계정입니다")]
    InactiveAccount,
    #[error("데이터베이스가 설정되지 않았습니다")]
    DatabaseUnavailable,
    #[error("사용자 조회 실패")]
    Database(#[from] sqlx::Error),
}

impl AuthError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN"),
            AuthError::InvalidAuthHeader => (StatusCode::UNAUTHORIZED, "INVALID_AUTH_HEADER"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AuthError::InactiveAccount => (StatusCode::FORBIDDEN, "ACCOUNT_INACTIVE"),
            AuthError::DatabaseUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "DB_UNAVAILABLE"),
            AuthError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if let AuthError::Database(e) = &self {
            tracing::error!(error = %e, "User lookup failed during authentication");
        }

        let body = ApiErrorResponse::new(code, self.to_string());
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// `Authorization: Bearer <token>` 헤더에서 토큰을 꺼냅니다.
pub fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token.trim())
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let claims = decode_token(token, &state.auth.auth_secret)
            .map_err(|e| match e {
                JwtError::TokenExpired => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?
            .claims;

        // 이메일 인증/재설정 토큰은 로그인 세션으로 쓸 수 없다
        if claims.scope.is_some() {
            return Err(AuthError::InvalidToken);
        }
        let user_id = claims.user_id().ok_or(AuthError::InvalidToken)?;

        let pool = state
            .db_pool
            .as_ref()
            .ok_or(AuthError::DatabaseUnavailable)?;
        let user = UserRepository::get_by_id(pool, user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_scoped_token, TokenScope};
    use axum::http::Request;
    use plumid_core::AppConfig;

    fn parts(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/auth/me");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))).unwrap(), "abc");
        assert_eq!(bearer_token(&parts(Some("bearer abc"))).unwrap(), "abc");
        assert!(matches!(
            bearer_token(&parts(None)),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            bearer_token(&parts(Some("Basic abc"))),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token(&parts(Some("Bearer"))),
            Err(AuthError::InvalidAuthHeader)
        ));
    }

    #[test]
    fn test_unauthorized_response_has_challenge() {
        let response = AuthError::InvalidToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let response = AuthError::InactiveAccount.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[tokio::test]
    async fn test_scoped_token_rejected_as_session() {
        let state = Arc::new(AppState::new(&AppConfig::default(), None));
        let token = create_scoped_token(
            1,
            TokenScope::EmailVerify,
            &state.auth.auth_secret,
            60,
        )
        .unwrap();

        let mut parts = parts(Some(&format!("Bearer {}", token)));
        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let state = Arc::new(AppState::new(&AppConfig::default(), None));

        let mut parts = parts(None);
        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }
}
