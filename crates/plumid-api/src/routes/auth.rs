//! 인증 API 라우트
//!
//! - `POST /auth/register` - 회원가입 (인증 메일 발송)
//! - `POST /auth/login` - 로그인 (Bearer 토큰 발급)
//! - `GET /auth/me` - 현재 사용자
//! - `GET /auth/verify-email?token=` - 이메일 인증
//! - `POST /auth/request-password-reset` - 재설정 메일 요청
//! - `POST /auth/reset-password` - 비밀번호 재설정

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use super::require_db;
use crate::auth::{
    create_access_token, create_scoped_token, decode_scoped_token, hash_password, CurrentUser,
    JwtError, Role, TokenScope,
};
use crate::error::{api_error, db_error, ApiErrorResponse, ApiResult};
use crate::extract::ValidatedJson;
use crate::repository::{UserOut, UserRepository};
use crate::services::{password_reset_email, verification_email};
use crate::state::AppState;

// ================================================================================================
// Request/Response Types
// ================================================================================================

/// 회원가입 요청
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub mail: String,
    #[validate(length(min = 3, max = 100))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// 로그인 요청
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub mail: String,
    pub password: String,
}

/// 로그인 응답
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

/// 재설정 메일 요청
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub mail: String,
}

/// 비밀번호 재설정 요청
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirm {
    pub token: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// 메시지 응답
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for this email, a password reset link has been sent.";

// ================================================================================================
// Helpers
// ================================================================================================

fn internal_error(
    context: &str,
    err: impl std::fmt::Display,
) -> (StatusCode, Json<ApiErrorResponse>) {
    error!(error = %err, "{}", context);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Unexpected server error",
    )
}

fn invalid_token(err: JwtError) -> (StatusCode, Json<ApiErrorResponse>) {
    let message = match err {
        JwtError::TokenExpired => "Token expired",
        _ => "Invalid token",
    };
    api_error(StatusCode::BAD_REQUEST, "INVALID_TOKEN", message)
}

fn user_not_found() -> (StatusCode, Json<ApiErrorResponse>) {
    api_error(StatusCode::NOT_FOUND, "NOT_FOUND", "User not found")
}

// ================================================================================================
// Handlers
// ================================================================================================

/// POST /auth/register
///
/// 미인증 계정을 만들고 24시간 유효한 인증 링크를 메일로 보냅니다.
/// 메일 발송 실패는 가입을 막지 않습니다.
async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserOut>)> {
    let pool = require_db(&state)?;

    if UserRepository::get_by_mail(pool, &payload.mail)
        .await
        .map_err(db_error)?
        .is_some()
    {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "MAIL_ALREADY_REGISTERED",
            "A user with this email already exists",
        ));
    }

    let password_hash = hash_password(&payload.password)
        .map_err(|e| internal_error("Password hashing failed", e))?;
    let user = UserRepository::create(
        pool,
        &payload.mail,
        &payload.username,
        &password_hash,
        None,
    )
    .await
    .map_err(db_error)?;
    info!(user_id = user.idusers, "User registered");

    let scope = TokenScope::EmailVerify;
    match create_scoped_token(
        user.idusers,
        scope,
        &state.auth.auth_secret,
        scope.default_expiry_minutes(),
    ) {
        Ok(token) => {
            let link = format!(
                "{}/verify-email?token={}",
                state.email.frontend_base(),
                token
            );
            if let Err(e) = state
                .email_sender
                .send(&verification_email(&user.mail, &link))
                .await
            {
                warn!(user_id = user.idusers, error = %e, "Failed to send verification email");
            }
        }
        Err(e) => warn!(
            user_id = user.idusers,
            error = %e,
            "Failed to issue verification token"
        ),
    }

    Ok((StatusCode::CREATED, Json(UserOut::from(user))))
}

/// POST /auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let pool = require_db(&state)?;

    let user = UserRepository::authenticate(pool, &payload.mail, &payload.password)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password",
            )
        })?;

    if !user.is_verified {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "EMAIL_NOT_VERIFIED",
            "Email address not verified",
        ));
    }
    if !user.is_active {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "ACCOUNT_INACTIVE",
            "Account is disabled",
        ));
    }

    let role = Role::from_db(user.role.as_deref());
    let access_token = create_access_token(
        user.idusers,
        role,
        &state.auth.auth_secret,
        state.auth.access_token_expire_minutes,
    )
    .map_err(|e| internal_error("Access token creation failed", e))?;

    info!(user_id = user.idusers, role = role.as_str(), "User logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// GET /auth/me
async fn me(CurrentUser(user): CurrentUser) -> Json<UserOut> {
    Json(UserOut::from(user))
}

/// GET /auth/verify-email?token=
async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = decode_scoped_token(
        &query.token,
        &state.auth.auth_secret,
        TokenScope::EmailVerify,
    )
    .map_err(invalid_token)?;
    let pool = require_db(&state)?;

    let user = UserRepository::get_by_id(pool, user_id)
        .await
        .map_err(db_error)?
        .ok_or_else(user_not_found)?;

    if user.is_verified {
        return Ok(MessageResponse::new("Email address already verified."));
    }
    // 동시 요청이 먼저 처리했을 수 있다
    if !UserRepository::mark_verified(pool, user_id)
        .await
        .map_err(db_error)?
    {
        return Ok(MessageResponse::new("Email address already verified."));
    }

    info!(user_id, "Email address verified");
    Ok(MessageResponse::new("Email address verified."))
}

/// POST /auth/request-password-reset
///
/// 계정 존재 여부와 관계없이 같은 응답을 반환합니다.
async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    ValidatedJson(payload): ValidatedJson<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = require_db(&state)?;

    let user = match UserRepository::get_by_mail(pool, &payload.mail).await {
        Ok(user) => user,
        Err(e) => {
            error!(error = %e, "User lookup failed during password reset request");
            None
        }
    };

    if let Some(user) = user {
        let scope = TokenScope::PasswordReset;
        match create_scoped_token(
            user.idusers,
            scope,
            &state.auth.auth_secret,
            scope.default_expiry_minutes(),
        ) {
            Ok(token) => {
                let link = format!(
                    "{}/reset-password?token={}",
                    state.email.frontend_base(),
                    token
                );
                match state
                    .email_sender
                    .send(&password_reset_email(&user.mail, &link))
                    .await
                {
                    Ok(()) => info!(user_id = user.idusers, "Password reset email sent"),
                    Err(e) => warn!(
                        user_id = user.idusers,
                        error = %e,
                        "Failed to send password reset email"
                    ),
                }
            }
            Err(e) => warn!(user_id = user.idusers, error = %e, "Failed to issue reset token"),
        }
    }

    Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE))
}

/// POST /auth/reset-password
async fn reset_password(
    State(state): State<Arc<AppState>>,
    ValidatedJson(payload): ValidatedJson<PasswordResetConfirm>,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = decode_scoped_token(
        &payload.token,
        &state.auth.auth_secret,
        TokenScope::PasswordReset,
    )
    .map_err(invalid_token)?;
    let pool = require_db(&state)?;

    let password_hash = hash_password(&payload.new_password)
        .map_err(|e| internal_error("Password hashing failed", e))?;
    if !UserRepository::update_password(pool, user_id, &password_hash)
        .await
        .map_err(db_error)?
    {
        return Err(user_not_found());
    }

    info!(user_id, "Password reset");
    Ok(MessageResponse::new("Password updated."))
}

pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/verify-email", get(verify_email))
        .route("/request-password-reset", post(request_password_reset))
        .route("/reset-password", post(reset_password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use plumid_core::AppConfig;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(&AppConfig::default(), None))
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new().nest("/auth", auth_router()).with_state(state)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 8192).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_validation() {
        let response = app(state())
            .oneshot(json_post(
                "/auth/register",
                serde_json::json!({"mail": "not-an-email", "username": "ab", "password": "short"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["code"], "VALIDATION_ERROR");
        let errors = &json["details"]["errors"];
        assert!(errors["mail"].is_array());
        assert!(errors["username"].is_array());
        assert!(errors["password"].is_array());
    }

    #[tokio::test]
    async fn test_register_without_database() {
        let response = app(state())
            .oneshot(json_post(
                "/auth/register",
                serde_json::json!({"mail": "jay@plumid.fr", "username": "jay", "password": "long-enough"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["code"], "DB_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_verify_email_rejects_invalid_token() {
        let response = app(state())
            .oneshot(
                Request::builder()
                    .uri("/auth/verify-email?token=garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_verify_email_rejects_access_token() {
        let state = state();
        let token = create_access_token(1, Role::User, &state.auth.auth_secret, 60).unwrap();

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/verify-email?token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_password_rejects_verification_token() {
        let state = state();
        let token = create_scoped_token(1, TokenScope::EmailVerify, &state.auth.auth_secret, 60)
            .unwrap();

        let response = app(state)
            .oneshot(json_post(
                "/auth/reset-password",
                serde_json::json!({"token": token, "new_password": "brand-new-pass"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let response = app(state())
            .oneshot(Request::builder().uri("/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
