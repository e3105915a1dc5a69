//! JWT 토큰 처리.
//!
//! Access Token과 단일 목적(scope) 토큰의 생성/검증 로직.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

/// 사용자 역할.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// DB에 저장된 역할 문자열을 해석합니다. 알 수 없는 값은 `User`.
    pub fn from_db(role: Option<&str>) -> Self {
        match role {
            Some(r) if r.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// 단일 목적 토큰의 용도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    /// 이메일 인증 링크 (24시간)
    EmailVerify,
    /// 비밀번호 재설정 링크 (60분)
    PasswordReset,
}

impl TokenScope {
    /// 기본 만료 시간 (분).
    pub fn default_expiry_minutes(&self) -> i64 {
        match self {
            TokenScope::EmailVerify => 24 * 60,
            TokenScope::PasswordReset => 60,
        }
    }
}

/// JWT 페이로드.
///
/// 로그인 토큰은 `role`을, 단일 목적 토큰은 `scope`를 가집니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - 사용자 ID
    pub sub: String,
    /// 사용자 역할 (로그인 토큰)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// 토큰 용도 (단일 목적 토큰)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<TokenScope>,
    /// Issued At - 토큰 발급 시간 (Unix timestamp)
    pub iat: i64,
    /// Expiration - 토큰 만료 시간 (Unix timestamp)
    pub exp: i64,
    /// JWT ID - 토큰 고유 식별자
    pub jti: String,
}

impl Claims {
    fn issue(user_id: i32, expires_in_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            role: None,
            scope: None,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(expires_in_minutes)).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 로그인 세션용 Claims.
    pub fn access(user_id: i32, role: Role, expires_in_minutes: i64) -> Self {
        Self {
            role: Some(role),
            ..Self::issue(user_id, expires_in_minutes)
        }
    }

    /// 단일 목적 토큰용 Claims.
    pub fn scoped(user_id: i32, scope: TokenScope, expires_in_minutes: i64) -> Self {
        Self {
            scope: Some(scope),
            ..Self::issue(user_id, expires_in_minutes)
        }
    }

    /// `sub`를 사용자 ID로 해석합니다.
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

/// JWT 토큰 에러.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("토큰 인코딩 실패: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),
    #[error("토큰 디코딩 실패")]
    DecodingError,
    #[error("토큰이 만료되었습니다")]
    TokenExpired,
    #[error("잘못된 토큰 형식")]
    InvalidToken,
    #[error("토큰 용도가 맞지 않습니다")]
    WrongScope,
}

/// 토큰 서명.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(JwtError::from)
}

/// 로그인 Access Token 생성.
pub fn create_access_token(
    user_id: i32,
    role: Role,
    secret: &str,
    expires_in_minutes: i64,
) -> Result<String, JwtError> {
    create_token(&Claims::access(user_id, role, expires_in_minutes), secret)
}

/// 단일 목적 토큰 생성 (이메일 인증, 비밀번호 재설정).
pub fn create_scoped_token(
    user_id: i32,
    scope: TokenScope,
    secret: &str,
    expires_in_minutes: i64,
) -> Result<String, JwtError> {
    create_token(&Claims::scoped(user_id, scope, expires_in_minutes), secret)
}

/// JWT 토큰 디코딩 및 검증 (HS256, 만료 검사 포함).
pub fn decode_token(token: &str, secret: &str) -> Result<TokenData<Claims>, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::InvalidToken,
        _ => JwtError::DecodingError,
    })
}

/// 단일 목적 토큰을 검증하고 사용자 ID를 반환합니다.
///
/// 용도가 다르거나 `sub`가 정수가 아니면 `WrongScope`/`InvalidToken`.
pub fn decode_scoped_token(
    token: &str,
    secret: &str,
    expected: TokenScope,
) -> Result<i32, JwtError> {
    let claims = decode_token(token, secret)?.claims;
    if claims.scope != Some(expected) {
        return Err(JwtError::WrongScope);
    }
    claims.user_id().ok_or(JwtError::InvalidToken)
}
