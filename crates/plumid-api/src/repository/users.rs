//! Users Repository
//!
//! 사용자 계정 조회/생성과 인증 상태 변경을 담당합니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::auth::verify_password;

// ================================================================================================
// Types
// ================================================================================================

/// 사용자 레코드
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub idusers: i32,
    pub password_hash: String,
    pub role: Option<String>,
    pub mail: String,
    pub created_at: DateTime<Utc>,
    pub username: Option<String>,
    pub pictures_idpictures: Option<i32>,
    pub is_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// 외부에 노출되는 사용자 정보 (비밀번호 해시 제외)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserOut {
    pub idusers: i32,
    pub mail: String,
    pub username: Option<String>,
    pub role: Option<String>,
}

impl From<UserRecord> for UserOut {
    fn from(user: UserRecord) -> Self {
        Self {
            idusers: user.idusers,
            mail: user.mail,
            username: user.username,
            role: user.role,
        }
    }
}

const USER_COLUMNS: &str = "idusers, password_hash, role, mail, created_at, username, \
     pictures_idpictures, is_verified, email_verified_at, is_active";

// ================================================================================================
// Repository
// ================================================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn get_by_id(pool: &PgPool, id: i32) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE idusers = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn get_by_mail(pool: &PgPool, mail: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE mail = $1"
        ))
        .bind(mail)
        .fetch_optional(pool)
        .await
    }

    /// 미인증 상태의 사용자 생성. 역할을 지정하지 않으면 `user`.
    ///
    /// 같은 mail이 이미 있으면 유일성 위반(23505) 에러.
    pub async fn create(
        pool: &PgPool,
        mail: &str,
        username: &str,
        password_hash: &str,
        role: Option<&str>,
    ) -> Result<UserRecord, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (mail, username, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(mail)
        .bind(username)
        .bind(password_hash)
        .bind(role.unwrap_or("user"))
        .fetch_one(pool)
        .await
    }

    /// mail과 비밀번호가 맞으면 사용자를 반환합니다.
    pub async fn authenticate(
        pool: &PgPool,
        mail: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, sqlx::Error> {
        let Some(user) = Self::get_by_mail(pool, mail).await? else {
            return Ok(None);
        };

        Ok(verify_password(password, &user.password_hash)
            .is_ok()
            .then_some(user))
    }

    pub async fn update_password(
        pool: &PgPool,
        id: i32,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE idusers = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 이메일 인증 완료 처리. 이미 인증된 계정이면 false.
    pub async fn mark_verified(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE, email_verified_at = NOW()
            WHERE idusers = $1 AND is_verified = FALSE
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
