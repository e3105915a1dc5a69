//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! `Arc<AppState>`로 래핑되어 axum의 State extractor를 통해 주입됩니다.

use std::sync::Arc;

use plumid_core::{AppConfig, AuthConfig, EmailConfig};
use sqlx::PgPool;

use crate::services::{EmailSender, LogEmailSender};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 데이터베이스 연결 풀. `DATABASE_URL`이 비어 있으면 `None`
    pub db_pool: Option<PgPool>,

    /// JWT 서명 설정
    pub auth: AuthConfig,

    /// 인증/재설정 링크 생성용 설정
    pub email: EmailConfig,

    /// 이메일 발송기
    pub email_sender: Arc<dyn EmailSender>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새로운 AppState 생성.
    pub fn new(config: &AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            db_pool,
            auth: config.auth.clone(),
            email: config.email.clone(),
            email_sender: Arc::new(LogEmailSender::new(&config.email)),
            started_at: chrono::Utc::now(),
            version: config.server.api_version.clone(),
        }
    }

    /// 이메일 발송기 교체.
    pub fn with_email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email_sender = sender;
        self
    }

    /// 데이터베이스 연결 상태 확인.
    pub async fn is_db_healthy(&self) -> bool {
        if let Some(pool) = &self.db_pool {
            sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
        } else {
            false
        }
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }
}
