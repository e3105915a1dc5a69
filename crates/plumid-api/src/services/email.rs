//! 이메일 발송 포트.
//!
//! 실제 SMTP 전송은 이 서비스의 범위 밖입니다. 기본 구현인 [`LogEmailSender`]는
//! 메시지를 로그로만 남깁니다.

use async_trait::async_trait;
use plumid_core::EmailConfig;
use thiserror::Error;
use tracing::info;

/// 발송할 이메일.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("이메일 발송 실패: {0}")]
    SendFailed(String),
}

/// 이메일 발송기.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// 메시지를 tracing 로그로 기록하는 발송기.
#[derive(Debug, Clone)]
pub struct LogEmailSender {
    from: String,
    smtp_host: String,
    smtp_port: u16,
}

impl LogEmailSender {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            from: config.smtp_from.clone(),
            smtp_host: config.smtp_host.clone(),
            smtp_port: config.smtp_port,
        }
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            smtp = %format!("{}:{}", self.smtp_host, self.smtp_port),
            "Email queued (log sender)"
        );
        Ok(())
    }
}

/// 이메일 인증 메일.
pub fn verification_email(to: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your Plum'ID account".to_string(),
        body: format!(
            "Welcome to Plum'ID!\n\n\
             Please confirm your email address by opening the link below:\n{link}\n\n\
             This link expires in 24 hours."
        ),
    }
}

/// 비밀번호 재설정 메일.
pub fn password_reset_email(to: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your Plum'ID password".to_string(),
        body: format!(
            "A password reset was requested for your Plum'ID account.\n\n\
             Open the link below to choose a new password:\n{link}\n\n\
             This link expires in 60 minutes. If you did not request it, ignore this email."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_email_contains_link() {
        let msg = verification_email("a@b.c", "http://front/verify-email?token=xyz");
        assert_eq!(msg.to, "a@b.c");
        assert!(msg.body.contains("http://front/verify-email?token=xyz"));
    }

    #[test]
    fn test_password_reset_email_contains_link() {
        let msg = password_reset_email("a@b.c", "http://front/reset-password?token=xyz");
        assert!(msg.subject.contains("Reset"));
        assert!(msg.body.contains("reset-password?token=xyz"));
    }

    #[tokio::test]
    async fn test_log_sender_succeeds() {
        let sender = LogEmailSender::new(&EmailConfig::default());
        let msg = verification_email("a@b.c", "link");
        assert!(sender.send(&msg).await.is_ok());
    }
}
