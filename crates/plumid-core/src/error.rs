//! Plum'ID 서비스의 에러 타입.
//!
//! 설정 로딩, 저장소 연결 등 서비스 기동과 인프라 계층에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 서비스 에러.
#[derive(Debug, Error)]
pub enum PlumIdError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 공유 저장소(Redis) 에러
    #[error("캐시 에러: {0}")]
    Cache(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),
}

/// 서비스 작업을 위한 Result 타입.
pub type PlumIdResult<T> = Result<T, PlumIdError>;

impl From<config::ConfigError> for PlumIdError {
    fn from(err: config::ConfigError) -> Self {
        PlumIdError::Config(err.to_string())
    }
}

#[cfg(feature = "sqlx-support")]
impl From<sqlx::Error> for PlumIdError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => PlumIdError::NotFound("row not found".to_string()),
            other => PlumIdError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_error() {
        let err: PlumIdError = config::ConfigError::Message("missing".to_string()).into();
        assert!(matches!(err, PlumIdError::Config(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PlumIdError::Config("RL_WINDOW_SECONDS must be > 0".to_string());
        assert_eq!(err.to_string(), "설정 에러: RL_WINDOW_SECONDS must be > 0");
    }
}
