//! # Plum'ID Core
//!
//! Plum'ID API 서버의 공통 기반을 제공합니다:
//! - 환경 변수 기반 설정 관리
//! - 에러 타입
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;
