//! 인증.
//!
//! JWT 기반 로그인 세션과 이메일 인증/비밀번호 재설정용 단일 목적 토큰을 제공합니다.
//!
//! # 구성 요소
//!
//! - [`Claims`]: JWT 페이로드 구조체
//! - [`Role`]: 사용자 역할 (User, Admin)
//! - [`TokenScope`]: 단일 목적 토큰의 용도
//! - [`CurrentUser`]: Bearer 토큰으로 현재 사용자를 읽는 추출기
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! async fn me(CurrentUser(user): CurrentUser) -> Json<UserOut> {
//!     Json(UserOut::from(user))
//! }
//! ```

mod jwt;
mod middleware;
mod password;

pub use jwt::{
    create_access_token, create_scoped_token, create_token, decode_scoped_token, decode_token,
    Claims, JwtError, Role, TokenScope,
};
pub use middleware::{bearer_token, AuthError, CurrentUser};
pub use password::{hash_password, verify_password, PasswordError};
