//! Repository 계층.
//!
//! 테이블별 데이터베이스 연산을 담당합니다. 모든 메서드는 `&PgPool`을 받는
//! 정적 메서드이며 `sqlx::Error`를 그대로 반환합니다.

pub mod feathers;
pub mod pictures;
pub mod schema;
pub mod species;
pub mod users;

pub use feathers::{FeatherRecord, FeathersRepository, NewFeather};
pub use pictures::{NewPicture, PictureRecord, PicturesRepository};
pub use schema::ensure_schema;
pub use species::{NewSpecies, SpeciesRecord, SpeciesRepository};
pub use users::{UserOut, UserRecord, UserRepository};
