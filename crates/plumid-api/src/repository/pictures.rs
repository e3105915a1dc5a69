//! Pictures Repository

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use validator::Validate;

/// 사진 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PictureRecord {
    pub idpictures: i32,
    pub url: Option<String>,
    pub longitude: Option<String>,
    pub latitude: Option<String>,
    /// 채집일 (YYYY-MM-DD)
    pub date_collected: Option<NaiveDate>,
    pub feathers_idfeathers: Option<i32>,
}

/// 새 사진 입력
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewPicture {
    #[serde(default)]
    #[validate(length(max = 255))]
    pub url: Option<String>,
    #[serde(default)]
    #[validate(length(max = 45))]
    pub longitude: Option<String>,
    #[serde(default)]
    #[validate(length(max = 45))]
    pub latitude: Option<String>,
    #[serde(default)]
    pub date_collected: Option<NaiveDate>,
    #[serde(default)]
    pub feathers_idfeathers: Option<i32>,
}

pub struct PicturesRepository;

impl PicturesRepository {
    pub async fn create(pool: &PgPool, input: &NewPicture) -> Result<PictureRecord, sqlx::Error> {
        sqlx::query_as::<_, PictureRecord>(
            r#"
            INSERT INTO pictures (url, longitude, latitude, date_collected, feathers_idfeathers)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING idpictures, url, longitude, latitude, date_collected, feathers_idfeathers
            "#,
        )
        .bind(&input.url)
        .bind(&input.longitude)
        .bind(&input.latitude)
        .bind(input.date_collected)
        .bind(input.feathers_idfeathers)
        .fetch_one(pool)
        .await
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Option<PictureRecord>, sqlx::Error> {
        sqlx::query_as::<_, PictureRecord>(
            r#"
            SELECT idpictures, url, longitude, latitude, date_collected, feathers_idfeathers
            FROM pictures
            WHERE idpictures = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// 이 사진을 프로필로 쓰던 사용자는 `pictures_idpictures`가 NULL이 됩니다.
    pub async fn delete(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pictures WHERE idpictures = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
