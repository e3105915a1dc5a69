//! Feathers Repository

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use validator::Validate;

/// 깃털 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FeatherRecord {
    pub idfeathers: i32,
    pub side: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub feather_type: Option<String>,
    pub body_zone: Option<String>,
    pub species_idspecies: Option<i32>,
}

/// 새 깃털 입력
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewFeather {
    #[serde(default)]
    #[validate(length(max = 45))]
    pub side: Option<String>,
    #[serde(default, rename = "type")]
    #[validate(length(max = 45))]
    pub feather_type: Option<String>,
    #[serde(default)]
    #[validate(length(max = 45))]
    pub body_zone: Option<String>,
    #[serde(default)]
    pub species_idspecies: Option<i32>,
}

pub struct FeathersRepository;

impl FeathersRepository {
    /// 존재하지 않는 species를 참조하면 FK 위반(23503) 에러.
    pub async fn create(pool: &PgPool, input: &NewFeather) -> Result<FeatherRecord, sqlx::Error> {
        sqlx::query_as::<_, FeatherRecord>(
            r#"
            INSERT INTO feathers (side, "type", body_zone, species_idspecies)
            VALUES ($1, $2, $3, $4)
            RETURNING idfeathers, side, "type", body_zone, species_idspecies
            "#,
        )
        .bind(&input.side)
        .bind(&input.feather_type)
        .bind(&input.body_zone)
        .bind(input.species_idspecies)
        .fetch_one(pool)
        .await
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Option<FeatherRecord>, sqlx::Error> {
        sqlx::query_as::<_, FeatherRecord>(
            r#"
            SELECT idfeathers, side, "type", body_zone, species_idspecies
            FROM feathers
            WHERE idfeathers = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM feathers WHERE idfeathers = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
