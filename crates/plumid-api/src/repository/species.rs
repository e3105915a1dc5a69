//! Species Repository

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use validator::Validate;

// ================================================================================================
// Types
// ================================================================================================

/// 종(species) 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SpeciesRecord {
    pub idspecies: i32,
    pub sex: Option<String>,
    pub region: Option<String>,
    pub environment: Option<String>,
    pub information: Option<String>,
    pub species_name: Option<String>,
}

/// 새 종 입력
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewSpecies {
    #[serde(default)]
    #[validate(length(max = 45))]
    pub sex: Option<String>,
    #[serde(default)]
    #[validate(length(max = 45))]
    pub region: Option<String>,
    #[serde(default)]
    #[validate(length(max = 45))]
    pub environment: Option<String>,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub information: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub species_name: Option<String>,
}

// ================================================================================================
// Repository
// ================================================================================================

pub struct SpeciesRepository;

impl SpeciesRepository {
    pub async fn create(pool: &PgPool, input: &NewSpecies) -> Result<SpeciesRecord, sqlx::Error> {
        sqlx::query_as::<_, SpeciesRecord>(
            r#"
            INSERT INTO species (sex, region, environment, information, species_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING idspecies, sex, region, environment, information, species_name
            "#,
        )
        .bind(&input.sex)
        .bind(&input.region)
        .bind(&input.environment)
        .bind(&input.information)
        .bind(&input.species_name)
        .fetch_one(pool)
        .await
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Option<SpeciesRecord>, sqlx::Error> {
        sqlx::query_as::<_, SpeciesRecord>(
            r#"
            SELECT idspecies, sex, region, environment, information, species_name
            FROM species
            WHERE idspecies = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// 삭제된 행이 있으면 true. 연결된 feathers/pictures는 FK cascade로 함께 삭제됩니다.
    pub async fn delete(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM species WHERE idspecies = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
