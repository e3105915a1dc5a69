//! 스키마 부트스트랩.
//!
//! 시작 시 테이블이 없으면 생성합니다. 기존 테이블은 변경하지 않습니다.

use sqlx::PgPool;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS species (
        idspecies     SERIAL PRIMARY KEY,
        sex           VARCHAR(45),
        region        VARCHAR(45),
        environment   VARCHAR(45),
        information   VARCHAR(255),
        species_name  VARCHAR(100)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feathers (
        idfeathers         SERIAL PRIMARY KEY,
        side               VARCHAR(45),
        "type"             VARCHAR(45),
        body_zone          VARCHAR(45),
        species_idspecies  INTEGER REFERENCES species (idspecies)
                               ON DELETE CASCADE ON UPDATE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_feathers_species ON feathers (species_idspecies)",
    r#"
    CREATE TABLE IF NOT EXISTS pictures (
        idpictures           SERIAL PRIMARY KEY,
        url                  VARCHAR(255),
        longitude            VARCHAR(45),
        latitude             VARCHAR(45),
        date_collected       DATE,
        feathers_idfeathers  INTEGER REFERENCES feathers (idfeathers)
                                 ON DELETE CASCADE ON UPDATE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pictures_feathers ON pictures (feathers_idfeathers)",
    r#"
    CREATE TABLE IF NOT EXISTS users (
        idusers              SERIAL PRIMARY KEY,
        password_hash        VARCHAR(255) NOT NULL,
        role                 VARCHAR(45),
        mail                 VARCHAR(255) NOT NULL,
        created_at           TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        username             VARCHAR(100),
        pictures_idpictures  INTEGER REFERENCES pictures (idpictures)
                                 ON DELETE SET NULL ON UPDATE CASCADE,
        is_verified          BOOLEAN NOT NULL DEFAULT FALSE,
        email_verified_at    TIMESTAMPTZ,
        is_active            BOOLEAN NOT NULL DEFAULT TRUE,
        CONSTRAINT uniq_users_mail UNIQUE (mail)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_users_pictures ON users (pictures_idpictures)",
];

/// 테이블과 인덱스를 생성합니다 (이미 있으면 건너뜀).
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = SCHEMA.len(), "Database schema ensured");
    Ok(())
}
