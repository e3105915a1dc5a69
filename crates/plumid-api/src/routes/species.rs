//! Species API 라우트
//!
//! - `POST /species` - 종 생성
//! - `GET /species/{id}` - 종 조회
//! - `DELETE /species/{id}` - 종 삭제 (연결된 깃털/사진 포함)

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::require_db;
use crate::error::{db_error, not_found, ApiResult};
use crate::extract::ValidatedJson;
use crate::repository::{NewSpecies, SpeciesRecord, SpeciesRepository};
use crate::state::AppState;

async fn create_species(
    State(state): State<Arc<AppState>>,
    ValidatedJson(input): ValidatedJson<NewSpecies>,
) -> ApiResult<(StatusCode, Json<SpeciesRecord>)> {
    let pool = require_db(&state)?;

    let species = SpeciesRepository::create(pool, &input)
        .await
        .map_err(db_error)?;
    info!(id = species.idspecies, "Species created");

    Ok((StatusCode::CREATED, Json(species)))
}

async fn get_species(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<SpeciesRecord>> {
    let pool = require_db(&state)?;

    SpeciesRepository::get(pool, id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Species not found"))
}

async fn delete_species(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let pool = require_db(&state)?;

    if SpeciesRepository::delete(pool, id).await.map_err(db_error)? {
        info!(id, "Species deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Species not found"))
    }
}

pub fn species_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_species))
        .route("/{id}", get(get_species).delete(delete_species))
}
