//! Feathers API 라우트

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
use crate::repository::{FeatherRecord, FeathersRepository, NewFeather};
use crate::state::AppState;

/// POST /feathers - 존재하지 않는 species 참조는 400 INVALID_REFERENCE
async fn create_feather(
    State(state): State<Arc<AppState>>,
    ValidatedJson(input): ValidatedJson<NewFeather>,
) -> ApiResult<(StatusCode, Json<FeatherRecord>)> {
    let pool = require_db(&state)?;

    let feather = FeathersRepository::create(pool, &input)
        .await
        .map_err(db_error)?;
    info!(id = feather.idfeathers, species = ?feather.species_idspecies, "Feather created");

    Ok((StatusCode::CREATED, Json(feather)))
}

async fn get_feather(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<FeatherRecord>> {
    let pool = require_db(&state)?;

    FeathersRepository::get(pool, id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Feather not found"))
}

async fn delete_feather(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let pool = require_db(&state)?;

    if FeathersRepository::delete(pool, id).await.map_err(db_error)? {
        info!(id, "Feather deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Feather not found"))
    }
}

pub fn feathers_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_feather))
        .route("/{id}", get(get_feather).delete(delete_feather))
}
