//! Pictures API 라우트

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
use crate::repository::{NewPicture, PictureRecord, PicturesRepository};
use crate::state::AppState;

async fn create_picture(
    State(state): State<Arc<AppState>>,
    ValidatedJson(input): ValidatedJson<NewPicture>,
) -> ApiResult<(StatusCode, Json<PictureRecord>)> {
    let pool = require_db(&state)?;

    let picture = PicturesRepository::create(pool, &input)
        .await
        .map_err(db_error)?;
    info!(id = picture.idpictures, "Picture created");

    Ok((StatusCode::CREATED, Json(picture)))
}

async fn get_picture(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<PictureRecord>> {
    let pool = require_db(&state)?;

    PicturesRepository::get(pool, id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Picture not found"))
}

async fn delete_picture(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let pool = require_db(&state)?;

    if PicturesRepository::delete(pool, id).await.map_err(db_error)? {
        info!(id, "Picture deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Picture not found"))
    }
}

pub fn pictures_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_picture))
        .route("/{id}", get(get_picture).delete(delete_picture))
}
