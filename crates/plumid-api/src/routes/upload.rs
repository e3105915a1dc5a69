//! 서명 업로드 라우트.
//!
//! `POST /upload/feather`는 서명 검증(HMAC + nonce)을 통과한 요청만 받습니다.
//! body는 그대로 받아 크기와 SHA-256 다이제스트를 돌려줍니다.

use std::sync::Arc;

use axum::{body::Bytes, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::admission::{self, AdmissionState};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub size: usize,
    pub sha256: String,
}

/// POST /upload/feather
async fn upload_feather(body: Bytes) -> Json<UploadResponse> {
    let sha256 = hex::encode(Sha256::digest(&body));
    info!(size = body.len(), sha256 = %sha256, "Feather upload accepted");

    Json(UploadResponse {
        status: "ok".to_string(),
        size: body.len(),
        sha256,
    })
}

pub fn upload_router(admission: &AdmissionState) -> Router<Arc<AppState>> {
    admission::require_signature(
        Router::new().route("/feather", post(upload_feather)),
        admission,
    )
}
