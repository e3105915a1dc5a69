//! 헬스 체크 endpoint.
//!
//! `/health`는 rate limit 대상에서 제외됩니다.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// 간단한 헬스 체크 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub latency_ms: f64,
}

/// 상세 헬스 체크 응답 (readiness probe용).
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// "healthy" | "degraded"
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    /// "up" | "down" | "not_configured"
    pub database: String,
    /// DB 핑 소요 시간
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_latency_ms: Option<f64>,
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 10_000.0).round() / 10.0
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    let start = Instant::now();

    Json(HealthResponse {
        status: "ok".to_string(),
        latency_ms: elapsed_ms(start),
    })
}

/// GET /health/ready
///
/// DB가 설정되어 있는데 응답하지 않으면 503.
pub async fn health_ready(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let (database, database_latency_ms, status_code) = if state.db_pool.is_some() {
        let start = Instant::now();
        if state.is_db_healthy().await {
            ("up", Some(elapsed_ms(start)), StatusCode::OK)
        } else {
            ("down", None, StatusCode::SERVICE_UNAVAILABLE)
        }
    } else {
        ("not_configured", None, StatusCode::OK)
    };

    let status = if status_code == StatusCode::OK {
        "healthy"
    } else {
        "degraded"
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: status.to_string(),
            version: state.version.clone(),
            uptime_secs: state.uptime_secs(),
            database: database.to_string(),
            database_latency_ms,
        }),
    )
}

pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use plumid_core::AppConfig;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .nest("/health", health_router())
            .with_state(Arc::new(AppState::new(&AppConfig::default(), None)))
    }

    #[tokio::test]
    async fn test_health_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_ready_without_database() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let ready: ReadinessResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(ready.status, "healthy");
        assert_eq!(ready.database, "not_configured");
    }
}
