//! Plum'ID API 서버.
//!
//! 설정 로드 → 로깅/메트릭 초기화 → DB 연결 및 스키마 확인 → 요청 수용 파이프라인 구성
//! → 서버 시작 순서로 진행합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use plumid_core::{init_logging, AppConfig, LogConfig, PlumIdResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use plumid_api::admission::AdmissionState;
use plumid_api::metrics::setup_metrics_recorder;
use plumid_api::middleware::metrics_layer;
use plumid_api::repository::ensure_schema;
use plumid_api::routes::create_app;
use plumid_api::state::AppState;

/// CORS 레이어.
///
/// `CORS_ALLOW_ORIGINS`가 `*`이거나 비어 있으면 모든 origin을 허용합니다.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let (allow_origin, allow_credentials) = match config.cors_origins() {
        Some(origins) => {
            let origins: Vec<_> = origins.iter().filter_map(|s| s.parse().ok()).collect();
            if origins.is_empty() {
                warn!("CORS_ALLOW_ORIGINS contains no valid origins, allowing any");
                (AllowOrigin::any(), false)
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                (AllowOrigin::list(origins), true)
            }
        }
        None => {
            warn!("CORS_ALLOW_ORIGINS is '*', allowing any origin");
            (AllowOrigin::any(), false)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-timestamp"),
            axum::http::HeaderName::from_static("x-nonce"),
            axum::http::HeaderName::from_static("x-signature"),
        ])
        .expose_headers([axum::http::HeaderName::from_static("x-trace-id")])
        // 와일드카드 origin과 자격 증명은 함께 쓸 수 없다
        .allow_credentials(allow_credentials)
        .max_age(Duration::from_secs(3600))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(
    config: &AppConfig,
    state: Arc<AppState>,
    admission: &AdmissionState,
    metrics_handle: PrometheusHandle,
) -> Router {
    // 메트릭 라우터 (별도 상태, 요청 수용 파이프라인 제외)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(metrics_router)
        .merge(create_app(state, admission))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        // 느린 body 전송도 이 시간 안에 끝나야 한다
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        .layer(cors_layer(config))
}

/// DB 연결 풀 생성 및 스키마 확인.
async fn connect_database(config: &AppConfig) -> PlumIdResult<Option<PgPool>> {
    if !config.has_database() {
        warn!("DATABASE_URL not set, CRUD and auth routes will answer 503");
        return Ok(None);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database.database_url)
        .await?;
    info!("Connected to PostgreSQL successfully");

    ensure_schema(&pool).await?;

    Ok(Some(pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("invalid configuration")?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!(version = %config.server.api_version, "Starting Plum'ID API server...");

    let metrics_handle = setup_metrics_recorder().context("failed to install metrics recorder")?;
    info!("Prometheus metrics recorder initialized");

    let addr = config.socket_addr().map_err(|e| {
        error!(
            host = %config.server.api_host,
            port = config.server.api_port,
            error = %e,
            "Invalid socket address, check API_HOST and API_PORT"
        );
        e
    })?;

    let db_pool = connect_database(&config)
        .await
        .context("failed to initialize database")?;

    // Redis가 설정되어 있는데 연결할 수 없으면 시작하지 않는다
    let admission = AdmissionState::from_config(&config)
        .await
        .context("failed to initialize request admission backends")?;
    info!(
        backend = admission.backend_name(),
        default_per_min = config.admission.rl_default_per_min,
        login_per_min = config.admission.rl_login_per_min,
        burst = config.admission.rl_burst,
        max_body_bytes = config.admission.max_request_body_bytes,
        "Request admission pipeline configured"
    );

    let state = Arc::new(AppState::new(&config, db_pool));
    info!(
        version = %state.version,
        has_db = state.db_pool.is_some(),
        "Application state initialized"
    );

    // 전역 종료 토큰 (graceful shutdown용, 백그라운드 태스크에서 사용)
    let shutdown_token = CancellationToken::new();

    let janitor = admission.spawn_janitor(
        Duration::from_secs(u64::from(config.admission.rl_window_seconds)),
        shutdown_token.clone(),
    );

    let app = create_router(&config, state, &admission, metrics_handle);

    info!(%addr, "API server listening");
    info!("Metrics available at http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
    .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    if let Some(handle) = janitor {
        if tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .is_err()
        {
            warn!("Cleanup timeout, forcing shutdown");
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM을 받으면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
