//! HTTP 요청 metrics middleware.
//!
//! `/metrics` 스크레이프 요청은 집계하지 않습니다.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

use crate::metrics::{
    normalize_path, record_http_duration, record_http_request, record_http_response,
};

const SCRAPE_PATH: &str = "/metrics";

/// 요청 수, 상태 코드별 응답 수, 처리 시간을 기록합니다.
///
/// 요청 수용 단계에서 거부된 요청(413/429/401/409)도 여기서 함께 집계됩니다.
pub async fn metrics_layer(request: Request, next: Next) -> Response {
    if request.uri().path() == SCRAPE_PATH {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    record_http_request(&method, &path);

    let response = next.run(request).await;

    record_http_response(&method, &path, response.status().as_u16());
    record_http_duration(&method, &path, start.elapsed().as_secs_f64());
    response
}
