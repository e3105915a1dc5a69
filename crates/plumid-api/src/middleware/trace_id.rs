//! 요청 추적 ID middleware.
//!
//! 요청마다 16자리 hex 추적 ID를 만들어 extensions와 `X-Trace-Id` 응답 헤더에 넣고,
//! 메서드/경로/상태/지연 시간을 함께 로그로 남깁니다.

use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use rand::Rng;
use tracing::{info_span, Instrument};

pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// 요청 추적 ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn generate() -> Self {
        Self(format!("{:016x}", rand::thread_rng().gen::<u64>()))
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub async fn trace_id_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = TraceId::generate();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    request.extensions_mut().insert(trace_id.clone());

    let span = info_span!("request", trace_id = %trace_id);
    let mut response = next.run(request).instrument(span.clone()).await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    span.in_scope(|| {
        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            latency_ms = format!("{:.1}", latency_ms),
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&trace_id.0) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}
