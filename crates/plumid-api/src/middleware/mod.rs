//! HTTP 미들웨어.
//!
//! - [`metrics`]: Prometheus HTTP 메트릭 수집
//! - [`trace_id`]: 요청 추적 ID와 요청 로그

pub mod metrics;
pub mod trace_id;

pub use metrics::metrics_layer;
pub use trace_id::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
