//! 요청 body 크기 제한.
//!
//! body를 청크 단위로 읽으며 누적 크기가 상한을 넘는 순간 읽기를 멈추고 413을
//! 반환합니다. 상한 이내면 전체 body를 [`BufferedBody`]로 extensions에 남기고
//! 같은 바이트로 body를 다시 만들어 다음 단계에 넘깁니다.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::StreamExt;

use super::{AdmissionError, AdmissionState};

/// 버퍼링된 요청 body. 서명 검증처럼 body를 다시 읽어야 하는 단계가 사용합니다.
#[derive(Debug, Clone)]
pub struct BufferedBody(pub Bytes);

/// body를 상한까지 버퍼링합니다.
pub async fn buffer_body(request: Request, limit: usize) -> Result<Request, AdmissionError> {
    // 선언된 길이가 이미 상한을 넘으면 읽지 않는다
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(AdmissionError::RequestTooLarge { limit });
    }

    let (mut parts, body) = request.into_parts();
    let mut stream = body.into_data_stream();
    let mut buffer: Vec<u8> = Vec::with_capacity(declared.unwrap_or(0).min(limit as u64) as usize);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AdmissionError::BodyRead(e.to_string()))?;
        if buffer.len() + chunk.len() > limit {
            return Err(AdmissionError::RequestTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }

    let bytes = Bytes::from(buffer);
    parts.extensions.insert(BufferedBody(bytes.clone()));
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Body 크기 제한 미들웨어 함수.
pub async fn body_limit_middleware(
    State(admission): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match buffer_body(request, admission.max_body_bytes).await {
        Ok(request) => next.run(request).await,
        Err(e) => {
            tracing::warn!(
                method = %method,
                path = %path,
                limit = admission.max_body_bytes,
                error = %e,
                "Request body rejected"
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::post, Extension, Router};
    use futures::stream;
    use plumid_core::AdmissionConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(limit: usize, reached: Arc<AtomicBool>) -> Router {
        let config = AdmissionConfig {
            max_request_body_bytes: limit,
            ..Default::default()
        };
        let admission = AdmissionState::local(&config).unwrap();

        Router::new()
            .route(
                "/echo",
                post(
                    |Extension(flag): Extension<Arc<AtomicBool>>,
                     Extension(BufferedBody(buffered)): Extension<BufferedBody>,
                     body: Bytes| async move {
                        flag.store(true, Ordering::SeqCst);
                        assert_eq!(buffered, body);
                        body
                    },
                ),
            )
            .layer(middleware::from_fn_with_state(admission, body_limit_middleware))
            .layer(Extension(reached))
    }

    /// Content-Length 없이 청크로 흘려보내는 body.
    fn chunked(chunks: Vec<&'static [u8]>) -> Body {
        Body::from_stream(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c))),
        ))
    }

    fn post_request(body: Body) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/echo")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_oversize_streamed_body_rejected_before_handler() {
        let reached = Arc::new(AtomicBool::new(false));
        let app = app(10, reached.clone());

        let response = app
            .oneshot(post_request(chunked(vec![b"hello", b" world"])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_declared_length_rejected_early() {
        let reached = Arc::new(AtomicBool::new(false));
        let app = app(10, reached.clone());

        let mut request = post_request(Body::from("hello world"));
        request
            .headers_mut()
            .insert(CONTENT_LENGTH, "11".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_body_at_limit_is_replayed() {
        let reached = Arc::new(AtomicBool::new(false));
        let app = app(10, reached.clone());

        let response = app
            .oneshot(post_request(chunked(vec![b"hello", b"world"])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"helloworld");
    }

    #[tokio::test]
    async fn test_buffer_body_sets_extension() {
        let request = post_request(Body::from("abc"));
        let request = buffer_body(request, 10).await.unwrap();

        let buffered = request.extensions().get::<BufferedBody>().unwrap();
        assert_eq!(&buffered.0[..], b"abc");
    }
}
