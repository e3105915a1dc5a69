//! 서명 요청 검증 (HMAC-SHA256 + nonce 재사용 방지).
//!
//! 클라이언트는 다음 헤더를 보냅니다:
//! - `X-Timestamp`: Unix 초 (10진수)
//! - `X-Nonce`: 요청마다 고유한 임의 문자열
//! - `X-Signature`: `base64(HMAC-SHA256(secret, signing_string))`
//!
//! 서명 대상 문자열은 `METHOD|PATH|TIMESTAMP|NONCE|hex(sha256(body))` 입니다.
//! 메서드는 대문자, 타임스탬프는 헤더 값 그대로 사용합니다.
//!
//! 검증 순서: 헤더 존재 → 타임스탬프 파싱 → 시계 오차 → 서명 → nonce.
//! nonce는 서명이 맞는 요청에 대해서만 소비됩니다.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use plumid_core::{PlumIdError, PlumIdResult};
use sha2::{Digest, Sha256};

use super::{buffer_body, AdmissionError, AdmissionState, BufferedBody, NonceStore};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_TIMESTAMP: &str = "x-timestamp";
pub const HEADER_NONCE: &str = "x-nonce";
pub const HEADER_SIGNATURE: &str = "x-signature";

/// 검증 1회분 요청 정보.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub timestamp: Option<&'a str>,
    pub nonce: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

impl<'a> SignedRequest<'a> {
    /// 요청 헤더에서 서명 정보를 읽습니다. 빈 값은 없는 것으로 봅니다.
    pub fn from_parts(
        method: &'a Method,
        path: &'a str,
        headers: &'a HeaderMap,
        body: &'a [u8],
    ) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        };

        Self {
            method: method.as_str(),
            path,
            timestamp: header(HEADER_TIMESTAMP),
            nonce: header(HEADER_NONCE),
            signature: header(HEADER_SIGNATURE),
            body,
        }
    }
}

/// Anti-replay 검증기.
pub struct AntiReplayVerifier {
    mac: HmacSha256,
    max_clock_skew_sec: u64,
    nonce_ttl_sec: u64,
    nonces: Arc<dyn NonceStore>,
}

impl AntiReplayVerifier {
    pub fn new(
        secret: &str,
        max_clock_skew_sec: u64,
        nonce_ttl_sec: u64,
        nonces: Arc<dyn NonceStore>,
    ) -> PlumIdResult<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PlumIdError::Config(format!("invalid APP_HMAC_SECRET: {}", e)))?;

        Ok(Self {
            mac,
            max_clock_skew_sec,
            nonce_ttl_sec,
            nonces,
        })
    }

    /// 서명 대상 문자열.
    pub fn signing_string(
        method: &str,
        path: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> String {
        let body_hash = hex::encode(Sha256::digest(body));
        format!(
            "{}|{}|{}|{}|{}",
            method.to_uppercase(),
            path,
            timestamp,
            nonce,
            body_hash
        )
    }

    fn mac_for(
        &self,
        method: &str,
        path: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(Self::signing_string(method, path, timestamp, nonce, body).as_bytes());
        mac
    }

    /// 요청 서명 (base64).
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> String {
        let tag = self
            .mac_for(method, path, timestamp, nonce, body)
            .finalize()
            .into_bytes();
        STANDARD.encode(tag)
    }

    /// 현재 시각 기준 검증.
    pub async fn verify(&self, request: &SignedRequest<'_>) -> Result<(), AdmissionError> {
        self.verify_at(request, chrono::Utc::now().timestamp()).await
    }

    /// 주어진 Unix 시각 기준 검증.
    pub async fn verify_at(
        &self,
        request: &SignedRequest<'_>,
        now: i64,
    ) -> Result<(), AdmissionError> {
        let (Some(timestamp), Some(nonce), Some(signature)) =
            (request.timestamp, request.nonce, request.signature)
        else {
            return Err(AdmissionError::MissingCredentials);
        };

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AdmissionError::MalformedTimestamp)?;

        if now.abs_diff(ts) > self.max_clock_skew_sec {
            return Err(AdmissionError::StaleTimestamp);
        }

        let claimed = STANDARD
            .decode(signature)
            .map_err(|_| AdmissionError::BadSignature)?;
        // verify_slice는 상수 시간 비교
        self.mac_for(request.method, request.path, timestamp, nonce, request.body)
            .verify_slice(&claimed)
            .map_err(|_| AdmissionError::BadSignature)?;

        if !self.nonces.put_if_absent(nonce, self.nonce_ttl_sec).await? {
            return Err(AdmissionError::ReplayDetected);
        }

        Ok(())
    }
}

/// 서명 검증 미들웨어.
///
/// body 제한 미들웨어가 남긴 [`BufferedBody`]를 사용하며, 없으면 직접 버퍼링합니다.
pub async fn signed_request_middleware(
    State(admission): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let request = if request.extensions().get::<BufferedBody>().is_some() {
        request
    } else {
        match buffer_body(request, admission.max_body_bytes).await {
            Ok(request) => request,
            Err(e) => return e.into_response(),
        }
    };

    let (parts, body) = request.into_parts();
    let bytes: Bytes = parts
        .extensions
        .get::<BufferedBody>()
        .map(|b| b.0.clone())
        .unwrap_or_default();
    drop(body);

    // 중첩 라우터 안에서는 uri가 접두사 없이 보이므로 원래 경로로 서명한다
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let signed = SignedRequest::from_parts(&parts.method, &path, &parts.headers, &bytes);
    if let Err(e) = admission.verifier.verify(&signed).await {
        match &e {
            AdmissionError::BackendUnavailable(_) => tracing::error!(
                path = %path,
                error = %e,
                "Nonce backend failure, rejecting request"
            ),
            _ => tracing::warn!(
                path = %path,
                nonce = signed.nonce.unwrap_or("-"),
                reason = e.code(),
                "Signed request rejected"
            ),
        }
        return e.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
