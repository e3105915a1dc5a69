//! Rate limiting middleware.
//!
//! 버킷 키는 `클라이언트 IP:자격증명 식별자:경로`입니다. 경로 접두사로 정책을 고릅니다:
//! `/health`는 제한 없음, `/auth/login`은 엄격한 로그인 정책, 나머지는 기본 정책.
//!
//! 클라이언트 IP는 TCP 연결 주소입니다. 연결 주소가 `TRUSTED_PROXIES`에 있을 때만
//! 전달 헤더를 읽습니다.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use plumid_core::AdmissionConfig;
use sha2::{Digest, Sha256};

use super::{AdmissionError, AdmissionState, TokenBucketBackend};

/// 경로 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// rate limit 대상 아님
    Exempt,
    Login,
    Default,
}

/// 경로 접두사로 분류합니다.
pub fn classify_path(path: &str) -> RouteClass {
    if path.starts_with("/health") {
        RouteClass::Exempt
    } else if path.starts_with("/auth/login") {
        RouteClass::Login
    } else {
        RouteClass::Default
    }
}

/// 버킷 정책.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePolicy {
    /// 초당 리필 토큰 수
    pub rate_per_sec: f64,
    /// 버킷 용량
    pub burst: u32,
}

/// Rate Limiter.
pub struct RateLimiter {
    backend: Arc<dyn TokenBucketBackend>,
    default_policy: RatePolicy,
    login_policy: RatePolicy,
    trusted_proxies: Vec<IpAddr>,
}

impl RateLimiter {
    pub fn new(backend: Arc<dyn TokenBucketBackend>, config: &AdmissionConfig) -> Self {
        Self {
            backend,
            default_policy: RatePolicy {
                rate_per_sec: config.default_rate_per_sec(),
                burst: config.rl_burst,
            },
            login_policy: RatePolicy {
                rate_per_sec: config.login_rate_per_sec(),
                burst: config.login_burst(),
            },
            trusted_proxies: config.trusted_proxy_addrs(),
        }
    }

    /// 요청의 클라이언트 IP.
    pub fn client_ip(&self, request: &Request) -> IpAddr {
        extract_client_ip(request, &self.trusted_proxies)
    }

    /// 경로에 적용할 정책. 제외 경로는 `None`.
    pub fn policy_for(&self, path: &str) -> Option<RatePolicy> {
        match classify_path(path) {
            RouteClass::Exempt => None,
            RouteClass::Login => Some(self.login_policy),
            RouteClass::Default => Some(self.default_policy),
        }
    }

    /// 버킷 키 생성.
    ///
    /// 자격증명은 `Authorization` 헤더의 마지막 토큰을 SHA-256 해시 앞 16자로 줄여
    /// 사용합니다. 헤더가 없으면 `-`.
    pub fn bucket_key(ip: IpAddr, authorization: Option<&str>, path: &str) -> String {
        let credential = authorization
            .and_then(|value| value.split_whitespace().last())
            .map(|token| {
                let digest = hex::encode(Sha256::digest(token.as_bytes()));
                digest[..16].to_string()
            })
            .unwrap_or_else(|| "-".to_string());

        format!("{}:{}:{}", ip, credential, path)
    }

    /// 요청 1건에 대해 토큰 1개 소비를 시도합니다.
    pub async fn check(&self, key: &str, policy: RatePolicy) -> Result<(), AdmissionError> {
        let decision = self
            .backend
            .take(key, policy.rate_per_sec, policy.burst, 1)
            .await?;

        if decision.allowed {
            Ok(())
        } else {
            Err(AdmissionError::RateLimited {
                retry_after: decision.retry_after,
            })
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Rate Limiting 미들웨어 함수.
pub async fn rate_limit_middleware(
    State(admission): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(policy) = admission.limiter.policy_for(&path) else {
        return next.run(request).await;
    };

    let ip = admission.limiter.client_ip(&request);
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let key = RateLimiter::bucket_key(ip, authorization, &path);

    match admission.limiter.check(&key, policy).await {
        Ok(()) => next.run(request).await,
        Err(AdmissionError::RateLimited { retry_after }) => {
            tracing::warn!(
                client_ip = %ip,
                path = %path,
                retry_after,
                "Rate limit exceeded"
            );
            AdmissionError::RateLimited { retry_after }.into_response()
        }
        Err(e) => {
            tracing::error!(
                backend = admission.limiter.backend_name(),
                error = %e,
                "Rate limit backend failure, rejecting request"
            );
            e.into_response()
        }
    }
}

/// 요청에서 클라이언트 IP 추출.
///
/// 기본값은 `ConnectInfo`의 연결 주소입니다. 연결 주소가 `trusted_proxies`에 있으면
/// X-Forwarded-For를 오른쪽부터 읽어 신뢰 프록시가 아닌 첫 주소를, 없으면 X-Real-IP를
/// 사용합니다. 연결 정보가 없으면 `0.0.0.0`이며 이때 전달 헤더는 무시합니다.
pub fn extract_client_ip(request: &Request, trusted_proxies: &[IpAddr]) -> IpAddr {
    let Some(peer) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    };

    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| {
            value
                .rsplit(',')
                .filter_map(|s| s.trim().parse::<IpAddr>().ok())
                .find(|ip| !trusted_proxies.contains(ip))
        });
    if let Some(ip) = forwarded {
        return ip;
    }

    request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(peer)
}
