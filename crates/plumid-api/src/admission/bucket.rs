//! Token bucket 저장소.
//!
//! 버킷은 `burst` 용량까지 초당 `rate` 토큰씩 연속적으로 리필되며, 요청마다
//! `cost` 토큰을 소비합니다. 남은 토큰이 정확히 `cost`와 같으면 허용합니다.
//!
//! - [`LocalBucketStore`]: 프로세스 내부 저장소 (키 샤드 단위 잠금)
//! - [`RedisBucketStore`]: Redis Lua 스크립트로 원자적 갱신 (다중 인스턴스)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;

use super::AdmissionError;

/// `take` 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketDecision {
    pub allowed: bool,
    /// 재시도까지 대기 시간 (초). 허용 시 0.
    pub retry_after: u64,
}

impl BucketDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: 0,
        }
    }

    fn deny(retry_after: u64) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// Token bucket 백엔드.
///
/// 같은 키에 대한 read-modify-write는 원자적이어야 합니다.
#[async_trait]
pub trait TokenBucketBackend: Send + Sync {
    /// 키의 버킷에서 `cost`만큼 토큰 소비를 시도합니다.
    async fn take(
        &self,
        key: &str,
        rate_per_sec: f64,
        burst: u32,
        cost: u32,
    ) -> Result<BucketDecision, AdmissionError>;

    /// 백엔드 이름 (로그/메트릭용).
    fn name(&self) -> &'static str;
}

/// 부족한 토큰이 채워질 때까지의 초 (올림).
fn retry_after_secs(needed: f64, rate_per_sec: f64) -> u64 {
    if needed <= 0.0 {
        return 0;
    }
    // rate가 0이면 무한대가 되고 `as u64`는 u64::MAX로 포화된다
    (needed / rate_per_sec).ceil() as u64
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    /// 이 시각 이후에는 버킷이 가득 차 있다 (새 버킷과 구별 불가). `None`이면 가득 차지 않음.
    full_at: Option<Instant>,
}

/// 프로세스 내부 token bucket 저장소.
///
/// `DashMap` 엔트리가 샤드 잠금을 잡고 있는 동안 리필과 소비가 한 번에 끝나므로
/// 같은 키에 대한 동시 요청이 갱신을 잃어버리지 않습니다.
#[derive(Debug, Default)]
pub struct LocalBucketStore {
    buckets: DashMap<String, BucketState>,
}

impl LocalBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주어진 시각 기준으로 토큰 소비를 시도합니다.
    pub fn take_at(
        &self,
        key: &str,
        rate_per_sec: f64,
        burst: u32,
        cost: u32,
        now: Instant,
    ) -> BucketDecision {
        let burst = f64::from(burst);
        let cost = f64::from(cost);

        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| BucketState {
                tokens: burst,
                last_refill: now,
                full_at: Some(now),
            });
        let state = entry.value_mut();

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate_per_sec).min(burst);
        state.last_refill = state.last_refill.max(now);

        let decision = if state.tokens >= cost {
            state.tokens -= cost;
            BucketDecision::allow()
        } else {
            BucketDecision::deny(retry_after_secs(cost - state.tokens, rate_per_sec))
        };

        let missing = burst - state.tokens;
        state.full_at = if missing <= 0.0 {
            Some(state.last_refill)
        } else {
            Duration::try_from_secs_f64(missing / rate_per_sec)
                .ok()
                .and_then(|d| state.last_refill.checked_add(d))
        };

        decision
    }

    /// 현재 토큰 수 (리필 미반영).
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|b| b.tokens)
    }

    /// 추적 중인 버킷 수.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// 이미 가득 찼을 버킷을 제거합니다.
    ///
    /// 가득 찬 버킷은 처음 보는 키와 같은 결과를 내므로 제거해도 판정이 바뀌지 않습니다.
    pub fn evict_full(&self) -> usize {
        self.evict_full_at(Instant::now())
    }

    pub fn evict_full_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, state| state.full_at.map_or(true, |full_at| full_at > now));
        before.saturating_sub(self.buckets.len())
    }
}

#[async_trait]
impl TokenBucketBackend for LocalBucketStore {
    async fn take(
        &self,
        key: &str,
        rate_per_sec: f64,
        burst: u32,
        cost: u32,
    ) -> Result<BucketDecision, AdmissionError> {
        Ok(self.take_at(key, rate_per_sec, burst, cost, Instant::now()))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// 리필과 소비를 한 번에 수행하는 Lua 스크립트.
///
/// 시간은 Redis 서버의 `TIME`만 사용하므로 인스턴스 간 시계 차이의 영향을 받지 않습니다.
const TAKE_SCRIPT: &str = r#"
local key = KEYS[1]
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local t = redis.call('TIME')
local now = tonumber(t[1]) + tonumber(t[2]) / 1000000

local state = redis.call('HMGET', key, 'tokens', 'last')
local tokens = tonumber(state[1])
local last = tonumber(state[2])
if tokens == nil or last == nil then
    tokens = burst
    last = now
end

local elapsed = math.max(0, now - last)
tokens = math.min(burst, tokens + elapsed * rate)

local allowed = 0
local retry_after = 0
if tokens >= cost then
    tokens = tokens - cost
    allowed = 1
else
    retry_after = math.ceil((cost - tokens) / rate)
end

redis.call('HSET', key, 'tokens', tostring(tokens), 'last', tostring(math.max(now, last)))
redis.call('EXPIRE', key, ttl)
return {allowed, retry_after}
"#;

/// 버킷 키 TTL 상한 (약 68년). 현재 시각에 더해도 Redis 만료 시각 범위를 넘지 않는다.
const MAX_KEY_TTL_SECS: u64 = i32::MAX as u64;

/// Redis 기반 token bucket 저장소.
pub struct RedisBucketStore {
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisBucketStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: redis::Script::new(TAKE_SCRIPT),
        }
    }

    /// 버킷이 가득 찰 때까지 걸리는 시간 + 1초. 이후 키는 만료되어도 판정에 영향이 없다.
    ///
    /// Redis가 거부하지 않도록 [`MAX_KEY_TTL_SECS`]로 제한합니다.
    fn key_ttl_secs(rate_per_sec: f64, burst: u32) -> u64 {
        if rate_per_sec <= 0.0 {
            return 86_400;
        }
        ((f64::from(burst) / rate_per_sec).ceil() as u64)
            .saturating_add(1)
            .min(MAX_KEY_TTL_SECS)
    }
}

#[async_trait]
impl TokenBucketBackend for RedisBucketStore {
    async fn take(
        &self,
        key: &str,
        rate_per_sec: f64,
        burst: u32,
        cost: u32,
    ) -> Result<BucketDecision, AdmissionError> {
        let mut conn = self.conn.clone();
        let (allowed, retry_after): (i64, i64) = self
            .script
            .key(format!("ratelimit:{}", key))
            .arg(rate_per_sec)
            .arg(burst)
            .arg(cost)
            .arg(Self::key_ttl_secs(rate_per_sec, burst))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AdmissionError::BackendUnavailable(e.to_string()))?;

        Ok(BucketDecision {
            allowed: allowed == 1,
            retry_after: retry_after.max(0) as u64,
        })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
