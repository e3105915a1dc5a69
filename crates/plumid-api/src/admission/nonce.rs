//! Nonce 저장소.
//!
//! `put_if_absent`는 원자적 test-and-set입니다. 같은 nonce로 TTL 안에 여러 번
//! 호출되면 정확히 한 번만 `true`를 반환합니다.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use redis::aio::ConnectionManager;

use super::AdmissionError;

/// 만료 항목 정리 최소 간격.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Nonce 저장소.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// nonce가 없거나 만료되었으면 기록하고 `true`, 이미 유효하게 존재하면 `false`.
    async fn put_if_absent(&self, nonce: &str, ttl_secs: u64) -> Result<bool, AdmissionError>;

    fn name(&self) -> &'static str;
}

/// 프로세스 내부 nonce 저장소.
///
/// 호출마다 만료 항목 정리를 시도하며, 실제 전체 순회는 [`SWEEP_INTERVAL`]에 한 번만 합니다.
#[derive(Debug)]
pub struct LocalNonceStore {
    seen: DashMap<String, Instant>,
    last_sweep: Mutex<Instant>,
}

impl Default for LocalNonceStore {
    fn default() -> Self {
        Self {
            seen: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }
}

impl LocalNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주어진 시각 기준으로 nonce 기록을 시도합니다.
    pub fn put_if_absent_at(&self, nonce: &str, ttl: Duration, now: Instant) -> bool {
        self.sweep_expired(now);

        let expires_at = now + ttl;
        match self.seen.entry(nonce.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        }
    }

    fn sweep_expired(&self, now: Instant) {
        {
            let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
                // 다른 호출이 정리 중
                return;
            };
            if now.saturating_duration_since(*last_sweep) < SWEEP_INTERVAL {
                return;
            }
            *last_sweep = now;
        }
        self.seen.retain(|_, expires_at| *expires_at > now);
    }

    /// 기록된 nonce 수 (만료 미정리 포함).
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[async_trait]
impl NonceStore for LocalNonceStore {
    async fn put_if_absent(&self, nonce: &str, ttl_secs: u64) -> Result<bool, AdmissionError> {
        Ok(self.put_if_absent_at(nonce, Duration::from_secs(ttl_secs), Instant::now()))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Redis 기반 nonce 저장소.
///
/// `SET nonce:{n} 1 NX EX ttl` 단일 명령으로 존재 확인, 기록, 만료 설정을 함께 수행합니다.
pub struct RedisNonceStore {
    conn: ConnectionManager,
}

impl RedisNonceStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NonceStore for RedisNonceStore {
    async fn put_if_absent(&self, nonce: &str, ttl_secs: u64) -> Result<bool, AdmissionError> {
        let key = format!("nonce:{}", nonce);
        let mut conn = self.conn.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| AdmissionError::BackendUnavailable(e.to_string()))?;

        Ok(result.is_some())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
