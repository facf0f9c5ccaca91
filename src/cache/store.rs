//! 进程内缓存存储
//!
//! 键值存储，每个条目有独立的过期时间。值以 `Arc` 共享保存，`set`/`get`
//! 都不做深拷贝：同一条目的所有读者拿到的是同一份数据，只能只读访问，
//! 需要修改时应自行克隆。
//!
//! 过期检查在每次 `get` 时独立进行，后台清理（见 [`super::sweeper`]）只负责回收内存。

use super::config::CacheConfig;
use super::stats::{CacheReport, CacheStats, StoreStats};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 缓存写入错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// 键数量达到上限
    #[error("cache is full ({max_keys} keys)")]
    CacheFull { max_keys: usize },
    /// 内部锁被污染
    #[error("cache lock poisoned")]
    Poisoned,
}

/// 可放入缓存的值
///
/// 只要求能估算占用的字节数，用于统计 `vsize`。
pub trait Cacheable: Any + Send + Sync {
    /// 近似字节数
    fn approximate_size(&self) -> usize;
}

impl Cacheable for Value {
    fn approximate_size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 4,
            Value::Number(_) => 8,
            Value::String(s) => s.len(),
            Value::Array(items) => items.iter().map(Cacheable::approximate_size).sum(),
            Value::Object(map) => map.approximate_size(),
        }
    }
}

impl Cacheable for Map<String, Value> {
    fn approximate_size(&self) -> usize {
        self.iter()
            .map(|(k, v)| k.len() + v.approximate_size())
            .sum()
    }
}

impl Cacheable for String {
    fn approximate_size(&self) -> usize {
        self.len()
    }
}

impl Cacheable for u64 {
    fn approximate_size(&self) -> usize {
        8
    }
}

impl<T: Cacheable> Cacheable for Vec<T> {
    fn approximate_size(&self) -> usize {
        self.iter().map(Cacheable::approximate_size).sum()
    }
}

impl<T: Cacheable> Cacheable for Option<T> {
    fn approximate_size(&self) -> usize {
        self.as_ref().map_or(0, Cacheable::approximate_size)
    }
}

/// 缓存条目
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    value_bytes: usize,
    /// `None` 表示永不过期
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

enum Lookup {
    Live(Arc<dyn Any + Send + Sync>),
    Expired,
    Absent,
}

/// 缓存存储
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: CacheStats,
    config: CacheConfig,
    /// 正在获取中的键（仅在 `coalesce_misses` 打开时使用）
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheStore {
    /// 创建新的缓存存储
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::new(),
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// 使用默认配置创建
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 获取缓存值
    ///
    /// 每次查找都计入命中或未命中，包括不经过 cache-aside 的直接调用。
    /// 已过期的条目视为不存在，并在此处顺带移除。
    pub fn get<T: Cacheable>(&self, key: &str) -> Option<Arc<T>> {
        let now = Instant::now();
        let lookup = match self.entries.read() {
            Ok(entries) => match entries.get(key) {
                Some(entry) if entry.is_live(now) => Lookup::Live(Arc::clone(&entry.value)),
                Some(_) => Lookup::Expired,
                None => Lookup::Absent,
            },
            Err(_) => {
                warn!(key, "cache lock poisoned on get");
                Lookup::Absent
            }
        };

        match lookup {
            Lookup::Live(value) => match value.downcast::<T>() {
                Ok(value) => {
                    self.stats.record_hit();
                    debug!(key, "cache hit");
                    Some(value)
                }
                Err(_) => {
                    warn!(key, "cached value has a different type than requested");
                    self.stats.record_miss();
                    None
                }
            },
            Lookup::Expired => {
                self.remove_if_expired(key, now);
                self.stats.record_miss();
                debug!(key, "cache miss (expired)");
                None
            }
            Lookup::Absent => {
                self.stats.record_miss();
                debug!(key, "cache miss");
                None
            }
        }
    }

    /// 检查键是否存在且未过期，不计入统计
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.get(key).is_some_and(|e| e.is_live(now)))
            .unwrap_or(false)
    }

    /// 写入缓存值
    ///
    /// `ttl` 为 `None` 时使用默认 TTL；`Duration::ZERO` 表示永不过期。
    /// 覆盖同名键的旧值及其过期时间。
    pub fn set<T: Cacheable>(
        &self,
        key: impl Into<String>,
        value: T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.set_shared(key, Arc::new(value), ttl)
    }

    /// 写入已共享的值，不做拷贝
    pub fn set_shared<T: Cacheable>(
        &self,
        key: impl Into<String>,
        value: Arc<T>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        let entry = CacheEntry {
            value_bytes: value.approximate_size(),
            value,
            expires_at,
        };

        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        if let Some(max_keys) = self.config.max_keys {
            if !entries.contains_key(&key) && entries.len() >= max_keys {
                return Err(CacheError::CacheFull { max_keys });
            }
        }
        debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
        entries.insert(key, entry);
        Ok(())
    }

    /// 删除指定键，返回删除的条目数（0 或 1）
    pub fn delete(&self, key: &str) -> usize {
        match self.entries.write() {
            Ok(mut entries) => usize::from(entries.remove(key).is_some()),
            Err(_) => {
                warn!(key, "cache lock poisoned on delete");
                0
            }
        }
    }

    /// 清空所有条目，统计计数不受影响
    pub fn flush_all(&self) {
        match self.entries.write() {
            Ok(mut entries) => {
                entries.clear();
                tracing::info!("cache cleared");
            }
            Err(_) => warn!("cache lock poisoned on flush"),
        }
    }

    /// 剩余存活时间；不存在或已过期时返回 `None`，永不过期返回 `Duration::MAX`
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key).filter(|e| e.is_live(now))?;
        Some(entry.expires_at.map_or(Duration::MAX, |at| at - now))
    }

    /// 当前所有键（包含尚未清理的过期条目）
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 移除所有已过期条目，返回移除数量
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.write() else {
            warn!("cache lock poisoned on sweep");
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// 统计快照
    pub fn stats(&self) -> StoreStats {
        let (keys, ksize, vsize) = self
            .entries
            .read()
            .map(|entries| {
                entries.iter().fold((0, 0, 0), |(n, k, v), (key, entry)| {
                    (n + 1, k + key.len(), v + entry.value_bytes)
                })
            })
            .unwrap_or_default();

        StoreStats {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            keys,
            ksize,
            vsize,
        }
    }

    /// 监控报告
    pub fn report(&self) -> CacheReport {
        self.stats().report()
    }

    /// 重置命中/未命中计数
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    fn remove_if_expired(&self, key: &str, now: Instant) {
        if let Ok(mut entries) = self.entries.write() {
            if entries.get(key).is_some_and(|e| !e.is_live(now)) {
                entries.remove(key);
            }
        }
    }

    /// 获取某个键的 in-flight 槽位
    pub(crate) fn inflight_slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.inflight.lock() {
            Ok(mut inflight) => Arc::clone(inflight.entry(key.to_string()).or_default()),
            // 锁被污染时退化为不合并
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// 释放槽位；没有其他等待者时从表中移除
    pub(crate) fn release_inflight(&self, key: &str, slot: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut inflight) = self.inflight.lock() {
            let idle = inflight
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) <= 2);
            if idle {
                inflight.remove(key);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn inflight_len(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}
