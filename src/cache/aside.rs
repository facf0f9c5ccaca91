//! Cache-aside 编排
//!
//! 先查缓存，命中直接返回；未命中时执行调用方提供的获取操作，把结果写回缓存后返回。
//! 写回失败只记录日志，不影响返回新鲜数据；获取失败原样向上传播，不做负缓存。

use super::store::{CacheStore, Cacheable};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Cache-aside 编排器
///
/// 自身不持有可变状态，所有状态都在注入的 [`CacheStore`] 中。
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<CacheStore>,
}

impl CacheAside {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// 获取缓存值，未命中时调用 `fetch` 并写回
    ///
    /// 默认不合并并发未命中：同一键的多个并发调用者可能各自执行 `fetch`，
    /// 最后写入者生效。配置 `coalesce_misses` 后，同一键同时只有一个 `fetch` 在执行，
    /// 其余调用者等待并读取其结果。
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> Result<Arc<T>, E>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.store.get::<T>(key) {
            return Ok(cached);
        }

        if self.store.config().coalesce_misses {
            self.coalesced(key, fetch, ttl).await
        } else {
            self.fetch_and_store(key, fetch, ttl).await
        }
    }

    async fn fetch_and_store<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> Result<Arc<T>, E>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let fresh = Arc::new(fetch().await?);

        if let Err(err) = self.store.set_shared(key, Arc::clone(&fresh), ttl) {
            warn!(key, error = %err, "could not cache fresh value");
        }

        Ok(fresh)
    }

    async fn coalesced<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> Result<Arc<T>, E>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let release = InflightRelease {
            store: &self.store,
            key,
            slot: self.store.inflight_slot(key),
        };

        let guard = match Arc::clone(&release.slot).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                let guard = Arc::clone(&release.slot).lock_owned().await;
                // 等待期间前一个获取者可能已写入
                if let Some(cached) = self.store.get::<T>(key) {
                    return Ok(cached);
                }
                guard
            }
        };

        let result = self.fetch_and_store(key, fetch, ttl).await;
        drop(guard);
        result
    }
}

/// 离开作用域时释放 in-flight 槽位（包括 future 被取消的情况）
struct InflightRelease<'a> {
    store: &'a CacheStore,
    key: &'a str,
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightRelease<'_> {
    fn drop(&mut self) {
        self.store.release_inflight(self.key, &self.slot);
    }
}
