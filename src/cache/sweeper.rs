//! 过期条目的后台清理任务

use super::store::CacheStore;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 清理周期的下限
pub const MIN_CHECK_PERIOD: Duration = Duration::from_secs(1);
/// 清理周期的上限（一天）
pub const MAX_CHECK_PERIOD: Duration = Duration::from_secs(86_400);

/// 清理任务句柄
///
/// 调用 [`SweepHandle::shutdown`] 停止任务；句柄被丢弃时任务会被中止。
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// 通知任务退出并等待其结束
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// 按 `check_period` 周期清理过期条目
///
/// 任务只持有存储的弱引用，存储被释放后任务自行退出。
pub fn spawn_sweeper(store: &Arc<CacheStore>) -> SweepHandle {
    let configured = store.config().check_period;
    let period = configured.clamp(MIN_CHECK_PERIOD, MAX_CHECK_PERIOD);
    if period != configured {
        warn!(
            configured_secs = configured.as_secs(),
            period_secs = period.as_secs(),
            "check period out of range, clamped"
        );
    }
    let store: Weak<CacheStore> = Arc::downgrade(store);
    let (tx, mut rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut rx => break,
                _ = ticker.tick() => {
                    let Some(store) = store.upgrade() else { break };
                    let removed = store.sweep_expired();
                    if removed > 0 {
                        debug!(removed, "swept expired cache entries");
                    }
                }
            }
        }
        info!("cache sweeper stopped");
    });

    SweepHandle {
        shutdown: Some(tx),
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use serde_json::json;
    use std::time::Duration;

    fn store(check_period: Duration) -> Arc<CacheStore> {
        Arc::new(CacheStore::new(CacheConfig {
            check_period,
            ..Default::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let cache = store(Duration::from_secs(600));
        cache.set("short", json!(1), Some(Duration::from_secs(60))).unwrap();
        cache.set("long", json!(2), Some(Duration::from_secs(3600))).unwrap();
        let handle = spawn_sweeper(&cache);

        // 到期后、清理前条目仍占位
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(cache.len(), 2);

        time::sleep(Duration::from_secs(500)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("long"));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_period_is_clamped() {
        let cache = store(Duration::ZERO);
        cache.set("k", json!(1), Some(Duration::from_secs(1))).unwrap();
        let handle = spawn_sweeper(&cache);

        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(cache.len(), 0);
        handle.shutdown().await;

        let cache = store(Duration::MAX);
        let handle = spawn_sweeper(&cache);
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let cache = store(Duration::from_secs(1));
        let handle = spawn_sweeper(&cache);
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_store_dropped() {
        let cache = store(Duration::from_secs(1));
        let handle = spawn_sweeper(&cache);
        drop(cache);

        time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }
}
