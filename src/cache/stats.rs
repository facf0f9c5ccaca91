//! 缓存统计和监控模块
//!
//! 提供命中率、键数量和内存占用等统计信息

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 缓存计数器
///
/// 命中/未命中计数自进程启动（或最近一次显式重置）起单调递增，不做持久化。
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// 创建新的统计对象
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录缓存命中
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录缓存未命中
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取命中次数
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// 获取未命中次数
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// 重置计数器
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// 缓存存储的统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    /// 当前键数量（包含尚未被清理的过期条目）
    pub keys: usize,
    /// 键的近似字节数
    pub ksize: usize,
    /// 值的近似字节数
    pub vsize: usize,
}

impl StoreStats {
    /// 总查找次数
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// 命中率，无请求时返回 0.0
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// 生成报告
    pub fn report(&self) -> CacheReport {
        CacheReport::from_stats(self)
    }
}

/// 缓存健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheHealth {
    Excellent,
    Good,
    #[serde(rename = "Needs Warmup")]
    NeedsWarmup,
}

impl CacheHealth {
    /// 根据命中率（0.0 - 1.0）判断状态
    pub fn from_hit_rate(rate: f64) -> Self {
        if rate > 0.9 {
            CacheHealth::Excellent
        } else if rate > 0.7 {
            CacheHealth::Good
        } else {
            CacheHealth::NeedsWarmup
        }
    }
}

/// 缓存报告，供监控端点读取
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    /// 百分比形式，保留两位小数
    pub hit_rate_percent: String,
    pub keys: usize,
    pub ksize: usize,
    pub vsize: usize,
    pub status: CacheHealth,
}

impl CacheReport {
    /// 从统计快照生成报告
    pub fn from_stats(stats: &StoreStats) -> Self {
        let hit_rate = stats.hit_rate();
        Self {
            hits: stats.hits,
            misses: stats.misses,
            total_requests: stats.total_requests(),
            hit_rate,
            hit_rate_percent: format!("{:.2}%", hit_rate * 100.0),
            keys: stats.keys,
            ksize: stats.ksize,
            vsize: stats.vsize,
            status: CacheHealth::from_hit_rate(hit_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(hits: u64, misses: u64) -> StoreStats {
        StoreStats {
            hits,
            misses,
            keys: 0,
            ksize: 0,
            vsize: 0,
        }
    }

    #[test]
    fn test_stats_basic() {
        let stats = CacheStats::new();

        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStats::new();

        stats.record_hit();
        stats.record_miss();
        stats.reset();

        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.misses(), 0);
    }

    #[test]
    fn test_zero_hit_rate() {
        let report = snapshot(0, 0).report();
        assert_eq!(report.hit_rate, 0.0);
        assert_eq!(report.hit_rate_percent, "0.00%");
        assert_eq!(report.status, CacheHealth::NeedsWarmup);
    }

    #[test]
    fn test_hit_rate() {
        let stats = snapshot(2, 1);
        assert!((stats.hit_rate() - 0.666).abs() < 0.01);
        assert_eq!(stats.report().hit_rate_percent, "66.67%");
    }

    #[test]
    fn test_health_thresholds() {
        assert_eq!(snapshot(95, 5).report().status, CacheHealth::Excellent);
        assert_eq!(snapshot(80, 20).report().status, CacheHealth::Good);
        assert_eq!(snapshot(70, 30).report().status, CacheHealth::NeedsWarmup);
    }

    #[test]
    fn test_health_serializes_label() {
        let json = serde_json::to_value(CacheHealth::NeedsWarmup).unwrap();
        assert_eq!(json, serde_json::json!("Needs Warmup"));
    }
}
