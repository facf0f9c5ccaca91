//! 缓存配置模块
//!
//! 定义缓存存储的默认 TTL、清理周期以及各查询操作的 TTL 策略

use std::time::Duration;

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 未指定 TTL 时使用的默认过期时间
    pub default_ttl: Duration,

    /// 后台清理过期条目的周期
    pub check_period: Duration,

    /// 最大键数量，`None` 表示不限制
    pub max_keys: Option<usize>,

    /// 并发未命中时是否合并同一键的获取（single-flight）
    pub coalesce_misses: bool,

    /// 各查询操作的 TTL 策略
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600), // 1 hour
            check_period: Duration::from_secs(600), // 10 minutes
            max_keys: None,
            coalesce_misses: false,
            ttl: TtlPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// 创建低内存配置
    pub fn low_memory() -> Self {
        Self {
            max_keys: Some(1_000),
            check_period: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// 创建高并发配置：合并同一键的并发未命中
    pub fn high_concurrency() -> Self {
        Self {
            coalesce_misses: true,
            ..Default::default()
        }
    }
}

/// 查询操作的 TTL 策略
///
/// 稳定的列表查询缓存较久；随机抽样的结果刷新得更频繁，让用户看到的内容有所变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// 全量列表（`all`）
    pub stable: Duration,
    /// 随机抽样（`topsix`）
    pub sampled: Duration,
    /// 条件查询（`find`）
    pub find: Duration,
    /// 单条查询（`findOne`）
    pub find_one: Duration,
    /// 组合页面数据（如 404 页面）
    pub page_data: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            stable: Duration::from_secs(3600),
            sampled: Duration::from_secs(1800),
            find: Duration::from_secs(1800),
            find_one: Duration::from_secs(3600),
            page_data: Duration::from_secs(1800),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.check_period, Duration::from_secs(600));
        assert_eq!(config.max_keys, None);
        assert!(!config.coalesce_misses);
    }

    #[test]
    fn test_ttl_classes() {
        let ttl = TtlPolicy::default();
        // 抽样结果比稳定列表刷新得更快
        assert!(ttl.sampled < ttl.stable);
        assert_eq!(ttl.find, Duration::from_secs(1800));
        assert_eq!(ttl.find_one, Duration::from_secs(3600));
    }

    #[test]
    fn test_low_memory_config() {
        let config = CacheConfig::low_memory();
        assert_eq!(config.max_keys, Some(1_000));
    }

    #[test]
    fn test_high_concurrency_config() {
        let config = CacheConfig::high_concurrency();
        assert!(config.coalesce_misses);
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
    }
}
