//! 应用层缓存模块
//!
//! 进程内的读穿透缓存：缓存存储、cache-aside 编排、缓存键生成与统计。

pub mod aside;
pub mod config;
pub mod key;
pub mod stats;
pub mod store;
pub mod sweeper;

pub use aside::CacheAside;
pub use config::{CacheConfig, TtlPolicy};
pub use key::{CacheKey, KeyError, Operation};
pub use stats::{CacheHealth, CacheReport, CacheStats, StoreStats};
pub use store::{CacheError, CacheStore, Cacheable};
pub use sweeper::{spawn_sweeper, SweepHandle, MAX_CHECK_PERIOD, MIN_CHECK_PERIOD};
