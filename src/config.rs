//! 进程配置
//!
//! 从环境变量读取；未设置的项使用默认值，格式错误返回 [`ConfigError`]。

use crate::cache::{CacheConfig, MAX_CHECK_PERIOD};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}`")]
    Invalid { var: &'static str, value: String },
}

/// 进程配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// sled 数据目录；未设置时使用内存存储
    pub data_dir: Option<PathBuf>,
    /// 初始数据文件
    pub seed: Option<PathBuf>,
    pub cache: CacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            data_dir: None,
            seed: None,
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从进程环境读取
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// 从任意键值来源读取，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind) = parse_var(&lookup, "CATALOG_BIND")? {
            config.bind = bind;
        }
        if let Some(port) = parse_var(&lookup, "PORT")? {
            config.port = port;
        }
        config.data_dir = lookup("CATALOG_DATA_DIR").filter(|s| !s.is_empty()).map(PathBuf::from);
        config.seed = lookup("CATALOG_SEED").filter(|s| !s.is_empty()).map(PathBuf::from);

        if let Some(secs) = parse_var::<u64, _>(&lookup, "CATALOG_CACHE_TTL_SECS")? {
            config.cache.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CATALOG_CACHE_CHECK_SECS")? {
            if secs == 0 || secs > MAX_CHECK_PERIOD.as_secs() {
                return Err(ConfigError::Invalid {
                    var: "CATALOG_CACHE_CHECK_SECS",
                    value: secs.to_string(),
                });
            }
            config.cache.check_period = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize, _>(&lookup, "CATALOG_CACHE_MAX_KEYS")? {
            config.cache.max_keys = Some(max);
        }
        if let Some(coalesce) = parse_flag(&lookup, "CATALOG_CACHE_COALESCE")? {
            config.cache.coalesce_misses = coalesce;
        }

        Ok(config)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn parse_flag<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).as_deref().map(str::trim) {
        None => Ok(None),
        Some("1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some("0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
        }),
    }
}
