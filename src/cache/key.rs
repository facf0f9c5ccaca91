//! 缓存键模块
//!
//! 由 (操作名, 集合, 规范化参数) 确定性地生成缓存键。
//! 相同的逻辑查询总是得到相同的键，不同的参数值不会冲突。

use crate::storage::Collection;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// 缓存键生成错误
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// 参数无法规范化序列化
    #[error("cannot derive cache key for `{op}`: {source}")]
    Unserializable {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// 走缓存的查询操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// 全量列表
    All,
    /// 随机抽样
    TopSix,
    /// 条件查询
    Find,
    /// 单条查询
    FindOne,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::All => "all",
            Operation::TopSix => "topsix",
            Operation::Find => "find",
            Operation::FindOne => "findOne",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// 无参数操作的键，例如 `topsix_games`
    pub fn new(op: Operation, collection: Collection) -> Self {
        Self(format!("{}_{}", op, collection))
    }

    /// 带固定标签的键，例如 `all_games_full`
    ///
    /// 标签不会与 JSON 参数冲突：规范化 JSON 不可能是一个裸单词（`true`/`false`/`null` 除外）。
    pub fn with_tag(op: Operation, collection: Collection, tag: &str) -> Self {
        Self(format!("{}_{}_{}", op, collection, tag))
    }

    /// 带参数的键，参数以规范化 JSON 追加，例如 `find_games_{"category":"action"}`
    pub fn with_params<P>(op: Operation, collection: Collection, params: &P) -> Result<Self, KeyError>
    where
        P: Serialize + ?Sized,
    {
        let canonical = canonical_json(params).map_err(|source| KeyError::Unserializable {
            op: op.as_str(),
            source,
        })?;
        Ok(Self(format!("{}_{}_{}", op, collection, canonical)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 规范化 JSON 序列化
///
/// 对象的键按字典序输出，整数值的浮点数按整数输出，因此 `{"b":1,"a":2.0}` 与
/// `{"a":2,"b":1}` 得到相同结果。
pub fn canonical_json<P>(params: &P) -> Result<String, serde_json::Error>
where
    P: Serialize + ?Sized,
{
    let value = serde_json::to_value(params)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k)?);
                out.push(':');
                write_canonical(v, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                out.push_str(&(f as i64).to_string());
            }
            _ => out.push_str(&n.to_string()),
        },
        other => out.push_str(&serde_json::to_string(other)?),
    }
    Ok(())
}
