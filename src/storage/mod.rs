//! 文档存储
//!
//! 每个集合一个 [`CollectionStore`]，同步接口，内部自行加锁。
//! 异步调用方通过 [`AsyncCollection`] 在阻塞线程池上访问。

pub mod async_store;
pub mod mem_store;
pub mod registry;
pub mod seed;
pub mod sled_store;

pub use async_store::AsyncCollection;
pub use mem_store::MemStore;
pub use registry::CollectionRegistry;
pub use seed::SeedData;
pub use sled_store::SledStore;

use crate::query::{Filter, FindQuery, Pipeline, QueryError, Update};
use crate::values::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 集合标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Games,
    Categories,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Games, Collection::Categories];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Games => "games",
            Collection::Categories => "categories",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知的集合名
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection `{0}`")]
pub struct UnknownCollection(pub String);

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCollection(s.to_string()))
    }
}

/// 存储错误
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    UnknownCollection(#[from] UnknownCollection),
    #[error("collection `{0}` is not registered")]
    Unregistered(Collection),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("duplicate _id `{0}`")]
    DuplicateId(String),
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("document encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("key encoding error: {0}")]
    Key(#[from] bincode::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("blocking task failed: {0}")]
    Join(String),
    #[error("seed file error: {0}")]
    Io(#[from] std::io::Error),
}

/// 单个集合的存储
///
/// `find`/`aggregate`/`count` 默认在 [`scan`](CollectionStore::scan) 的结果上执行，
/// 实现可以覆盖以避免整表复制。
pub trait CollectionStore: Send + Sync {
    /// 按插入顺序返回全部文档
    fn scan(&self) -> Result<Vec<Document>, StorageError>;

    /// 插入文档，缺少 `_id` 时自动生成；返回插入后的文档
    fn insert(&self, doc: Document) -> Result<Document, StorageError>;

    /// 更新第一个匹配的文档，返回更新后的文档
    fn update_one(&self, filter: &Filter, update: &Update) -> Result<Option<Document>, StorageError>;

    /// 删除第一个匹配的文档，返回删除数量（0 或 1）
    fn delete_one(&self, filter: &Filter) -> Result<usize, StorageError>;

    fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StorageError> {
        Ok(query.execute(&self.scan()?))
    }

    fn find_one(&self, query: &FindQuery) -> Result<Option<Document>, StorageError> {
        let query = query.clone().limit(1);
        Ok(self.find(&query)?.into_iter().next())
    }

    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Document>, StorageError> {
        Ok(pipeline.run(self.scan()?))
    }

    fn count(&self, filter: &Filter) -> Result<usize, StorageError> {
        Ok(self.scan()?.iter().filter(|doc| filter.matches(doc)).count())
    }

    /// 把未落盘的写入刷到磁盘，返回刷出的字节数；内存实现无需刷盘
    fn flush(&self) -> Result<usize, StorageError> {
        Ok(0)
    }
}

/// 插入前补齐 `_id`，返回其字符串形式用于去重
pub(crate) fn ensure_id(doc: &mut Document) -> String {
    use crate::values::document::new_object_id;
    use crate::values::ID_FIELD;
    use serde_json::Value;

    match doc.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => {
            let id = new_object_id();
            doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        }
    }
}
