//! 集合注册表
//!
//! 启动时把每个 [`Collection`] 映射到具体的存储句柄，之后只读。

use super::{AsyncCollection, Collection, CollectionStore, MemStore, SledStore, StorageError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Default)]
pub struct CollectionRegistry {
    handles: HashMap<Collection, AsyncCollection>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册集合，已存在时替换
    pub fn register(mut self, collection: Collection, store: Arc<dyn CollectionStore>) -> Self {
        self.handles
            .insert(collection, AsyncCollection::new(collection, store));
        self
    }

    /// 所有集合都使用内存存储
    pub fn in_memory() -> Self {
        Collection::ALL
            .into_iter()
            .fold(Self::new(), |registry, c| registry.register(c, Arc::new(MemStore::new())))
    }

    /// 所有集合存放在同一个 sled 数据库中
    pub fn open_sled<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        let mut registry = Self::new();
        for collection in Collection::ALL {
            let store = SledStore::open_tree(&db, collection)?;
            registry = registry.register(collection, Arc::new(store));
        }
        info!(path = %path.as_ref().display(), "opened sled collections");
        Ok(registry)
    }

    pub fn get(&self, collection: Collection) -> Result<&AsyncCollection, StorageError> {
        self.handles
            .get(&collection)
            .ok_or(StorageError::Unregistered(collection))
    }

    /// 按名称查找，未知名称返回类型化错误
    pub fn resolve(&self, name: &str) -> Result<&AsyncCollection, StorageError> {
        self.get(name.parse()?)
    }

    pub fn collections(&self) -> impl Iterator<Item = Collection> + '_ {
        self.handles.keys().copied()
    }

    /// 关闭前刷盘所有集合，返回刷出的总字节数
    pub async fn flush_all(&self) -> Result<usize, StorageError> {
        let mut flushed = 0;
        for collection in self.collections() {
            flushed += self.get(collection)?.flush().await?;
        }
        info!(flushed, "collections flushed");
        Ok(flushed)
    }
}
