//! 异步集合
//!
//! 把同步的 [`CollectionStore`] 放到阻塞线程池上执行，供异步的服务层调用

use super::{Collection, CollectionStore, StorageError};
use crate::query::{Filter, FindQuery, Pipeline, Update};
use crate::values::Document;
use std::sync::Arc;

/// 异步集合句柄，克隆开销很小
#[derive(Clone)]
pub struct AsyncCollection {
    collection: Collection,
    store: Arc<dyn CollectionStore>,
}

impl AsyncCollection {
    pub fn new(collection: Collection, store: Arc<dyn CollectionStore>) -> Self {
        Self { collection, store }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// 底层同步存储
    pub fn store(&self) -> &Arc<dyn CollectionStore> {
        &self.store
    }

    async fn blocking<R, F>(&self, op: F) -> Result<R, StorageError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn CollectionStore) -> Result<R, StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StorageError::Join(e.to_string()))?
    }

    pub async fn find(&self, query: FindQuery) -> Result<Vec<Document>, StorageError> {
        self.blocking(move |store| store.find(&query)).await
    }

    pub async fn find_one(&self, query: FindQuery) -> Result<Option<Document>, StorageError> {
        self.blocking(move |store| store.find_one(&query)).await
    }

    pub async fn aggregate(&self, pipeline: Pipeline) -> Result<Vec<Document>, StorageError> {
        self.blocking(move |store| store.aggregate(&pipeline)).await
    }

    pub async fn count(&self, filter: Filter) -> Result<usize, StorageError> {
        self.blocking(move |store| store.count(&filter)).await
    }

    pub async fn insert(&self, doc: Document) -> Result<Document, StorageError> {
        self.blocking(move |store| store.insert(doc)).await
    }

    pub async fn update_one(
        &self,
        filter: Filter,
        update: Update,
    ) -> Result<Option<Document>, StorageError> {
        self.blocking(move |store| store.update_one(&filter, &update)).await
    }

    pub async fn delete_one(&self, filter: Filter) -> Result<usize, StorageError> {
        self.blocking(move |store| store.delete_one(&filter)).await
    }

    pub async fn flush(&self) -> Result<usize, StorageError> {
        self.blocking(|store| store.flush()).await
    }
}
