//! 初始数据
//!
//! JSON 文件格式：`{"games": [...], "categories": [...]}`

use super::{Collection, CollectionRegistry, StorageError};
use crate::query::Filter;
use crate::values::Document;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub games: Vec<Document>,
    #[serde(default)]
    pub categories: Vec<Document>,
}

impl SeedData {
    pub fn from_json(text: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn documents(&self, collection: Collection) -> &[Document] {
        match collection {
            Collection::Games => &self.games,
            Collection::Categories => &self.categories,
        }
    }

    /// 写入空集合，已有数据的集合跳过；返回写入的文档数
    pub async fn load_into(&self, registry: &CollectionRegistry) -> Result<usize, StorageError> {
        let mut loaded = 0;
        for collection in Collection::ALL {
            let docs = self.documents(collection);
            if docs.is_empty() {
                continue;
            }
            let handle = registry.get(collection)?;
            if handle.count(Filter::all()).await? > 0 {
                info!(%collection, "collection not empty, skipping seed");
                continue;
            }
            for doc in docs {
                handle.insert(doc.clone()).await?;
            }
            info!(%collection, count = docs.len(), "seeded collection");
            loaded += docs.len();
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_only_into_empty_collections() {
        let seed = SeedData::from_json(
            r#"{"games": [{"title": "Snake"}, {"title": "Pong"}], "categories": [{"category": "arcade"}]}"#,
        )
        .unwrap();
        let registry = CollectionRegistry::in_memory();

        assert_eq!(seed.load_into(&registry).await.unwrap(), 3);
        assert_eq!(seed.load_into(&registry).await.unwrap(), 0);
        let games = registry.get(Collection::Games).unwrap();
        assert_eq!(games.count(Filter::all()).await.unwrap(), 2);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let seed = SeedData::from_json(r#"{"games": []}"#).unwrap();
        assert!(seed.categories.is_empty());
        assert!(SeedData::from_json("[1]").is_err());
    }
}
