use super::{ensure_id, CollectionStore, StorageError};
use crate::query::{Filter, FindQuery, Update};
use crate::values::document::values_equal;
use crate::values::{Document, ID_FIELD};
use serde_json::Value;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 内存集合，按插入顺序保存文档
#[derive(Default)]
pub struct MemStore {
    docs: RwLock<Vec<Document>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已有文档创建，缺少 `_id` 的会被补齐
    pub fn with_documents(docs: Vec<Document>) -> Result<Self, StorageError> {
        let store = Self::new();
        for doc in docs {
            store.insert(doc)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Document>>, StorageError> {
        self.docs.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Document>>, StorageError> {
        self.docs.write().map_err(|_| StorageError::Poisoned)
    }
}

impl CollectionStore for MemStore {
    fn scan(&self) -> Result<Vec<Document>, StorageError> {
        Ok(self.read()?.clone())
    }

    fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StorageError> {
        Ok(query.execute(self.read()?.iter()))
    }

    fn count(&self, filter: &Filter) -> Result<usize, StorageError> {
        Ok(self.read()?.iter().filter(|doc| filter.matches(doc)).count())
    }

    fn insert(&self, mut doc: Document) -> Result<Document, StorageError> {
        let id = ensure_id(&mut doc);
        let mut docs = self.write()?;
        let new_id = doc.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        if docs
            .iter()
            .any(|existing| existing.get(ID_FIELD).is_some_and(|v| values_equal(v, &new_id)))
        {
            return Err(StorageError::DuplicateId(id));
        }
        docs.push(doc.clone());
        Ok(doc)
    }

    fn update_one(&self, filter: &Filter, update: &Update) -> Result<Option<Document>, StorageError> {
        let mut docs = self.write()?;
        let Some(slot) = docs.iter_mut().find(|doc| filter.matches(doc)) else {
            return Ok(None);
        };
        let mut updated = slot.clone();
        update.apply(&mut updated)?;
        *slot = updated.clone();
        Ok(Some(updated))
    }

    fn delete_one(&self, filter: &Filter) -> Result<usize, StorageError> {
        let mut docs = self.write()?;
        match docs.iter().position(|doc| filter.matches(doc)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Projection, Sort};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn store() -> MemStore {
        MemStore::with_documents(vec![
            doc(json!({"_id": "1", "title": "Snake", "category": "arcade", "position": "2"})),
            doc(json!({"_id": "2", "title": "Chess", "category": "board", "position": "1"})),
            doc(json!({"_id": "3", "title": "Pong", "category": "arcade", "position": "3"})),
        ])
        .unwrap()
    }

    #[test]
    fn test_find_with_query() {
        let store = store();
        let query = FindQuery::new(Filter::eq("category", "arcade"))
            .sort(Sort::new().desc("position"))
            .project(Projection::include(["title"]));
        let found = store.find(&query).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["title"], json!("Pong"));
        assert!(!found[0].contains_key("category"));
    }

    #[test]
    fn test_find_one() {
        let store = store();
        let found = store.find_one(&FindQuery::new(Filter::eq("title", "Chess"))).unwrap();
        assert_eq!(found.unwrap()["_id"], json!("2"));
        assert!(store.find_one(&FindQuery::new(Filter::eq("title", "Go"))).unwrap().is_none());
    }

    #[test]
    fn test_insert_assigns_id_and_rejects_duplicates() {
        let store = store();
        let inserted = store.insert(doc(json!({"title": "Tetris"}))).unwrap();
        assert!(inserted["_id"].is_string());
        assert_eq!(store.len(), 4);

        let err = store.insert(doc(json!({"_id": "1", "title": "Again"}))).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId(id) if id == "1"));
    }

    #[test]
    fn test_update_and_delete() {
        let store = store();
        let update = Update::parse(&json!({"$set": {"title": "Snake II"}})).unwrap();
        let updated = store.update_one(&Filter::eq("_id", "1"), &update).unwrap().unwrap();
        assert_eq!(updated["title"], json!("Snake II"));
        assert_eq!(store.count(&Filter::eq("title", "Snake II")).unwrap(), 1);

        assert!(store.update_one(&Filter::eq("_id", "9"), &update).unwrap().is_none());

        assert_eq!(store.delete_one(&Filter::eq("category", "arcade")).unwrap(), 1);
        assert_eq!(store.delete_one(&Filter::eq("_id", "9")).unwrap(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failed_update_leaves_document_untouched() {
        let store = store();
        let update = Update::parse(&json!({"$set": {"title": "x"}, "$inc": {"category": 1}})).unwrap();
        assert!(store.update_one(&Filter::eq("_id", "1"), &update).is_err());
        let found = store.find_one(&FindQuery::new(Filter::eq("_id", "1"))).unwrap().unwrap();
        assert_eq!(found["title"], json!("Snake"));
    }
}
