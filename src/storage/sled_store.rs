use super::{ensure_id, Collection, CollectionStore, StorageError};
use crate::query::{Filter, Update};
use crate::values::document::values_equal;
use crate::values::{Document, ID_FIELD};
use bincode::Options;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// 基于 sled 的集合
///
/// 每个集合一棵树。键是大端序的递增序号，遍历顺序即插入顺序；值是文档的 JSON。
pub struct SledStore {
    tree: sled::Tree,
    next_seq: AtomicU64,
    /// 串行化读-改-写
    write_lock: Mutex<()>,
}

fn key_codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

fn encode_key(seq: u64) -> Result<Vec<u8>, StorageError> {
    Ok(key_codec().serialize(&seq)?)
}

fn decode_key(bytes: &[u8]) -> Result<u64, StorageError> {
    Ok(key_codec().deserialize(bytes)?)
}

impl SledStore {
    /// 在已打开的数据库上打开集合
    pub fn open_tree(db: &sled::Db, collection: Collection) -> Result<Self, StorageError> {
        let tree = db.open_tree(collection.as_str())?;

        // 读取最大序号
        let next_seq = match tree.last()? {
            Some((key, _)) => decode_key(&key)? + 1,
            None => 0,
        };

        Ok(Self {
            tree,
            next_seq: AtomicU64::new(next_seq),
            write_lock: Mutex::new(()),
        })
    }

    /// 打开目录并返回指定集合
    pub fn open<P: AsRef<Path>>(path: P, collection: Collection) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::open_tree(&db, collection)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn entries(&self) -> impl Iterator<Item = Result<(sled::IVec, Document), StorageError>> + '_ {
        self.tree.iter().map(|item| -> Result<(sled::IVec, Document), StorageError> {
            let (key, bytes) = item?;
            let doc: Document = serde_json::from_slice(&bytes)?;
            Ok((key, doc))
        })
    }

    fn first_match(&self, filter: &Filter) -> Result<Option<(sled::IVec, Document)>, StorageError> {
        for entry in self.entries() {
            let (key, doc) = entry?;
            if filter.matches(&doc) {
                return Ok(Some((key, doc)));
            }
        }
        Ok(None)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
        self.write_lock.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl CollectionStore for SledStore {
    fn scan(&self) -> Result<Vec<Document>, StorageError> {
        self.entries().map(|entry| entry.map(|(_, doc)| doc)).collect()
    }

    fn insert(&self, mut doc: Document) -> Result<Document, StorageError> {
        let id = ensure_id(&mut doc);
        let _guard = self.lock()?;

        let new_id = doc.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        for entry in self.entries() {
            let (_, existing) = entry?;
            if existing.get(ID_FIELD).is_some_and(|v| values_equal(v, &new_id)) {
                return Err(StorageError::DuplicateId(id));
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.tree.insert(encode_key(seq)?, serde_json::to_vec(&doc)?)?;
        Ok(doc)
    }

    fn update_one(&self, filter: &Filter, update: &Update) -> Result<Option<Document>, StorageError> {
        let _guard = self.lock()?;
        let Some((key, mut doc)) = self.first_match(filter)? else {
            return Ok(None);
        };
        update.apply(&mut doc)?;
        self.tree.insert(key, serde_json::to_vec(&doc)?)?;
        Ok(Some(doc))
    }

    fn flush(&self) -> Result<usize, StorageError> {
        Ok(self.tree.flush()?)
    }

    fn delete_one(&self, filter: &Filter) -> Result<usize, StorageError> {
        let _guard = self.lock()?;
        match self.first_match(filter)? {
            Some((key, _)) => {
                self.tree.remove(key)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_matches_sequence() {
        let a = encode_key(1).unwrap();
        let b = encode_key(256).unwrap();
        assert!(a < b);
        assert_eq!(decode_key(&b).unwrap(), 256);
    }

    #[test]
    fn test_insert_and_scan_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path(), Collection::Games).unwrap();
        for title in ["a", "b", "c"] {
            store
                .insert(json!({"title": title}).as_object().cloned().unwrap())
                .unwrap();
        }
        let titles: Vec<_> = store.scan().unwrap().iter().map(|d| d["title"].clone()).collect();
        assert_eq!(titles, vec![json!("a"), json!("b"), json!("c")]);
    }
}
