//! 关联填充
//!
//! 把文档中 `path` 处保存的引用 id（单个值或数组）替换为 `from` 集合中 `_id` 相同的文档。
//! 这里只负责收集 id 和回填结果，读取目标集合由服务层完成。

use super::{Condition, Filter, Projection, QueryError};
use crate::storage::Collection;
use crate::values::document::{collect_path, get_path_mut};
use crate::values::{Document, ID_FIELD};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// 填充描述
#[derive(Debug, Clone)]
pub struct Populate {
    pub path: String,
    pub from: Collection,
    pub select: Option<Projection>,
    /// 对被填充的文档继续填充
    pub populate: Vec<Populate>,
}

impl Populate {
    pub fn new(path: impl Into<String>, from: Collection) -> Self {
        Self {
            path: path.into(),
            from,
            select: None,
            populate: Vec::new(),
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }

    pub fn nested(mut self, inner: Populate) -> Self {
        self.populate.push(inner);
        self
    }

    /// 解析单个对象或对象数组：`{"path", "from", "select"?, "populate"?}`
    pub fn parse(value: &Value) -> Result<Vec<Self>, QueryError> {
        match value {
            Value::Array(items) => items.iter().map(Self::parse_one).collect(),
            Value::Object(_) => Ok(vec![Self::parse_one(value)?]),
            other => Err(QueryError::InvalidPopulate(format!(
                "populate must be an object or an array, got {}",
                other
            ))),
        }
    }

    fn parse_one(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::InvalidPopulate(format!("expected an object, got {}", value)));
        };

        let path = map
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| QueryError::InvalidPopulate("missing `path`".into()))?;
        let from = map
            .get("from")
            .or_else(|| map.get("model"))
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::InvalidPopulate(format!("missing `from` for `{}`", path)))?
            .parse::<Collection>()
            .map_err(|e| QueryError::InvalidPopulate(e.to_string()))?;

        let select = map.get("select").map(Projection::parse).transpose()?;
        let populate = match map.get("populate") {
            Some(inner) => Self::parse(inner)?,
            None => Vec::new(),
        };

        Ok(Self {
            path: path.to_string(),
            from,
            select,
            populate,
        })
    }

    /// 文档中引用的 id，去重并保持首次出现的顺序
    pub fn reference_ids(&self, docs: &[Document]) -> Vec<Value> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for doc in docs {
            for value in collect_path(doc, &self.path) {
                let refs: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                for id in refs {
                    if !id.is_null() && seen.insert(id_key(id)) {
                        ids.push(id.clone());
                    }
                }
            }
        }
        ids
    }

    /// 读取目标文档所用的条件
    pub fn target_filter(&self, ids: Vec<Value>) -> Filter {
        Filter::Field {
            path: ID_FIELD.to_string(),
            cond: Condition::In(ids),
        }
    }

    /// 用目标文档替换引用
    ///
    /// 找不到的单值引用变为 `null`，数组中找不到的元素被丢弃。
    pub fn attach(&self, docs: &mut [Document], targets: Vec<Document>) {
        let by_id: HashMap<String, Value> = targets
            .into_iter()
            .filter_map(|doc| {
                let key = id_key(doc.get(ID_FIELD)?);
                let doc = match &self.select {
                    Some(projection) => projection.apply(&doc),
                    None => doc,
                };
                Some((key, Value::Object(doc)))
            })
            .collect();

        for doc in docs.iter_mut() {
            let Some(slot) = get_path_mut(doc, &self.path) else {
                continue;
            };
            let replaced = match &*slot {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .filter_map(|id| by_id.get(&id_key(id)).cloned())
                        .collect(),
                ),
                Value::Null => Value::Null,
                id => by_id.get(&id_key(id)).cloned().unwrap_or(Value::Null),
            };
            *slot = replaced;
        }
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(value: Value) -> Vec<Document> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_parse_nested() {
        let specs = Populate::parse(&json!({
            "path": "related",
            "from": "games",
            "select": "title thumb",
            "populate": {"path": "categoryRef", "model": "categories"}
        }))
        .unwrap();

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].from, Collection::Games);
        assert!(specs[0].select.is_some());
        assert_eq!(specs[0].populate[0].from, Collection::Categories);
    }

    #[test]
    fn test_parse_rejects_unknown_collection() {
        let err = Populate::parse(&json!({"path": "x", "from": "users"})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPopulate(_)));
        assert!(Populate::parse(&json!({"from": "games"})).is_err());
    }

    #[test]
    fn test_reference_ids_deduplicated() {
        let list = docs(json!([
            {"related": ["a", "b"]},
            {"related": ["b", "c"]},
            {"related": null},
            {"other": 1}
        ]));
        let spec = Populate::new("related", Collection::Games);
        assert_eq!(spec.reference_ids(&list), vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_attach_scalar_and_array() {
        let mut list = docs(json!([
            {"_id": "g1", "related": ["g2", "missing", "g3"], "best": "g2"},
            {"_id": "g4", "best": "missing"}
        ]));
        let targets = docs(json!([
            {"_id": "g2", "title": "Two", "desc": "..."},
            {"_id": "g3", "title": "Three", "desc": "..."}
        ]));

        let related = Populate::new("related", Collection::Games)
            .select(Projection::include(["title"]));
        related.attach(&mut list, targets.clone());
        assert_eq!(
            Value::Array(list[0]["related"].as_array().unwrap().clone()),
            json!([{"_id": "g2", "title": "Two"}, {"_id": "g3", "title": "Three"}])
        );

        Populate::new("best", Collection::Games).attach(&mut list, targets);
        assert_eq!(list[0]["best"]["title"], json!("Two"));
        assert_eq!(list[1]["best"], Value::Null);
    }
}
