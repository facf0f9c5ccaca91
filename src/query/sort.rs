//! 排序规则

use super::QueryError;
use crate::values::document::{compare_values, get_path};
use crate::values::Document;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// 多字段排序，按字段声明顺序依次比较
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    keys: Vec<(String, SortOrder)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Asc));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Desc));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 解析 `{"position": 1, "title": -1}` 或 `"position -title"`
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::String(spec) => Ok(Self::parse_str(spec)),
            Value::Object(map) => Self::parse_object(map),
            other => Err(QueryError::InvalidSort(format!(
                "sort must be an object or a string, got {}",
                other
            ))),
        }
    }

    pub fn parse_str(spec: &str) -> Self {
        let keys = spec
            .split_whitespace()
            .map(|token| match token.strip_prefix('-') {
                Some(field) => (field.to_string(), SortOrder::Desc),
                None => (token.trim_start_matches('+').to_string(), SortOrder::Asc),
            })
            .collect();
        Self { keys }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Self, QueryError> {
        let mut keys = Vec::with_capacity(map.len());
        for (field, dir) in map {
            let order = match dir {
                Value::Number(n) if n.as_i64() == Some(1) => SortOrder::Asc,
                Value::Number(n) if n.as_i64() == Some(-1) => SortOrder::Desc,
                Value::String(s) if s == "asc" || s == "ascending" => SortOrder::Asc,
                Value::String(s) if s == "desc" || s == "descending" => SortOrder::Desc,
                other => {
                    return Err(QueryError::InvalidSort(format!(
                        "invalid direction for `{}`: {}",
                        field, other
                    )))
                }
            };
            keys.push((field.clone(), order));
        }
        Ok(Self { keys })
    }

    /// 比较两个文档，缺失字段按 null 处理（排在最前）
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        static NULL: Value = Value::Null;
        for (field, order) in &self.keys {
            let left = get_path(a, field).unwrap_or(&NULL);
            let right = get_path(b, field).unwrap_or(&NULL);
            let ord = compare_values(left, right);
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// 稳定排序
    pub fn apply(&self, docs: &mut [Document]) {
        if !self.is_empty() {
            docs.sort_by(|a, b| self.compare(a, b));
        }
    }
}
