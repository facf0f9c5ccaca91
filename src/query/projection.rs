//! 字段投影
//!
//! 两种写法等价：`{"title": 1, "thumb": 1}` 和 `"title thumb"`；
//! 排除字段用 `0` 或 `-` 前缀。数组字段可以用 `{"$slice": n}` 或 `{"$slice": [skip, limit]}` 截取。

use super::QueryError;
use crate::values::document::{get_path_mut, remove_path};
use crate::values::{Document, ID_FIELD};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Include,
    Exclude,
}

/// 数组截取
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    /// 正数取前 n 个，负数取后 n 个
    Count(i64),
    /// 跳过 `skip` 个（负数从末尾算起）后取 `limit` 个
    Range(i64, usize),
}

impl Slice {
    fn apply(&self, items: &mut Vec<Value>) {
        let len = items.len();
        let (start, end) = match *self {
            Slice::Count(n) if n >= 0 => (0, clamp_len(n.unsigned_abs()).min(len)),
            Slice::Count(n) => (len.saturating_sub(clamp_len(n.unsigned_abs())), len),
            Slice::Range(skip, limit) => {
                let start = if skip >= 0 {
                    clamp_len(skip.unsigned_abs()).min(len)
                } else {
                    len.saturating_sub(clamp_len(skip.unsigned_abs()))
                };
                (start, start.saturating_add(limit).min(len))
            }
        };
        items.truncate(end);
        items.drain(..start);
    }

    fn to_value(self) -> Value {
        match self {
            Slice::Count(n) => json!(n),
            Slice::Range(skip, limit) => json!([skip, limit]),
        }
    }
}

fn clamp_len(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// 字段投影
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    mode: Mode,
    fields: Vec<String>,
    /// `_id` 的显式设置
    id: Option<bool>,
    slices: Vec<(String, Slice)>,
}

impl Projection {
    /// 只保留指定字段（以及 `_id`）
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: Mode::Include,
            fields: fields.into_iter().map(Into::into).collect(),
            id: None,
            slices: Vec::new(),
        }
    }

    /// 去掉指定字段
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: Mode::Exclude,
            fields: fields.into_iter().map(Into::into).collect(),
            id: None,
            slices: Vec::new(),
        }
    }

    /// 截取数组字段
    pub fn slice(mut self, path: impl Into<String>, slice: Slice) -> Self {
        self.slices.push((path.into(), slice));
        self
    }

    /// 从 JSON 解析，接受对象或空格分隔的字符串
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::String(s) => Self::parse_str(s),
            Value::Object(map) => Self::parse_object(map),
            other => Err(QueryError::InvalidProjection(format!(
                "projection must be an object or a string, got {}",
                other
            ))),
        }
    }

    /// 解析 `"title thumb -_id"` 形式
    pub fn parse_str(spec: &str) -> Result<Self, QueryError> {
        let mut map = Map::new();
        for token in spec.split_whitespace() {
            match token.strip_prefix('-') {
                Some(field) => map.insert(field.to_string(), json!(0)),
                None => map.insert(token.trim_start_matches('+').to_string(), json!(1)),
            };
        }
        Self::parse_object(&map)
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Self, QueryError> {
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut id = None;
        let mut slices = Vec::new();

        for (field, spec) in map {
            if let Value::Object(op) = spec {
                let slice = op.get("$slice").ok_or_else(|| {
                    QueryError::InvalidProjection(format!("unsupported projection for `{}`", field))
                })?;
                slices.push((field.clone(), parse_slice(field, slice)?));
                continue;
            }

            let keep = match spec {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                other => {
                    return Err(QueryError::InvalidProjection(format!(
                        "invalid projection value for `{}`: {}",
                        field, other
                    )))
                }
            };

            if field == ID_FIELD {
                id = Some(keep);
            } else if keep {
                included.push(field.clone());
            } else {
                excluded.push(field.clone());
            }
        }

        if !included.is_empty() && !excluded.is_empty() {
            return Err(QueryError::InvalidProjection(
                "cannot mix inclusion and exclusion".into(),
            ));
        }

        // 只有 `{"_id": 1}` 时只返回 `_id`
        let (mode, fields) = if included.is_empty() && excluded.is_empty() && id == Some(true) {
            (Mode::Include, included)
        } else if included.is_empty() {
            (Mode::Exclude, excluded)
        } else {
            (Mode::Include, included)
        };
        Ok(Self {
            mode,
            fields,
            id,
            slices,
        })
    }

    /// 对文档应用投影
    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = match self.mode {
            Mode::Include => {
                let mut paths = self.fields.clone();
                paths.extend(self.slices.iter().map(|(p, _)| p.clone()));
                if self.id != Some(false) {
                    paths.push(ID_FIELD.to_string());
                }
                include_paths(doc, &paths)
            }
            Mode::Exclude => {
                let mut out = doc.clone();
                for field in &self.fields {
                    remove_path(&mut out, field);
                }
                if self.id == Some(false) {
                    out.shift_remove(ID_FIELD);
                }
                out
            }
        };

        for (path, slice) in &self.slices {
            if let Some(Value::Array(items)) = get_path_mut(&mut out, path) {
                slice.apply(items);
            }
        }
        out
    }

    /// 规范化的 JSON 形式，用于生成缓存键
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        let flag = if self.mode == Mode::Include { 1 } else { 0 };
        for field in &self.fields {
            map.insert(field.clone(), json!(flag));
        }
        if let Some(keep) = self.id {
            map.insert(ID_FIELD.to_string(), json!(u8::from(keep)));
        }
        for (path, slice) in &self.slices {
            map.insert(path.clone(), json!({ "$slice": slice.to_value() }));
        }
        Value::Object(map)
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn parse_slice(field: &str, value: &Value) -> Result<Slice, QueryError> {
    let invalid = || QueryError::InvalidProjection(format!("invalid `$slice` for `{}`", field));
    match value {
        Value::Number(n) => n.as_i64().map(Slice::Count).ok_or_else(invalid),
        Value::Array(pair) if pair.len() == 2 => {
            let skip = pair[0].as_i64().ok_or_else(invalid)?;
            let limit = pair[1].as_u64().filter(|l| *l > 0).ok_or_else(invalid)?;
            Ok(Slice::Range(skip, clamp_len(limit)))
        }
        _ => Err(invalid()),
    }
}

/// 按文档原有字段顺序保留指定路径
fn include_paths(doc: &Document, paths: &[String]) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        if paths.iter().any(|p| p == key) {
            out.insert(key.clone(), value.clone());
            continue;
        }

        let nested: Vec<String> = paths
            .iter()
            .filter_map(|p| p.strip_prefix(key.as_str())?.strip_prefix('.'))
            .map(str::to_string)
            .collect();
        if nested.is_empty() {
            continue;
        }
        if let Value::Object(sub) = value {
            let projected = include_paths(sub, &nested);
            if !projected.is_empty() {
                out.insert(key.clone(), Value::Object(projected));
            }
        }
    }
    out
}
