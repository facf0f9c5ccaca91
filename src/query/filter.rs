//! 查询条件
//!
//! 支持文档数据库常用的条件子集：字段相等、比较运算、`$in`/`$nin`、`$exists`、
//! `$regex`、`$size`、`$not` 以及 `$and`/`$or`/`$nor` 组合。

use super::QueryError;
use crate::values::document::{collect_path, compare_values, comparable, values_equal};
use crate::values::Document;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// 解析后的查询条件
#[derive(Debug, Clone)]
pub enum Filter {
    /// 所有子条件都成立；空列表匹配所有文档
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { path: String, cond: Condition },
}

/// 单个字段上的条件
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    Not(Box<Condition>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::And(Vec::new())
    }
}

impl Filter {
    /// 匹配所有文档
    pub fn all() -> Self {
        Self::default()
    }

    /// 字段相等
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Field {
            path: path.into(),
            cond: Condition::Eq(value.into()),
        }
    }

    /// 从 JSON 对象解析
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::InvalidFilter(format!(
                "filter must be an object, got {}",
                value
            )));
        };

        let mut clauses = Vec::new();
        for (key, v) in map {
            match key.as_str() {
                "$and" => clauses.push(Filter::And(parse_list(key, v)?)),
                "$or" => clauses.push(Filter::Or(parse_list(key, v)?)),
                "$nor" => clauses.push(Filter::Nor(parse_list(key, v)?)),
                op if op.starts_with('$') => {
                    return Err(QueryError::InvalidFilter(format!("unknown operator `{}`", op)))
                }
                path => clauses.extend(parse_field(path, v)?),
            }
        }

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Filter::And(clauses))
        }
    }

    /// 判断文档是否满足条件
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
            Filter::Field { path, cond } => cond.matches(&collect_path(doc, path)),
        }
    }
}

fn parse_list(op: &str, value: &Value) -> Result<Vec<Filter>, QueryError> {
    let Value::Array(items) = value else {
        return Err(QueryError::InvalidFilter(format!("`{}` expects an array", op)));
    };
    items.iter().map(Filter::parse).collect()
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_field(path: &str, value: &Value) -> Result<Vec<Filter>, QueryError> {
    let field = |cond| Filter::Field {
        path: path.to_string(),
        cond,
    };

    match value {
        Value::Object(map) if is_operator_object(map) => {
            Ok(parse_operators(map)?.into_iter().map(field).collect())
        }
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => Err(
            QueryError::InvalidFilter(format!("field `{}` mixes operators and values", path)),
        ),
        other => Ok(vec![field(Condition::Eq(other.clone()))]),
    }
}

fn parse_operators(map: &Map<String, Value>) -> Result<Vec<Condition>, QueryError> {
    let mut conds = Vec::new();
    let options = match map.get("$options") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => return Err(QueryError::InvalidFilter("`$options` must be a string".into())),
        None => None,
    };

    for (op, v) in map {
        let cond = match op.as_str() {
            "$eq" => Condition::Eq(v.clone()),
            "$ne" => Condition::Ne(v.clone()),
            "$gt" => Condition::Gt(v.clone()),
            "$gte" => Condition::Gte(v.clone()),
            "$lt" => Condition::Lt(v.clone()),
            "$lte" => Condition::Lte(v.clone()),
            "$in" => Condition::In(expect_array(op, v)?),
            "$nin" => Condition::Nin(expect_array(op, v)?),
            "$exists" => Condition::Exists(truthy(v)),
            "$size" => Condition::Size(
                v.as_u64()
                    .ok_or_else(|| QueryError::InvalidFilter("`$size` expects a non-negative integer".into()))?
                    as usize,
            ),
            "$regex" => Condition::Regex(build_regex(v, options)?),
            "$options" if map.contains_key("$regex") => continue,
            "$not" => match v {
                Value::Object(inner) if is_operator_object(inner) => {
                    let mut inner = parse_operators(inner)?;
                    if inner.len() != 1 {
                        return Err(QueryError::InvalidFilter(
                            "`$not` expects exactly one operator".into(),
                        ));
                    }
                    Condition::Not(Box::new(inner.remove(0)))
                }
                _ => return Err(QueryError::InvalidFilter("`$not` expects an operator object".into())),
            },
            other => {
                return Err(QueryError::InvalidFilter(format!("unknown operator `{}`", other)))
            }
        };
        conds.push(cond);
    }
    Ok(conds)
}

fn expect_array(op: &str, value: &Value) -> Result<Vec<Value>, QueryError> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::InvalidFilter(format!("`{}` expects an array", op)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

fn build_regex(pattern: &Value, options: Option<&str>) -> Result<Regex, QueryError> {
    let Value::String(pattern) = pattern else {
        return Err(QueryError::InvalidFilter("`$regex` expects a string".into()));
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in options.unwrap_or_default().chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(QueryError::InvalidFilter(format!("unknown regex option `{}`", other)))
            }
        };
    }
    builder
        .build()
        .map_err(|e| QueryError::InvalidRegex(e.to_string()))
}

/// 候选值以及数组候选值中的元素
fn leaves<'a>(candidates: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
    candidates.iter().copied().flat_map(|c: &'a Value| {
        let elements = c.as_array().map(|a| a.iter()).into_iter().flatten();
        std::iter::once(c).chain(elements)
    })
}

fn eq_any(candidates: &[&Value], target: &Value) -> bool {
    if target.is_null() && candidates.is_empty() {
        return true;
    }
    leaves(candidates).any(|c| values_equal(c, target))
}

fn cmp_any(candidates: &[&Value], target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    leaves(candidates).any(|c| comparable(c, target) && accept(compare_values(c, target)))
}

impl Condition {
    fn matches(&self, candidates: &[&Value]) -> bool {
        match self {
            Condition::Eq(v) => eq_any(candidates, v),
            Condition::Ne(v) => !eq_any(candidates, v),
            Condition::Gt(v) => cmp_any(candidates, v, |o| o == Ordering::Greater),
            Condition::Gte(v) => cmp_any(candidates, v, |o| o != Ordering::Less),
            Condition::Lt(v) => cmp_any(candidates, v, |o| o == Ordering::Less),
            Condition::Lte(v) => cmp_any(candidates, v, |o| o != Ordering::Greater),
            Condition::In(values) => values.iter().any(|v| eq_any(candidates, v)),
            Condition::Nin(values) => !values.iter().any(|v| eq_any(candidates, v)),
            Condition::Exists(expected) => candidates.is_empty() != *expected,
            Condition::Regex(re) => leaves(candidates).any(|c| c.as_str().is_some_and(|s| re.is_match(s))),
            Condition::Size(n) => candidates
                .iter()
                .any(|c| c.as_array().is_some_and(|a| a.len() == *n)),
            Condition::Not(inner) => !inner.matches(candidates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn matches(filter: Value, d: Value) -> bool {
        Filter::parse(&filter).unwrap().matches(&doc(d))
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches(json!({}), json!({"a": 1})));
    }

    #[test]
    fn test_equality() {
        assert!(matches(json!({"category": "action"}), json!({"category": "action"})));
        assert!(!matches(json!({"category": "action"}), json!({"category": "puzzle"})));
        assert!(matches(json!({"pagelink": "/game/snake"}), json!({"pagelink": "/game/snake", "title": "Snake"})));
    }

    #[test]
    fn test_equality_on_array_field() {
        assert!(matches(json!({"tags": "io"}), json!({"tags": ["hot", "io"]})));
        assert!(matches(json!({"tags.name": "b"}), json!({"tags": [{"name": "a"}, {"name": "b"}]})));
    }

    #[test]
    fn test_null_matches_missing() {
        assert!(matches(json!({"banner": null}), json!({"title": "x"})));
        assert!(!matches(json!({"banner": {"$exists": true}}), json!({"title": "x"})));
        assert!(matches(json!({"banner": {"$exists": false}}), json!({"title": "x"})));
    }

    #[test]
    fn test_comparisons() {
        let d = json!({"size": 10});
        assert!(matches(json!({"size": {"$gt": 5, "$lte": 10}}), d.clone()));
        assert!(!matches(json!({"size": {"$lt": 10}}), d.clone()));
        // 不同类型之间不比较
        assert!(!matches(json!({"size": {"$gt": "5"}}), d));
    }

    #[test]
    fn test_in_and_nin() {
        let d = json!({"category": "action"});
        assert!(matches(json!({"category": {"$in": ["action", "puzzle"]}}), d.clone()));
        assert!(!matches(json!({"category": {"$nin": ["action"]}}), d));
    }

    #[test]
    fn test_keyword_search() {
        let filter = json!({
            "$or": [
                {"title": {"$regex": "snake", "$options": "i"}},
                {"desc": {"$regex": "snake", "$options": "i"}}
            ]
        });
        assert!(matches(filter.clone(), json!({"title": "Classic SNAKE", "desc": ""})));
        assert!(matches(filter.clone(), json!({"title": "Worms", "desc": "like snake"})));
        assert!(!matches(filter, json!({"title": "Tetris", "desc": "blocks"})));
    }

    #[test]
    fn test_nor_and_not() {
        assert!(matches(json!({"$nor": [{"a": 1}, {"b": 2}]}), json!({"a": 3})));
        assert!(matches(json!({"title": {"$not": {"$regex": "^x"}}}), json!({"title": "abc"})));
    }

    #[test]
    fn test_size() {
        assert!(matches(json!({"tags": {"$size": 2}}), json!({"tags": [1, 2]})));
    }

    #[test]
    fn test_invalid_filters() {
        assert!(matches!(Filter::parse(&json!([1])), Err(QueryError::InvalidFilter(_))));
        assert!(matches!(Filter::parse(&json!({"$where": "1"})), Err(QueryError::InvalidFilter(_))));
        assert!(matches!(
            Filter::parse(&json!({"title": {"$regex": "("}})),
            Err(QueryError::InvalidRegex(_))
        ));
        assert!(matches!(
            Filter::parse(&json!({"title": {"$regex": "a", "$options": "q"}})),
            Err(QueryError::InvalidFilter(_))
        ));
    }
}
