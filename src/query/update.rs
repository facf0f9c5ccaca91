//! 更新运算符
//!
//! `$set` `$unset` `$inc` `$push` `$addToSet` `$pull`；不含运算符的文档视为整体替换（保留 `_id`）。

use super::QueryError;
use crate::values::document::{get_path_mut, remove_path, set_path, values_equal};
use crate::values::{Document, ID_FIELD};
use serde_json::{Number, Value};

/// 单字段更新运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Set,
    Unset,
    Inc,
    Push,
    AddToSet,
    Pull,
}

impl UpdateOp {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "$set" => UpdateOp::Set,
            "$unset" => UpdateOp::Unset,
            "$inc" => UpdateOp::Inc,
            "$push" => UpdateOp::Push,
            "$addToSet" => UpdateOp::AddToSet,
            "$pull" => UpdateOp::Pull,
            _ => return None,
        })
    }
}

/// 更新描述
#[derive(Debug, Clone)]
pub enum Update {
    /// 整体替换，`_id` 不变
    Replace(Document),
    /// 按字段修改
    Modify(Vec<(UpdateOp, String, Value)>),
}

impl Update {
    /// 等价于 `{"$set": fields}`
    pub fn set(fields: Document) -> Self {
        Update::Modify(
            fields
                .into_iter()
                .map(|(path, value)| (UpdateOp::Set, path, value))
                .collect(),
        )
    }

    /// 等价于 `{"$addToSet": fields}`
    pub fn add_to_set(fields: Document) -> Self {
        Update::Modify(
            fields
                .into_iter()
                .map(|(path, value)| (UpdateOp::AddToSet, path, value))
                .collect(),
        )
    }

    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::InvalidUpdate(format!(
                "update must be an object, got {}",
                value
            )));
        };

        let operators = map.keys().filter(|k| k.starts_with('$')).count();
        if operators == 0 {
            return Ok(Update::Replace(map.clone()));
        }
        if operators != map.len() {
            return Err(QueryError::InvalidUpdate(
                "cannot mix update operators and plain fields".into(),
            ));
        }

        let mut changes = Vec::new();
        for (name, fields) in map {
            let op = UpdateOp::parse(name)
                .ok_or_else(|| QueryError::InvalidUpdate(format!("unknown operator `{}`", name)))?;
            let Value::Object(fields) = fields else {
                return Err(QueryError::InvalidUpdate(format!("`{}` expects an object", name)));
            };
            for (path, arg) in fields {
                changes.push((op, path.clone(), arg.clone()));
            }
        }
        Ok(Update::Modify(changes))
    }

    /// 应用到文档；失败时文档可能已被部分修改，调用方应在副本上执行
    pub fn apply(&self, doc: &mut Document) -> Result<(), QueryError> {
        match self {
            Update::Replace(fields) => {
                let id = doc.get(ID_FIELD).cloned();
                if let (Some(old), Some(new)) = (&id, fields.get(ID_FIELD)) {
                    check_id_unchanged(old, new)?;
                }
                doc.clear();
                if let Some(id) = id {
                    doc.insert(ID_FIELD.to_string(), id);
                }
                for (k, v) in fields {
                    if k != ID_FIELD {
                        doc.insert(k.clone(), v.clone());
                    }
                }
                Ok(())
            }
            Update::Modify(changes) => {
                for (op, path, arg) in changes {
                    apply_one(doc, *op, path, arg)?;
                }
                Ok(())
            }
        }
    }
}

fn check_id_unchanged(old: &Value, new: &Value) -> Result<(), QueryError> {
    if values_equal(old, new) {
        Ok(())
    } else {
        Err(QueryError::InvalidUpdate("`_id` is immutable".into()))
    }
}

fn apply_one(doc: &mut Document, op: UpdateOp, path: &str, arg: &Value) -> Result<(), QueryError> {
    if path == ID_FIELD {
        return match (op, doc.get(ID_FIELD)) {
            (UpdateOp::Set, Some(old)) => check_id_unchanged(old, arg),
            (UpdateOp::Set, None) => {
                doc.insert(ID_FIELD.to_string(), arg.clone());
                Ok(())
            }
            _ => Err(QueryError::InvalidUpdate("`_id` is immutable".into())),
        };
    }

    match op {
        UpdateOp::Set => {
            if set_path(doc, path, arg.clone()) {
                Ok(())
            } else {
                Err(QueryError::InvalidUpdate(format!("cannot set `{}`", path)))
            }
        }
        UpdateOp::Unset => {
            remove_path(doc, path);
            Ok(())
        }
        UpdateOp::Inc => increment(doc, path, arg),
        UpdateOp::Push => {
            let items = array_at(doc, path)?;
            items.extend(each(arg));
            Ok(())
        }
        UpdateOp::AddToSet => {
            let items = array_at(doc, path)?;
            for value in each(arg) {
                if !items.iter().any(|existing| values_equal(existing, &value)) {
                    items.push(value);
                }
            }
            Ok(())
        }
        UpdateOp::Pull => match get_path_mut(doc, path) {
            None => Ok(()),
            Some(Value::Array(items)) => {
                items.retain(|existing| !values_equal(existing, arg));
                Ok(())
            }
            Some(_) => Err(QueryError::InvalidUpdate(format!("`{}` is not an array", path))),
        },
    }
}

/// `{"$each": [...]}` 展开为多个值，否则就是单个值
fn each(arg: &Value) -> Vec<Value> {
    match arg.get("$each") {
        Some(Value::Array(items)) => items.clone(),
        _ => vec![arg.clone()],
    }
}

fn array_at<'a>(doc: &'a mut Document, path: &str) -> Result<&'a mut Vec<Value>, QueryError> {
    if get_path_mut(doc, path).is_none() && !set_path(doc, path, Value::Array(Vec::new())) {
        return Err(QueryError::InvalidUpdate(format!("cannot create array at `{}`", path)));
    }
    match get_path_mut(doc, path) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(QueryError::InvalidUpdate(format!("`{}` is not an array", path))),
    }
}

fn increment(doc: &mut Document, path: &str, arg: &Value) -> Result<(), QueryError> {
    let Value::Number(delta) = arg else {
        return Err(QueryError::InvalidUpdate(format!("`$inc` on `{}` expects a number", path)));
    };

    match get_path_mut(doc, path) {
        Some(Value::Number(current)) => {
            *current = add_numbers(current, delta)?;
            Ok(())
        }
        Some(_) => Err(QueryError::InvalidUpdate(format!("`{}` is not a number", path))),
        None => {
            if set_path(doc, path, arg.clone()) {
                Ok(())
            } else {
                Err(QueryError::InvalidUpdate(format!("cannot set `{}`", path)))
            }
        }
    }
}

fn add_numbers(a: &Number, b: &Number) -> Result<Number, QueryError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Ok(Number::from(sum));
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).ok_or_else(|| QueryError::InvalidUpdate("`$inc` overflowed".into()))
}
