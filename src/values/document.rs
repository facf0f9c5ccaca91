//! 文档模型
//!
//! 文档就是 JSON 对象。这里提供点分路径访问、值比较和 `_id` 生成。

use rand::RngCore;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

/// 文档
pub type Document = Map<String, Value>;

/// 主键字段名
pub const ID_FIELD: &str = "_id";

/// 按点分路径取值，数字段可以索引数组，例如 `tags.0`
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// 按点分路径收集所有候选值
///
/// 路径穿过数组时会展开到每个元素，与文档数据库的查询语义一致：
/// `{"tags": [{"name": "a"}, {"name": "b"}]}` 在 `tags.name` 上得到 `"a"` 和 `"b"`。
pub fn collect_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = doc.get(segments[0]) {
        collect_segments(first, &segments[1..], &mut out);
    }
    out
}

fn collect_segments<'a>(value: &'a Value, rest: &[&str], out: &mut Vec<&'a Value>) {
    let Some((segment, tail)) = rest.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(next) = map.get(*segment) {
                collect_segments(next, tail, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect_segments(next, tail, out);
                }
            } else {
                for item in items {
                    collect_segments(item, rest, out);
                }
            }
        }
        _ => {}
    }
}

/// 按点分路径写入，缺失的中间对象会被创建
///
/// 中间节点不是对象时返回 `false`。
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> bool {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
            true
        }
        Some((head, tail)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match child {
                Value::Object(map) => set_path(map, tail, value),
                _ => false,
            }
        }
    }
}

/// 按点分路径取可变引用
pub fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    match path.split_once('.') {
        None => doc.get_mut(path),
        Some((head, tail)) => match doc.get_mut(head)? {
            Value::Object(map) => get_path_mut(map, tail),
            _ => None,
        },
    }
}

/// 按点分路径删除，返回被删除的值
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.shift_remove(path),
        Some((head, tail)) => match doc.get_mut(head)? {
            Value::Object(map) => remove_path(map, tail),
            _ => None,
        },
    }
}

/// 值相等比较，整数与浮点数按数值比较
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// 两个值是否属于同一可比较类型（范围查询只在同类型之间生效）
pub fn comparable(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

/// 全序比较：先按类型排序（null < 数字 < 字符串 < 对象 < 数组 < 布尔），同类型再比较值
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (a, b) in x.iter().zip(y) {
                let ord = compare_values(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y) {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

static OBJECT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// 生成 24 位十六进制的文档 ID：4 字节秒级时间戳 + 5 字节随机数 + 3 字节计数器
pub fn new_object_id() -> String {
    let seconds = chrono::Utc::now().timestamp() as u32;
    let mut random = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut random);
    let counter = OBJECT_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed) & 0x00ff_ffff;

    let mut id = String::with_capacity(24);
    id.push_str(&format!("{:08x}", seconds));
    for byte in random {
        id.push_str(&format!("{:02x}", byte));
    }
    id.push_str(&format!("{:06x}", counter));
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_get_path() {
        let d = doc(json!({"meta": {"size": 3}, "tags": ["a", "b"]}));
        assert_eq!(get_path(&d, "meta.size"), Some(&json!(3)));
        assert_eq!(get_path(&d, "tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&d, "meta.missing"), None);
    }

    #[test]
    fn test_collect_path_through_arrays() {
        let d = doc(json!({"tags": [{"name": "a"}, {"name": "b"}, {"other": 1}]}));
        let found = collect_path(&d, "tags.name");
        assert_eq!(found, vec![&json!("a"), &json!("b")]);
    }

    #[test]
    fn test_set_and_remove_path() {
        let mut d = Document::new();
        assert!(set_path(&mut d, "meta.size", json!(10)));
        assert_eq!(get_path(&d, "meta.size"), Some(&json!(10)));

        assert_eq!(remove_path(&mut d, "meta.size"), Some(json!(10)));
        assert_eq!(get_path(&d, "meta.size"), None);

        d.insert("title".into(), json!("x"));
        assert!(!set_path(&mut d, "title.sub", json!(1)));
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
    }

    #[test]
    fn test_compare_values_type_order() {
        assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(10), &json!(9.5)), Ordering::Greater);
        assert_eq!(compare_values(&json!("10"), &json!("9")), Ordering::Less);
        assert_eq!(compare_values(&json!(5), &json!("a")), Ordering::Less);
    }

    #[test]
    fn test_object_id_format() {
        let a = new_object_id();
        let b = new_object_id();
        assert_eq!(a.len(), 24);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
