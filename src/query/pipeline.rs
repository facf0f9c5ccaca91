//! 聚合管道
//!
//! 支持的阶段：`$match` `$sample` `$sort` `$skip` `$limit` `$project` `$count`。

use super::{Filter, Projection, QueryError, Sort};
use crate::values::Document;
use rand::seq::SliceRandom;
use serde_json::{json, Value};

/// 管道阶段
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    /// 随机抽取 n 条
    Sample(usize),
    Sort(Sort),
    Skip(usize),
    Limit(usize),
    Project(Projection),
    /// 输出单个文档 `{<field>: 数量}`
    Count(String),
}

impl Stage {
    fn run(&self, mut docs: Vec<Document>) -> Vec<Document> {
        match self {
            Stage::Match(filter) => {
                docs.retain(|doc| filter.matches(doc));
                docs
            }
            Stage::Sample(size) => {
                let mut rng = rand::thread_rng();
                docs.shuffle(&mut rng);
                docs.truncate(*size);
                docs
            }
            Stage::Sort(sort) => {
                sort.apply(&mut docs);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Project(projection) => docs.iter().map(|doc| projection.apply(doc)).collect(),
            Stage::Count(field) => {
                let mut out = Document::new();
                out.insert(field.clone(), json!(docs.len()));
                vec![out]
            }
        }
    }
}

/// 聚合管道
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只有一个 `$sample` 阶段的管道
    pub fn sample(size: usize) -> Self {
        Self::new().stage(Stage::Sample(size))
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// 解析 `[{"$match": {...}}, {"$sample": {"size": 20}}]`
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let Value::Array(items) = value else {
            return Err(QueryError::InvalidPipeline("pipeline must be an array".into()));
        };

        let mut stages = Vec::with_capacity(items.len());
        for item in items {
            let stage = match item.as_object() {
                Some(map) if map.len() == 1 => map.iter().next(),
                _ => None,
            };
            let Some((name, arg)) = stage else {
                return Err(QueryError::InvalidPipeline(format!(
                    "each stage must have exactly one operator, got {}",
                    item
                )));
            };
            stages.push(parse_stage(name, arg)?);
        }
        Ok(Self { stages })
    }

    /// 在给定文档上执行
    pub fn run(&self, docs: Vec<Document>) -> Vec<Document> {
        self.stages
            .iter()
            .fold(docs, |docs, stage| stage.run(docs))
    }
}

fn parse_stage(name: &str, arg: &Value) -> Result<Stage, QueryError> {
    let count = |what: &str| {
        arg.as_u64().map(|n| n as usize).ok_or_else(|| {
            QueryError::InvalidPipeline(format!("`{}` expects a non-negative integer", what))
        })
    };

    match name {
        "$match" => Ok(Stage::Match(Filter::parse(arg)?)),
        "$sample" => arg
            .get("size")
            .and_then(Value::as_u64)
            .map(|n| Stage::Sample(n as usize))
            .ok_or_else(|| QueryError::InvalidPipeline("`$sample` expects {size: n}".into())),
        "$sort" => Ok(Stage::Sort(Sort::parse(arg)?)),
        "$skip" => Ok(Stage::Skip(count(name)?)),
        "$limit" => match count(name)? {
            0 => Err(QueryError::InvalidPipeline("`$limit` must be positive".into())),
            n => Ok(Stage::Limit(n)),
        },
        "$project" => Ok(Stage::Project(Projection::parse(arg)?)),
        "$count" => match arg.as_str() {
            Some(field) if !field.is_empty() && !field.starts_with('$') => {
                Ok(Stage::Count(field.to_string()))
            }
            _ => Err(QueryError::InvalidPipeline(
                "`$count` expects a non-empty field name".into(),
            )),
        },
        other => Err(QueryError::InvalidPipeline(format!("unsupported stage `{}`", other))),
    }
}
