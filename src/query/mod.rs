//! 文档查询模块
//!
//! 条件、投影、排序、聚合管道、更新运算符和关联填充。
//! 这里只做纯内存计算，I/O 由 [`crate::storage`] 负责。

pub mod filter;
pub mod pipeline;
pub mod populate;
pub mod projection;
pub mod sort;
pub mod update;

pub use filter::{Condition, Filter};
pub use pipeline::{Pipeline, Stage};
pub use populate::Populate;
pub use projection::{Projection, Slice};
pub use sort::{Sort, SortOrder};
pub use update::Update;

use crate::values::Document;

/// 查询解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
    #[error("invalid projection: {0}")]
    InvalidProjection(String),
    #[error("invalid sort: {0}")]
    InvalidSort(String),
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
    #[error("invalid update: {0}")]
    InvalidUpdate(String),
    #[error("invalid populate: {0}")]
    InvalidPopulate(String),
}

/// 查找请求：条件 + 投影 + 排序 + 分页
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: Option<Sort>,
    pub skip: usize,
    /// `None` 或 `Some(0)` 表示不限制
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// 匹配全部文档
    pub fn all() -> Self {
        Self::default()
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 依次执行：过滤、排序、跳过、截取、投影
    pub fn execute<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut matched: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.filter.matches(doc))
            .cloned()
            .collect();

        if let Some(sort) = &self.sort {
            sort.apply(&mut matched);
        }

        let limit = self.limit.filter(|n| *n > 0).unwrap_or(usize::MAX);
        matched
            .into_iter()
            .skip(self.skip)
            .take(limit)
            .map(|doc| match &self.projection {
                Some(projection) => projection.apply(&doc),
                None => doc,
            })
            .collect()
    }
}
