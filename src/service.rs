//! 目录服务
//!
//! 通用查询门面：按 (操作, 集合, 参数) 生成缓存键，并以操作对应的 TTL 委托给
//! [`CacheAside`]。只有高频、低基数的查询走缓存（全量列表、随机抽样、条件查询、
//! 单条查询）；关联填充、截取、分页和聚合每次都直接访问存储。
//!
//! 写操作直接落到存储，不做缓存失效，已缓存的读结果在 TTL 到期前可能是旧的。

use crate::cache::{CacheAside, CacheKey, Cacheable, KeyError, Operation, TtlPolicy};
use crate::query::{Filter, FindQuery, Pipeline, Populate, Projection, QueryError, Sort, Update};
use crate::storage::{AsyncCollection, Collection, CollectionRegistry, StorageError};
use crate::values::Document;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// 全量列表的最大条数
pub const ALL_LIMIT: usize = 150;

/// 随机抽样的条数
pub const SAMPLE_SIZE: usize = 20;

/// 组合页面数据的缓存键
pub const PAGE_DATA_KEY: &str = "404_page_data";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("not found")]
    NotFound,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Key(_) | ServiceError::Query(_) => StatusCode::BAD_REQUEST,
            ServiceError::Storage(StorageError::Query(_))
            | ServiceError::Storage(StorageError::UnknownCollection(_))
            | ServiceError::Storage(StorageError::DuplicateId(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<ServiceError> for (StatusCode, String) {
    fn from(err: ServiceError) -> Self {
        (err.status(), err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (code, message): (StatusCode, String) = self.into();
        let body = Json(json!({ "status": code.as_u16(), "message": message }));
        (code, body).into_response()
    }
}

/// 首页、游戏页和 404 页共用的列表数据
#[derive(Debug, Clone, Serialize)]
pub struct PageData {
    pub games: Arc<Vec<Document>>,
    pub categories: Arc<Vec<Document>>,
}

impl Cacheable for PageData {
    fn approximate_size(&self) -> usize {
        self.games.approximate_size() + self.categories.approximate_size()
    }
}

/// 目录服务
#[derive(Clone)]
pub struct CatalogService {
    cache: CacheAside,
    registry: CollectionRegistry,
    ttl: TtlPolicy,
}

impl CatalogService {
    pub fn new(cache: CacheAside, registry: CollectionRegistry) -> Self {
        let ttl = cache.store().config().ttl;
        Self {
            cache,
            registry,
            ttl,
        }
    }

    pub fn cache(&self) -> &CacheAside {
        &self.cache
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    fn handle(&self, collection: Collection) -> Result<AsyncCollection, ServiceError> {
        Ok(self.registry.get(collection)?.clone())
    }

    // ========== 缓存查询 ==========

    /// 全量列表，按 `position` 升序，最多 [`ALL_LIMIT`] 条
    ///
    /// 键为 `all_<集合>_full` 或 `all_<集合>_<规范化投影>`。
    pub async fn all(
        &self,
        collection: Collection,
        select: Option<&Projection>,
    ) -> Result<Arc<Vec<Document>>, ServiceError> {
        let key = match select {
            Some(projection) => CacheKey::with_params(Operation::All, collection, projection)?,
            None => CacheKey::with_tag(Operation::All, collection, "full"),
        };
        let handle = self.handle(collection)?;

        let mut query = FindQuery::all().sort(Sort::new().asc("position")).limit(ALL_LIMIT);
        if let Some(projection) = select {
            query = query.project(projection.clone());
        }

        self.cache
            .get_or_set(
                key.as_str(),
                || async move { handle.find(query).await.map_err(ServiceError::from) },
                Some(self.ttl.stable),
            )
            .await
    }

    /// 随机抽取 [`SAMPLE_SIZE`] 条，每次未命中重新抽样
    pub async fn topsix(&self, collection: Collection) -> Result<Arc<Vec<Document>>, ServiceError> {
        let key = CacheKey::new(Operation::TopSix, collection);
        let handle = self.handle(collection)?;

        self.cache
            .get_or_set(
                key.as_str(),
                || async move {
                    handle
                        .aggregate(Pipeline::sample(SAMPLE_SIZE))
                        .await
                        .map_err(ServiceError::from)
                },
                Some(self.ttl.sampled),
            )
            .await
    }

    /// 条件查询；`use_cache` 为 `false` 时直接读存储
    pub async fn find(
        &self,
        collection: Collection,
        filter: &Value,
        use_cache: bool,
    ) -> Result<Arc<Vec<Document>>, ServiceError> {
        let parsed = Filter::parse(filter)?;
        let handle = self.handle(collection)?;
        let query = FindQuery::new(parsed);

        if !use_cache {
            debug!(%collection, "find bypasses cache");
            return Ok(Arc::new(handle.find(query).await?));
        }

        let key = CacheKey::with_params(Operation::Find, collection, filter)?;
        self.cache
            .get_or_set(
                key.as_str(),
                || async move { handle.find(query).await.map_err(ServiceError::from) },
                Some(self.ttl.find),
            )
            .await
    }

    /// 单条查询；`use_cache` 为 `false` 时直接读存储
    pub async fn find_one(
        &self,
        collection: Collection,
        filter: &Value,
        use_cache: bool,
    ) -> Result<Arc<Option<Document>>, ServiceError> {
        let parsed = Filter::parse(filter)?;
        let handle = self.handle(collection)?;
        let query = FindQuery::new(parsed);

        if !use_cache {
            debug!(%collection, "findOne bypasses cache");
            return Ok(Arc::new(handle.find_one(query).await?));
        }

        let key = CacheKey::with_params(Operation::FindOne, collection, filter)?;
        self.cache
            .get_or_set(
                key.as_str(),
                || async move { handle.find_one(query).await.map_err(ServiceError::from) },
                Some(self.ttl.find_one),
            )
            .await
    }

    /// 游戏和分类的全量列表，整体缓存在 [`PAGE_DATA_KEY`] 下
    pub async fn page_data(&self) -> Result<Arc<PageData>, ServiceError> {
        self.cache
            .get_or_set(
                PAGE_DATA_KEY,
                || async {
                    let (games, categories) = futures::try_join!(
                        self.all(Collection::Games, None),
                        self.all(Collection::Categories, None)
                    )?;
                    Ok::<_, ServiceError>(PageData { games, categories })
                },
                Some(self.ttl.page_data),
            )
            .await
    }

    // ========== 不缓存的查询 ==========

    pub async fn find_one_and_select(
        &self,
        collection: Collection,
        filter: &Value,
        select: &Value,
    ) -> Result<Option<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?).project(Projection::parse(select)?);
        Ok(self.handle(collection)?.find_one(query).await?)
    }

    pub async fn find_and_populate(
        &self,
        collection: Collection,
        filter: &Value,
        populate: &Populate,
    ) -> Result<Vec<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?);
        self.find_populated(collection, query, std::slice::from_ref(populate)).await
    }

    pub async fn find_one_and_populate(
        &self,
        collection: Collection,
        filter: &Value,
        populate: &Populate,
    ) -> Result<Option<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?);
        self.find_one_populated(collection, query, std::slice::from_ref(populate)).await
    }

    /// 先排序、跳过、截取，再对结果填充引用
    pub async fn find_populate_sort_and_limit(
        &self,
        collection: Collection,
        filter: &Value,
        populate: &Populate,
        sort: &Value,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?)
            .sort(Sort::parse(sort)?)
            .skip(skip)
            .limit(limit);
        self.find_populated(collection, query, std::slice::from_ref(populate)).await
    }

    pub async fn find_slice_and_populate(
        &self,
        collection: Collection,
        filter: &Value,
        slice: &Value,
        populate: &Populate,
    ) -> Result<Vec<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?).project(Projection::parse(slice)?);
        self.find_populated(collection, query, std::slice::from_ref(populate)).await
    }

    pub async fn find_and_populate_nested(
        &self,
        collection: Collection,
        filter: &Value,
        populate: &[Populate],
    ) -> Result<Vec<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?);
        self.find_populated(collection, query, populate).await
    }

    pub async fn find_slice_and_populate_nested(
        &self,
        collection: Collection,
        filter: &Value,
        slice: &Value,
        populate: &[Populate],
    ) -> Result<Vec<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?).project(Projection::parse(slice)?);
        self.find_populated(collection, query, populate).await
    }

    pub async fn find_one_slice_and_populate(
        &self,
        collection: Collection,
        filter: &Value,
        slice: &Value,
        populate: &Populate,
    ) -> Result<Option<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?).project(Projection::parse(slice)?);
        self.find_one_populated(collection, query, std::slice::from_ref(populate)).await
    }

    /// 与 [`find_one_slice_and_populate`](Self::find_one_slice_and_populate) 相同，
    /// 但填充描述由调用方完整给出（可嵌套、可多个）
    pub async fn find_one_slice_and_custom_populate(
        &self,
        collection: Collection,
        filter: &Value,
        slice: &Value,
        populate: &[Populate],
    ) -> Result<Option<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?).project(Projection::parse(slice)?);
        self.find_one_populated(collection, query, populate).await
    }

    pub async fn get_data_with_limit(
        &self,
        collection: Collection,
        filter: &Value,
        sort: &Value,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?)
            .sort(Sort::parse(sort)?)
            .skip(skip)
            .limit(limit);
        Ok(self.handle(collection)?.find(query).await?)
    }

    pub async fn get_data_select_with_limit(
        &self,
        collection: Collection,
        filter: &Value,
        select: &Value,
        sort: &Value,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Document>, ServiceError> {
        let query = FindQuery::new(Filter::parse(filter)?)
            .project(Projection::parse(select)?)
            .sort(Sort::parse(sort)?)
            .skip(skip)
            .limit(limit);
        Ok(self.handle(collection)?.find(query).await?)
    }

    pub async fn get_aggregate(
        &self,
        collection: Collection,
        pipeline: &Value,
    ) -> Result<Vec<Document>, ServiceError> {
        let pipeline = Pipeline::parse(pipeline)?;
        Ok(self.handle(collection)?.aggregate(pipeline).await?)
    }

    // ========== 写操作（不失效缓存） ==========

    pub async fn insert_new_document(
        &self,
        collection: Collection,
        doc: Document,
    ) -> Result<Document, ServiceError> {
        Ok(self.handle(collection)?.insert(doc).await?)
    }

    /// `$set` 更新第一个匹配的文档，返回更新后的文档
    pub async fn update_document(
        &self,
        collection: Collection,
        filter: &Value,
        fields: Document,
    ) -> Result<Option<Document>, ServiceError> {
        let filter = Filter::parse(filter)?;
        Ok(self
            .handle(collection)?
            .update_one(filter, Update::set(fields))
            .await?)
    }

    /// 任意更新描述，返回匹配的文档数（0 或 1）
    pub async fn custom_update(
        &self,
        collection: Collection,
        filter: &Value,
        update: &Value,
    ) -> Result<usize, ServiceError> {
        let filter = Filter::parse(filter)?;
        let update = Update::parse(update)?;
        let updated = self.handle(collection)?.update_one(filter, update).await?;
        Ok(usize::from(updated.is_some()))
    }

    /// `$addToSet` 更新第一个匹配的文档，返回更新后的文档
    pub async fn push_into_array(
        &self,
        collection: Collection,
        filter: &Value,
        fields: Document,
    ) -> Result<Option<Document>, ServiceError> {
        let filter = Filter::parse(filter)?;
        Ok(self
            .handle(collection)?
            .update_one(filter, Update::add_to_set(fields))
            .await?)
    }

    pub async fn delete_document(
        &self,
        collection: Collection,
        filter: &Value,
    ) -> Result<usize, ServiceError> {
        let filter = Filter::parse(filter)?;
        Ok(self.handle(collection)?.delete_one(filter).await?)
    }

    // ========== 关联填充 ==========

    async fn find_populated(
        &self,
        collection: Collection,
        query: FindQuery,
        populate: &[Populate],
    ) -> Result<Vec<Document>, ServiceError> {
        let mut docs = self.handle(collection)?.find(query).await?;
        self.populate(&mut docs, populate).await?;
        Ok(docs)
    }

    async fn find_one_populated(
        &self,
        collection: Collection,
        query: FindQuery,
        populate: &[Populate],
    ) -> Result<Option<Document>, ServiceError> {
        let found = self.handle(collection)?.find_one(query).await?;
        let mut docs: Vec<Document> = found.into_iter().collect();
        self.populate(&mut docs, populate).await?;
        Ok(docs.pop())
    }

    /// 逐个填充描述读取目标集合并回填，嵌套描述先作用在目标文档上
    fn populate<'a>(
        &'a self,
        docs: &'a mut [Document],
        specs: &'a [Populate],
    ) -> BoxFuture<'a, Result<(), ServiceError>> {
        async move {
            for spec in specs {
                let ids = spec.reference_ids(&*docs);
                if ids.is_empty() {
                    continue;
                }
                let query = FindQuery::new(spec.target_filter(ids));
                let mut targets = self.handle(spec.from)?.find(query).await?;
                if !spec.populate.is_empty() {
                    self.populate(&mut targets, &spec.populate).await?;
                }
                spec.attach(&mut *docs, targets);
            }
            Ok(())
        }
        .boxed()
    }
}

/// 标题或描述包含关键字（不区分大小写）
pub fn keyword_filter(keyword: &str) -> Value {
    json!({
        "$or": [
            { "title": { "$regex": keyword, "$options": "i" } },
            { "desc": { "$regex": keyword, "$options": "i" } }
        ]
    })
}
