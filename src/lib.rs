pub mod cache;
pub mod config;
pub mod query;
pub mod server;
pub mod service;
pub mod storage;
pub mod values;

pub use crate::cache::{CacheAside, CacheConfig, CacheStore};
pub use crate::service::CatalogService;
pub use crate::storage::{Collection, CollectionRegistry};
pub use crate::values::Document;
