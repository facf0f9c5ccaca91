use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::cache::CacheReport;
use crate::service::{keyword_filter, CatalogService, ServiceError};
use crate::storage::Collection;
use crate::values::Document;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CatalogService>,
    pub started_at: DateTime<Utc>,
    boot: Instant,
}

impl AppState {
    pub fn new(service: CatalogService) -> Self {
        Self {
            service: Arc::new(service),
            started_at: Utc::now(),
            boot: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub keyword: String,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub status: u16,
    pub data: Arc<Vec<Document>>,
}

#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub uptime: String,
    pub uptime_secs: u64,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    pub version: &'static str,
}

pub fn create_router(state: AppState) -> Router {
    use tower_http::compression::CompressionLayer;
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/", get(index))
        .route("/category/:name", get(category))
        .route("/api/trending", post(trending))
        .route("/play/api/trending", post(trending))
        .route("/api/search", post(search))
        .route("/play/api/search", post(search))
        .route("/game/*path", get(game_page))
        .route("/play/*path", get(game_page))
        .route("/admin/cache-stats", get(cache_stats))
        .route("/admin/cache/flush", post(flush_cache))
        .route("/admin/cache/reset-stats", post(reset_cache_stats))
        .route("/admin/monitor", get(monitor))
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 首页：全部游戏和分类
async fn index(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    let service = &state.service;
    let (games, categories) = futures::try_join!(
        service.all(Collection::Games, None),
        service.all(Collection::Categories, None)
    )?;
    Ok(Json(json!({ "games": games, "categories": categories })))
}

/// 分类页
async fn category(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let service = &state.service;
    let filter = json!({ "category": name });
    let (games, categories) = futures::try_join!(
        service.find(Collection::Games, &filter, true),
        service.all(Collection::Categories, None)
    )?;
    Ok(Json(json!({
        "games": games,
        "categories": categories,
        "category": capitalize(&name),
    })))
}

async fn trending(State(state): State<AppState>) -> Result<Json<ListingResponse>, ServiceError> {
    let data = state.service.topsix(Collection::Games).await?;
    Ok(Json(ListingResponse { status: 200, data }))
}

async fn search(
    State(state): State<AppState>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<ListingResponse>, ServiceError> {
    let filter = keyword_filter(&payload.keyword);
    let data = state.service.find(Collection::Games, &filter, true).await?;
    Ok(Json(ListingResponse { status: 200, data }))
}

/// 游戏页；找不到游戏时 `game` 为 null，仍返回列表数据
async fn game_page(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let service = &state.service;
    let filter = json!({ "pagelink": format!("/game/{}", path) });
    let game = service.find_one(Collection::Games, &filter, true).await?;
    let (games, categories) = futures::try_join!(
        service.all(Collection::Games, None),
        service.all(Collection::Categories, None)
    )?;
    Ok(Json(json!({
        "game": game,
        "games": games,
        "categories": categories,
    })))
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheReport> {
    Json(state.service.cache().store().report())
}

async fn flush_cache(State(state): State<AppState>) -> Json<Value> {
    state.service.cache().store().flush_all();
    Json(json!({ "status": 200, "message": "cache cleared" }))
}

async fn reset_cache_stats(State(state): State<AppState>) -> Json<Value> {
    state.service.cache().store().reset_stats();
    Json(json!({ "status": 200, "message": "cache statistics reset" }))
}

async fn monitor(State(state): State<AppState>) -> Json<MonitorResponse> {
    let uptime = state.boot.elapsed();
    Json(MonitorResponse {
        uptime: format!("{:.2} minutes", uptime.as_secs_f64() / 60.0),
        uptime_secs: uptime.as_secs(),
        started_at: state.started_at,
        pid: std::process::id(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 404，列表数据整体缓存
async fn not_found(State(state): State<AppState>) -> Response {
    match state.service.page_data().await {
        Ok(data) => {
            let body = json!({
                "status": 404,
                "games": data.games,
                "categories": data.categories,
            });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(err) => {
            error!(error = %err, "failed to load 404 page data");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub async fn run_server(state: AppState, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
