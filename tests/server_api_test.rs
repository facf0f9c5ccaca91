// HTTP 接口测试

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rs_catalog::cache::{CacheAside, CacheStore};
use rs_catalog::server::{create_router, AppState};
use rs_catalog::service::CatalogService;
use rs_catalog::storage::{CollectionRegistry, SeedData};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SEED: &str = r#"{
    "games": [
        {"_id": "g1", "title": "Snake", "desc": "Eat apples", "category": "arcade",
         "position": 2, "pagelink": "/game/snake"},
        {"_id": "g2", "title": "Chess", "desc": "Checkmate", "category": "board",
         "position": 1, "pagelink": "/game/chess"}
    ],
    "categories": [
        {"_id": "c1", "category": "arcade", "position": 1},
        {"_id": "c2", "category": "board", "position": 2}
    ]
}"#;

async fn app() -> Router {
    let registry = CollectionRegistry::in_memory();
    SeedData::from_json(SEED)
        .unwrap()
        .load_into(&registry)
        .await
        .unwrap();
    let service = CatalogService::new(CacheAside::new(Arc::new(CacheStore::with_defaults())), registry);
    create_router(AppState::new(service))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_index_lists_games_by_position() {
    let app = app().await;
    let (status, body) = send(&app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["games"][0]["title"], json!("Chess"));
    assert_eq!(body["games"][1]["title"], json!("Snake"));
    assert_eq!(body["categories"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_category_page() {
    let app = app().await;
    let (status, body) = send(&app, get("/category/arcade")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], json!("Arcade"));
    assert_eq!(body["games"].as_array().unwrap().len(), 1);
    assert_eq!(body["games"][0]["title"], json!("Snake"));
}

#[tokio::test]
async fn test_search_and_trending() {
    let app = app().await;

    let (status, body) = send(&app, post("/api/search", json!({"keyword": "checkmate"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!(200));
    assert_eq!(body["data"][0]["title"], json!("Chess"));

    let (status, body) = send(&app, post("/play/api/trending", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_search_pattern_is_bad_request() {
    let app = app().await;
    let (status, body) = send(&app, post("/api/search", json!({"keyword": "("}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!(400));
}

#[tokio::test]
async fn test_game_page() {
    let app = app().await;

    let (status, body) = send(&app, get("/game/snake")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["game"]["title"], json!("Snake"));
    assert_eq!(body["games"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, get("/game/unknown")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["game"], Value::Null);
}

#[tokio::test]
async fn test_unknown_route_returns_page_data() {
    let app = app().await;
    let (status, body) = send(&app, get("/no/such/page")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], json!(404));
    assert_eq!(body["games"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cache_admin_endpoints() {
    let app = app().await;

    send(&app, get("/")).await;
    send(&app, get("/")).await;

    let (status, report) = send(&app, get("/admin/cache-stats")).await;
    assert_eq!(status, StatusCode::OK);
    // 首页读取两个集合：第一次两次未命中，第二次两次命中
    assert_eq!(report["hits"], json!(2));
    assert_eq!(report["misses"], json!(2));
    assert_eq!(report["keys"], json!(2));
    assert_eq!(report["hit_rate_percent"], json!("50.00%"));
    assert_eq!(report["status"], json!("Needs Warmup"));

    let (status, _) = send(&app, post("/admin/cache/flush", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, report) = send(&app, get("/admin/cache-stats")).await;
    assert_eq!(report["keys"], json!(0));
    assert_eq!(report["hits"], json!(2));

    send(&app, post("/admin/cache/reset-stats", json!({}))).await;
    let (_, report) = send(&app, get("/admin/cache-stats")).await;
    assert_eq!(report["total_requests"], json!(0));
}

#[tokio::test]
async fn test_monitor() {
    let app = app().await;
    let (status, body) = send(&app, get("/admin/monitor")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pid"], json!(std::process::id()));
    assert!(body["uptime"].as_str().unwrap().ends_with("minutes"));
}
