//! End-to-end tests against an in-process HTTP server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use mangawiki_client::{ApiClient, CacheOptions, ClientConfig, ClientContext, PagedCache, ProfileApi};
use mangawiki_shared::{FetchError, PageEnvelope, ProfilePatch};

const TOKEN: &str = "test-token";

#[derive(Default)]
struct Backend {
    list_hits: AtomicUsize,
    last_query: Mutex<HashMap<String, String>>,
    username: Mutex<String>,
    progress: Mutex<Option<u32>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {TOKEN}"))
}

async fn list_characters(
    State(backend): State<Arc<Backend>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    backend.list_hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    *backend.last_query.lock().unwrap() = query;
    Json(json!({
        "data": [{"name": format!("character-{page}")}],
        "total": 41,
        "page": page,
        "totalPages": 3,
    }))
}

async fn broken_list() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"message": "maintenance", "statusCode": 503})),
    )
}

async fn get_chapter(Path(number): Path<u32>) -> impl IntoResponse {
    if number == 0 {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Chapter not found"})));
    }
    (
        StatusCode::OK,
        Json(json!({"number": number, "title": "Romance Dawn"})),
    )
}

fn profile_body(backend: &Backend) -> Value {
    json!({
        "id": 1,
        "username": *backend.username.lock().unwrap(),
        "userProgress": *backend.progress.lock().unwrap(),
    })
}

async fn get_profile(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"})));
    }
    (StatusCode::OK, Json(profile_body(&backend)))
}

async fn patch_profile(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"})));
    }
    if let Some(name) = patch.get("username").and_then(Value::as_str) {
        *backend.username.lock().unwrap() = name.to_string();
    }
    if let Some(progress) = patch.get("userProgress").and_then(Value::as_u64) {
        if progress > 539 {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": ["userProgress must not be greater than 539"]})),
            );
        }
        *backend.progress.lock().unwrap() = Some(progress as u32);
    }
    (StatusCode::OK, Json(profile_body(&backend)))
}

async fn spawn_server() -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend {
        username: Mutex::new("nami".into()),
        progress: Mutex::new(Some(30)),
        ..Default::default()
    });

    let app = Router::new()
        .route("/characters", get(list_characters))
        .route("/users", get(list_characters))
        .route("/broken", get(broken_list))
        .route("/chapters/:number", get(get_chapter))
        .route("/users/profile", get(get_profile).patch(patch_profile))
        .with_state(Arc::clone(&backend));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), backend)
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Character {
    name: String,
}

#[tokio::test]
async fn fetch_page_sends_pagination_and_filters() {
    let (url, backend) = spawn_server().await;
    let api = ApiClient::new(url, None);

    let page: PageEnvelope<Character> = api
        .fetch_page("characters", 2, 20, &json!({"status": "approved", "arc": null}))
        .await
        .unwrap();

    assert_eq!(page.page, 2);
    assert_eq!(page.total, 41);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.data[0].name, "character-2");

    let query = backend.last_query.lock().unwrap().clone();
    assert_eq!(query.get("page").map(String::as_str), Some("2"));
    assert_eq!(query.get("limit").map(String::as_str), Some("20"));
    assert_eq!(query.get("status").map(String::as_str), Some("approved"));
    assert!(!query.contains_key("arc"));
}

#[tokio::test]
async fn error_status_carries_server_message() {
    let (url, _) = spawn_server().await;
    let api = ApiClient::new(url, None);

    let err = api
        .fetch_page::<Character>("broken", 1, 20, &Value::Null)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FetchError::Status {
            status: 503,
            message: "maintenance".into()
        }
    );
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let api = ApiClient::new("http://127.0.0.1:9", None);
    let err = api.get_chapter(1).await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[tokio::test]
async fn chapter_lookup() {
    let (url, _) = spawn_server().await;
    let api = ApiClient::new(url, None);

    let chapter = api.get_chapter(1).await.unwrap();
    assert_eq!(chapter.number, 1);
    assert_eq!(chapter.title.as_deref(), Some("Romance Dawn"));

    let err = api.get_chapter(0).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn profile_requires_bearer_token() {
    let (url, _) = spawn_server().await;

    let anonymous = ApiClient::new(url.clone(), None);
    let err = anonymous.get_profile().await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 401, .. }));

    let signed_in = ApiClient::new(url, Some(TOKEN.into()));
    let profile = signed_in.get_profile().await.unwrap();
    assert_eq!(profile.username, "nami");
    assert_eq!(profile.user_progress, Some(30));

    let patch = ProfilePatch {
        user_progress: Some(45),
        ..Default::default()
    };
    let updated = signed_in.patch_profile(&patch).await.unwrap();
    assert_eq!(updated.user_progress, Some(45));
}

#[tokio::test]
async fn concurrent_cache_misses_hit_the_server_once() {
    let (url, backend) = spawn_server().await;
    let api = ApiClient::new(url, None);
    let cache = Arc::new(PagedCache::new(10));
    let filters = json!({"status": "approved"});
    let options = CacheOptions {
        ttl: Duration::from_secs(60),
        persist: false,
    };

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        let fetcher = api.page_fetcher::<Character>("characters", 20, &filters);
        let filters = filters.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_page("characters", 1, &filters, fetcher, options)
                .await
        }));
    }

    for handle in handles {
        let page = handle.await.unwrap().unwrap();
        assert_eq!(page.envelope.data[0].name, "character-1");
    }
    assert_eq!(backend.list_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn signed_in_context_round_trip() {
    let (url, backend) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = ClientContext::init(ClientConfig {
        api_url: url,
        access_token: Some(TOKEN.into()),
        db_path: Some(dir.path().join("wiki.db")),
        ..ClientConfig::default()
    })
    .await
    .unwrap();

    let progress = ctx.progress();
    assert!(progress.is_authenticated());
    assert_eq!(progress.get_progress(), 30);

    progress.update_progress(60).await.unwrap();
    assert_eq!(*backend.progress.lock().unwrap(), Some(60));

    // warm the users list, then rename
    let api = ctx.api();
    let options = ctx.config().cache_options();
    ctx.cache()
        .get_page(
            "users",
            1,
            &Value::Null,
            api.page_fetcher::<Character>("users", 20, &Value::Null),
            options,
        )
        .await
        .unwrap();
    assert_eq!(ctx.cache().len(), 1);

    let profile = ctx.update_username("  robin ").await.unwrap();
    assert_eq!(profile.username, "robin");
    assert_eq!(*backend.username.lock().unwrap(), "robin");
    assert!(ctx.cache().is_empty());
}

#[tokio::test]
async fn placeholder_is_labelled_with_the_chapter_title() {
    let (url, _) = spawn_server().await;
    let ctx = ClientContext::in_memory(ClientConfig {
        api_url: url,
        ..ClientConfig::default()
    })
    .await;

    let gate = ctx.gate_with_title(Some(1u32)).await;
    let view = gate.view(&ctx.spoilers().get(), ctx.progress().get_progress());
    let overlay = view.overlay.expect("chapter 1 is ahead of a new reader");
    assert_eq!(
        overlay.label(),
        "Spoiler for chapter 1: Romance Dawn. Click to reveal."
    );
}
