// HTTP-level tests: drive the full router against a temp database
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use postboard::config::Config;
use postboard::db;
use postboard::routes;
use postboard::state::AppState;

fn test_app() -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = Some(dir.path().join("test.db"));
    config.auth.bcrypt_cost = 4;

    let pool = db::create_pool(&config.db_path()).unwrap();
    db::run_migrations(&pool).unwrap();

    (routes::app(AppState::new(pool, config)), dir)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, set_cookie, json)
}

/// Register a user, returning (session cookie, welcome post id).
async fn register(app: &Router, username: &str) -> (String, i64) {
    let (status, cookie, body) = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": username, "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        cookie.expect("register sets a session cookie"),
        body["welcomePost"]["id"].as_i64().unwrap(),
    )
}

async fn like(app: &Router, cookie: &str, post_id: i64, action: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(
        app,
        Method::POST,
        &format!("/posts/{post_id}/like"),
        Some(cookie),
        Some(json!({ "action": action })),
    )
    .await;
    (status, body)
}

#[tokio::test]
async fn test_register_then_me_and_logout() {
    let (app, _tmp) = test_app();
    let (cookie, _) = register(&app, "alice").await;
    assert!(cookie.starts_with("postboard_session="));

    let (status, _, me) = send(&app, Method::GET, "/users/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert!(me.get("passwordHash").is_none());
    assert_eq!(me["posts"].as_array().unwrap().len(), 1);

    let (status, _, _) = send(&app, Method::POST, "/auth/logout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app, Method::GET, "/users/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_duplicate_registration_and_login() {
    let (app, _tmp) = test_app();
    register(&app, "alice").await;

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "another pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, cookie, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_some());
    assert_eq!(body["user"]["username"], "alice");
}

#[tokio::test]
async fn test_like_unlike_cycle() {
    let (app, _tmp) = test_app();
    let (cookie, post_id) = register(&app, "alice").await;

    let (status, body) = like(&app, &cookie, post_id, "like").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["likeCount"], 1);
    assert_eq!(body["hasLiked"], true);
    assert_eq!(body["message"], "Post liked successfully");

    let (status, body) = like(&app, &cookie, post_id, "like").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Post already liked");

    let (_, _, status_body) = send(
        &app,
        Method::GET,
        &format!("/posts/{post_id}/like-status"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status_body["hasLiked"], true);

    let (status, body) = like(&app, &cookie, post_id, "unlike").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["likeCount"], 0);
    assert_eq!(body["hasLiked"], false);
    assert_eq!(body["message"], "Post unliked successfully");

    let (status, body) = like(&app, &cookie, post_id, "unlike").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Post not liked yet");
}

#[tokio::test]
async fn test_like_request_validation() {
    let (app, _tmp) = test_app();
    let (cookie, post_id) = register(&app, "alice").await;

    let (status, _, _) = send(
        &app,
        Method::POST,
        &format!("/posts/{post_id}/like"),
        None,
        Some(json!({ "action": "like" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = like(&app, &cookie, 9999, "like").await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/posts/abc/like",
        Some(&cookie),
        Some(json!({ "action": "like" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid post ID");

    let (status, body) = like(&app, &cookie, post_id, "love").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
}

#[tokio::test]
async fn test_feed_search_counts_filtered_rows() {
    let (app, _tmp) = test_app();
    register(&app, "alice").await;
    let (bob, _) = register(&app, "bobby").await;

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/posts",
        Some(&bob),
        Some(json!({ "title": "Reply to alice", "content": "Nice to meet you" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, page) = send(&app, Method::GET, "/posts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["posts"][0]["title"], "Reply to alice");
    assert_eq!(page["posts"][0]["author"]["username"], "bobby");

    let (_, _, page) = send(&app, Method::GET, "/posts?search=alice&limit=1", None, None).await;
    assert_eq!(page["pagination"]["total"], 2);
    assert_eq!(page["pagination"]["totalPages"], 2);
    assert_eq!(page["pagination"]["hasNext"], true);
    assert_eq!(page["posts"].as_array().unwrap().len(), 1);

    let (_, _, page) = send(&app, Method::GET, "/posts?search=100%25", None, None).await;
    assert_eq!(page["pagination"]["total"], 0);

    let (status, _, page) = send(&app, Method::GET, "/posts?page=abc&limit=-3", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["page"], 1);
    assert_eq!(page["pagination"]["limit"], 10);
}

#[tokio::test]
async fn test_create_post_validation() {
    let (app, _tmp) = test_app();
    let (cookie, _) = register(&app, "alice").await;

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/posts",
        Some(&cookie),
        Some(json!({ "title": "   ", "content": "body" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/posts",
        None,
        Some(json!({ "title": "Hello", "content": "body" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_query_analysis_batch_survives_bad_entry() {
    let (app, _tmp) = test_app();

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/debug/query-analysis",
        None,
        Some(json!({
            "queries": [
                { "query": "SELECT * FROM posts ORDER BY created_at DESC LIMIT 10" },
                { "query": "SELEC nonsense FROM" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let analyses = body["analyses"].as_array().unwrap();
    assert_eq!(analyses.len(), 2);
    assert!(!analyses[0]["plan"].as_array().unwrap().is_empty());
    assert!(analyses[0]["recommendations"].is_array());
    assert!(analyses[1]["plan"].as_array().unwrap().is_empty());
    assert!(analyses[1]["warnings"][0]
        .as_str()
        .unwrap()
        .starts_with("Analysis failed"));

    let (_, _, listed) = send(&app, Method::GET, "/debug/query-analyses", None, None).await;
    assert_eq!(listed["pagination"]["total"], 2);

    let (_, _, stats) = send(&app, Method::GET, "/debug/query-analyses/stats", None, None).await;
    assert_eq!(stats["stats"]["totalQueries"], 2);
}

#[tokio::test]
async fn test_query_analysis_undecodable_entry_fails_alone() {
    let (app, _tmp) = test_app();

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/debug/query-analysis",
        None,
        Some(json!({
            "queries": [
                { "query": "SELECT * FROM posts" },
                { "query": 42 },
                { "query": "SELECT ?", "params": "x" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let analyses = body["analyses"].as_array().unwrap();
    assert_eq!(analyses.len(), 3);
    assert!(!analyses[0]["plan"].as_array().unwrap().is_empty());
    for failed in &analyses[1..] {
        assert!(failed["plan"].as_array().unwrap().is_empty());
        assert!(failed["warnings"][0]
            .as_str()
            .unwrap()
            .starts_with("Analysis failed: invalid entry"));
    }
}

#[tokio::test]
async fn test_query_analysis_requires_queries_array() {
    let (app, _tmp) = test_app();

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/debug/query-analysis",
        None,
        Some(json!({ "query": "SELECT 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid queries array");

    let (status, _, body) = send(&app, Method::GET, "/debug/query-analysis", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exampleAnalyses"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_stats_and_reconcile() {
    let (app, _tmp) = test_app();
    let (cookie, post_id) = register(&app, "alice").await;
    like(&app, &cookie, post_id, "like").await;

    let (status, _, stats) = send(&app, Method::GET, "/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalUsers"], 1);
    assert_eq!(stats["totalLikes"], 1);
    assert_eq!(stats["formatted"]["totalPosts"], "1");

    let (status, _, _) = send(&app, Method::POST, "/debug/reconcile-likes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) =
        send(&app, Method::POST, "/debug/reconcile-likes", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["corrected"], 0);
}

#[tokio::test]
async fn test_demo_items() {
    let (app, _tmp) = test_app();

    let (status, _, body) = send(
        &app,
        Method::GET,
        "/demo/items?category=Category%203&sortBy=price&page=2",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["total"], 500);
    assert_eq!(body["categories"][0], "all");
    for item in body["items"].as_array().unwrap() {
        assert_eq!(item["category"], "Category 3");
    }
}
