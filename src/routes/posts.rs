use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::params;
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{Post, POST_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::{self, FeedQuery, PostPage, SortBy};
use crate::likes::{self, LikeAction};
use crate::pagination::parse_positive;
use crate::state::AppState;

// --- Requests ---

/// Raw query string; every field is parsed leniently.
#[derive(Deserialize, Default)]
pub struct FeedParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct LikeRequest {
    pub action: LikeAction,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}/like", post(like_post))
        .route("/posts/{id}/like-status", get(like_status))
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<PostPage>> {
    let query = feed_query(&params, &state.config.feed);

    let started = Instant::now();
    let page = {
        let conn = state.db.get()?;
        feed::list_posts(&conn, &query)?
    };
    let elapsed = started.elapsed();

    if elapsed > Duration::from_millis(state.config.feed.slow_query_ms) {
        tracing::warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            page = query.page,
            search = query.search.as_deref().unwrap_or(""),
            "Slow feed query"
        );
    } else {
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Feed query");
    }

    Ok(Json(page))
}

fn feed_query(params: &FeedParams, config: &crate::config::FeedConfig) -> FeedQuery {
    let limit = parse_positive(params.limit.as_deref(), config.default_limit).min(config.max_limit);
    FeedQuery {
        page: parse_positive(params.page.as_deref(), 1),
        limit: limit.max(1),
        search: params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        sort_by: SortBy::parse(params.sort_by.as_deref()),
    }
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<Json<CreatePostRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = body.map_err(|_| AppError::BadRequest("Invalid request body".into()))?;
    let title = req.title.trim();
    let content = req.content.trim();

    let title_len = title.chars().count();
    if title_len == 0 || title_len > 100 {
        return Err(AppError::BadRequest(
            "Title must be between 1 and 100 characters".into(),
        ));
    }
    let content_len = content.chars().count();
    if content_len == 0 || content_len > 5000 {
        return Err(AppError::BadRequest(
            "Content must be between 1 and 5000 characters".into(),
        ));
    }

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO posts (title, content, author_id) VALUES (?1, ?2, ?3)",
        params![title, content, user.id],
    )?;
    let post = conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
        params![conn.last_insert_rowid()],
        Post::from_row,
    )?;

    tracing::info!(post_id = post.id, author = %user.username, "Post created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "post": post })),
    )
        .into_response())
}

fn parse_post_id(raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest("Invalid post ID".into()))
}

async fn like_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<LikeRequest>, JsonRejection>,
) -> AppResult<Response> {
    let post_id = parse_post_id(&id)?;
    let Json(req) = body.map_err(|_| AppError::BadRequest("Invalid request body".into()))?;

    let outcome = {
        let mut conn = state.db.get()?;
        likes::apply_like_action(&mut conn, user.id, post_id, req.action)?
    };

    Ok(Json(json!({
        "success": true,
        "post": outcome.post,
        "hasLiked": outcome.has_liked,
        "message": format!("Post {}d successfully", req.action.as_str()),
    }))
    .into_response())
}

async fn like_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let post_id = parse_post_id(&id)?;

    let conn = state.db.get()?;
    let has_liked = likes::has_liked(&conn, user.id, post_id)?;

    Ok(Json(json!({ "success": true, "hasLiked": has_liked })).into_response())
}

// --- Tests ---
