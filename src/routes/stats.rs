use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::Connection;
use serde::Serialize;

use crate::error::AppResult;
use crate::format::format_count;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStats {
    pub total_users: i64,
    pub total_posts: i64,
    pub total_likes: i64,
    pub formatted: FormattedStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedStats {
    pub total_users: String,
    pub total_posts: String,
    pub total_likes: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(site_stats))
}

fn count(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
}

pub fn collect_stats(conn: &Connection) -> rusqlite::Result<SiteStats> {
    let total_users = count(conn, "users")?;
    let total_posts = count(conn, "posts")?;
    let total_likes = count(conn, "post_likes")?;

    Ok(SiteStats {
        total_users,
        total_posts,
        total_likes,
        formatted: FormattedStats {
            total_users: format_count(total_users),
            total_posts: format_count(total_posts),
            total_likes: format_count(total_likes),
        },
    })
}

async fn site_stats(State(state): State<AppState>) -> AppResult<Json<SiteStats>> {
    let conn = state.db.get()?;
    Ok(Json(collect_stats(&conn)?))
}
