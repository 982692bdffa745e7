use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use rusqlite::params;
use serde::Deserialize;
use serde_json::json;

use crate::auth::password;
use crate::auth::registration::{self, RegistrationError};
use crate::auth::session;
use crate::db::models::{Post, POST_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Invalid(msg) => AppError::BadRequest(msg),
            RegistrationError::UsernameTaken => AppError::Conflict("Username already taken".into()),
            RegistrationError::Hash(e) => AppError::Internal(format!("Password hashing failed: {e}")),
            RegistrationError::Database(e) => AppError::Database(e),
        }
    }
}

/// POST /auth/register: create an account plus its welcome post, then sign in
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = body.map_err(|_| AppError::BadRequest("Invalid request body".into()))?;
    let username = req.username.trim();

    let mut conn = state.db.get()?;
    let reg = registration::register_user(
        &mut conn,
        username,
        &req.password,
        state.config.auth.bcrypt_cost,
    )?;
    let token = session::create_session(&conn, reg.user.id, state.config.auth.session_hours)?;

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(
                &state.config.auth.cookie_name,
                &token,
                state.config.auth.session_hours,
            ),
        )]),
        Json(json!({
            "success": true,
            "user": reg.user,
            "welcomePost": reg.welcome_post,
        })),
    )
        .into_response())
}

/// POST /auth/login: verify credentials and issue a session cookie
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = body.map_err(|_| AppError::BadRequest("Invalid request body".into()))?;

    let conn = state.db.get()?;
    let user = match registration::find_user_by_username(&conn, req.username.trim()) {
        Ok(user) => user,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Err(AppError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    if !password::verify_password(&req.password, &user.password_hash) {
        tracing::info!(username = %user.username, "Rejected login");
        return Err(AppError::Unauthorized);
    }

    let purged = session::purge_expired(&conn)?;
    let token = session::create_session(&conn, user.id, state.config.auth.session_hours)?;
    tracing::info!(user_id = user.id, purged, "User logged in");

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(
                &state.config.auth.cookie_name,
                &token,
                state.config.auth.session_hours,
            ),
        )]),
        Json(json!({ "success": true, "user": user.public() })),
    )
        .into_response())
}

/// POST /auth/logout: drop the session and clear the cookie
pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    session::delete_session(&conn, &user.token)?;

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )]),
        Json(json!({ "success": true })),
    )
        .into_response())
}

/// GET /users/me: the signed-in user and their posts, newest first
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let profile = registration::find_user_by_id(&conn, user.id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM posts p WHERE p.author_id = ?1 ORDER BY p.created_at DESC, p.id DESC"
    ))?;
    let posts = stmt
        .query_map(params![user.id], Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({
        "id": profile.id,
        "username": profile.username,
        "createdAt": profile.created_at,
        "posts": posts,
    }))
    .into_response())
}
