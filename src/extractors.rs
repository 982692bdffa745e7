use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    /// Session token the request authenticated with
    pub token: String,
}

/// Extractor that requires authentication.
/// Returns 401 if no valid session found.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let conn = state.db.get()?;
        lookup_session(&conn, token)
    }
}

/// Resolve a live session token to its user. Unknown or expired tokens are 401;
/// store failures stay database errors.
fn lookup_session(conn: &Connection, token: String) -> Result<CurrentUser, AppError> {
    let found: rusqlite::Result<(i64, String)> = conn.query_row(
        "SELECT u.id, u.username FROM sessions s \
         JOIN users u ON u.id = s.user_id \
         WHERE s.token = ?1 AND s.expires_at > datetime('now')",
        params![token],
        |row| Ok((row.get(0)?, row.get(1)?)),
    );
    match found {
        Ok((id, username)) => Ok(CurrentUser {
            id,
            username,
            token,
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(AppError::Unauthorized),
        Err(e) => Err(AppError::Database(e)),
    }
}

fn extract_session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::create_session;
    use crate::db::tests::migrated_pool;
    use axum::http::Request;

    fn parts_with_cookie(cookie: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header::COOKIE, cookie)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let parts = parts_with_cookie("theme=dark; postboard_session=abc123; lang=en");
        assert_eq!(
            extract_session_token(&parts, "postboard_session"),
            Some("abc123")
        );
    }

    #[test]
    fn missing_or_empty_cookie_is_none() {
        let parts = parts_with_cookie("theme=dark");
        assert_eq!(extract_session_token(&parts, "postboard_session"), None);

        let parts = parts_with_cookie("postboard_session=");
        assert_eq!(extract_session_token(&parts, "postboard_session"), None);
    }

    fn session_for_alice(conn: &Connection) -> String {
        conn.execute(
            "INSERT INTO users (username, password_hash) VALUES ('alice', 'x')",
            [],
        )
        .unwrap();
        create_session(conn, conn.last_insert_rowid(), 1).unwrap()
    }

    #[test]
    fn live_session_resolves_to_user() {
        let (pool, _tmp) = migrated_pool();
        let conn = pool.get().unwrap();
        let token = session_for_alice(&conn);

        let user = lookup_session(&conn, token.clone()).unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.token, token);
    }

    #[test]
    fn unknown_or_expired_token_is_unauthorized() {
        let (pool, _tmp) = migrated_pool();
        let conn = pool.get().unwrap();
        let token = session_for_alice(&conn);

        assert!(matches!(
            lookup_session(&conn, "nope".into()),
            Err(AppError::Unauthorized)
        ));

        conn.execute(
            "UPDATE sessions SET expires_at = datetime('now', '-1 hours')",
            [],
        )
        .unwrap();
        assert!(matches!(
            lookup_session(&conn, token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn store_failure_is_not_reported_as_unauthorized() {
        let (pool, _tmp) = migrated_pool();
        let conn = pool.get().unwrap();
        conn.execute_batch("DROP TABLE sessions").unwrap();

        assert!(matches!(
            lookup_session(&conn, "anything".into()),
            Err(AppError::Database(_))
        ));
    }
}
