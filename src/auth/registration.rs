use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;

use crate::auth::password;
use crate::db::is_unique_violation;
use crate::db::models::{Author, Post, User, POST_COLUMNS};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Invalid(String),

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Failed to process password: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub user: Author,
    pub welcome_post: Post,
}

pub fn validate_username(username: &str) -> Result<(), RegistrationError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(RegistrationError::Invalid(
            "Username must be between 3 and 32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(RegistrationError::Invalid(
            "Username may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), RegistrationError> {
    if password.chars().count() < 8 {
        return Err(RegistrationError::Invalid(
            "Password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

/// Create the account and its welcome post together; neither exists without the other.
pub fn register_user(
    conn: &mut Connection,
    username: &str,
    plaintext: &str,
    bcrypt_cost: u32,
) -> Result<Registration, RegistrationError> {
    validate_username(username)?;
    validate_password(plaintext)?;
    let password_hash = password::hash_password(plaintext, bcrypt_cost)?;

    // Take the write lock before the username check so concurrent sign-ups queue
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let taken: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![username],
        |r| r.get(0),
    )?;
    if taken {
        return Err(RegistrationError::UsernameTaken);
    }

    tx.execute(
        "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
        params![username, password_hash],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            RegistrationError::UsernameTaken
        } else {
            RegistrationError::Database(e)
        }
    })?;
    let user_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO posts (title, content, author_id) VALUES (?1, ?2, ?3)",
        params![
            format!("Welcome {username}!"),
            format!("Welcome to our platform, {username}! We're excited to have you here."),
            user_id
        ],
    )?;
    let post_id = tx.last_insert_rowid();

    let user = find_user_by_id(&tx, user_id)?;
    let welcome_post = tx.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
        params![post_id],
        Post::from_row,
    )?;
    tx.commit()?;

    tracing::info!(user_id, username, "Registration successful");

    Ok(Registration {
        user: user.public(),
        welcome_post,
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn find_user_by_id(conn: &Connection, id: i64) -> rusqlite::Result<User> {
    conn.query_row(
        "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
        params![id],
        user_from_row,
    )
}

pub fn find_user_by_username(conn: &Connection, username: &str) -> rusqlite::Result<User> {
    conn.query_row(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
        params![username],
        user_from_row,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::migrated_pool;

    #[test]
    fn register_creates_user_and_welcome_post() {
        let (pool, _tmp) = migrated_pool();
        let mut conn = pool.get().unwrap();

        let reg = register_user(&mut conn, "alice", "correct horse", 4).unwrap();
        assert_eq!(reg.user.username, "alice");
        assert_eq!(reg.welcome_post.title, "Welcome alice!");
        assert_eq!(reg.welcome_post.author_id, reg.user.id);
        assert_eq!(reg.welcome_post.like_count, 0);

        let stored = find_user_by_username(&conn, "alice").unwrap();
        assert!(password::verify_password("correct horse", &stored.password_hash));
    }

    #[test]
    fn duplicate_username_is_rejected_without_side_effects() {
        let (pool, _tmp) = migrated_pool();
        let mut conn = pool.get().unwrap();
        register_user(&mut conn, "alice", "correct horse", 4).unwrap();

        let again = register_user(&mut conn, "alice", "another pass", 4);
        assert!(matches!(again, Err(RegistrationError::UsernameTaken)));

        let posts: i64 = conn
            .query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(posts, 1);
    }

    #[test]
    fn concurrent_registrations_of_one_name_create_one_user() {
        let (pool, _tmp) = migrated_pool();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut conn = pool.get().unwrap();
                    register_user(&mut conn, "racer", "correct horse", 4)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(RegistrationError::UsernameTaken))));

        let conn = pool.get().unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE username = 'racer'", [], |r| r.get(0))
            .unwrap();
        let posts: i64 = conn
            .query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))
            .unwrap();
        assert_eq!((users, posts), (1, 1));
    }

    #[test]
    fn validation_rules() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("ok_name_42").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn serialized_user_never_contains_password_hash() {
        let (pool, _tmp) = migrated_pool();
        let mut conn = pool.get().unwrap();
        register_user(&mut conn, "alice", "correct horse", 4).unwrap();

        let user = find_user_by_username(&conn, "alice").unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
