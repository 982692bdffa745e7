//! Like/unlike transitions.
//!
//! A `post_likes` row is the source of truth for "user U likes post P";
//! `posts.like_count` is a cache of how many such rows exist. Every
//! transition writes the membership row first and the counter second, inside
//! one `IMMEDIATE` transaction, and [`reconcile_like_counts`] can always
//! rebuild the cache from membership rows.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::is_unique_violation;
use crate::db::models::{Post, PostLike, POST_COLUMNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LikeAction::Like => "like",
            LikeAction::Unlike => "unlike",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LikeError {
    #[error("Post {0} not found")]
    PostNotFound(i64),

    #[error("Post already liked")]
    DuplicateAction,

    #[error("Post not liked")]
    InvalidAction,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeOutcome {
    pub post: Post,
    pub has_liked: bool,
}

/// Apply a like or unlike for `user_id` on `post_id` as one state transition.
///
/// Liking an already-liked post fails with [`LikeError::DuplicateAction`] and
/// unliking a post that is not liked fails with [`LikeError::InvalidAction`];
/// neither mutates anything. A negative counter found while liking is reset
/// to 1, and unliking never takes the counter below 0.
pub fn apply_like_action(
    conn: &mut Connection,
    user_id: i64,
    post_id: i64,
    action: LikeAction,
) -> Result<LikeOutcome, LikeError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let post_exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;
    if !post_exists {
        return Err(LikeError::PostNotFound(post_id));
    }

    let existing = find_like(&tx, user_id, post_id)?;

    match (action, existing) {
        (LikeAction::Like, Some(_)) => return Err(LikeError::DuplicateAction),
        (LikeAction::Unlike, None) => return Err(LikeError::InvalidAction),
        (LikeAction::Like, None) => {
            tx.execute(
                "INSERT INTO post_likes (user_id, post_id) VALUES (?1, ?2)",
                params![user_id, post_id],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LikeError::DuplicateAction
                } else {
                    LikeError::Database(e)
                }
            })?;
            tx.execute(
                "UPDATE posts
                 SET like_count = CASE WHEN like_count < 0 THEN 1 ELSE like_count + 1 END
                 WHERE id = ?1",
                params![post_id],
            )?;
        }
        (LikeAction::Unlike, Some(like)) => {
            tx.execute("DELETE FROM post_likes WHERE id = ?1", params![like.id])?;
            tx.execute(
                "UPDATE posts
                 SET like_count = CASE WHEN like_count > 0 THEN like_count - 1 ELSE 0 END
                 WHERE id = ?1",
                params![post_id],
            )?;
        }
    }

    let post = tx.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
        params![post_id],
        Post::from_row,
    )?;
    tx.commit()?;

    tracing::debug!(
        user_id,
        post_id,
        action = action.as_str(),
        like_count = post.like_count,
        "Like transition applied"
    );

    Ok(LikeOutcome {
        post,
        has_liked: action == LikeAction::Like,
    })
}

pub fn find_like(
    conn: &Connection,
    user_id: i64,
    post_id: i64,
) -> rusqlite::Result<Option<PostLike>> {
    conn.query_row(
        "SELECT id, user_id, post_id, created_at FROM post_likes
         WHERE user_id = ?1 AND post_id = ?2",
        params![user_id, post_id],
        |row| {
            Ok(PostLike {
                id: row.get(0)?,
                user_id: row.get(1)?,
                post_id: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn has_liked(conn: &Connection, user_id: i64, post_id: i64) -> rusqlite::Result<bool> {
    Ok(find_like(conn, user_id, post_id)?.is_some())
}

/// Rebuild every drifted `like_count` from its membership rows.
/// Returns the number of posts whose counter changed.
pub fn reconcile_like_counts(conn: &Connection) -> rusqlite::Result<usize> {
    let corrected = conn.execute(
        "UPDATE posts
         SET like_count = (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = posts.id)
         WHERE like_count != (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = posts.id)",
        [],
    )?;

    if corrected > 0 {
        tracing::warn!(corrected, "Reconciled drifted like counters");
    } else {
        tracing::info!("Like counters consistent with membership rows");
    }
    Ok(corrected)
}
