use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// A user as stored. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

impl User {
    pub fn public(&self) -> Author {
        Author {
            id: self.id,
            username: self.username.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Public projection of a user, embedded in post listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub like_count: i64,
    pub created_at: String,
}

/// Column list matching [`Post::from_row`], for a `posts` table aliased as `p`.
pub const POST_COLUMNS: &str = "p.id, p.title, p.content, p.author_id, p.like_count, p.created_at";

impl Post {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            author_id: row.get(3)?,
            like_count: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithAuthor {
    #[serde(flatten)]
    pub post: Post,
    pub author: Author,
}

/// Membership row: its existence means the user currently likes the post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostLike {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: String,
}
