//! Paginated, searchable, sortable post feed.

use rusqlite::types::ToSql;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::models::{Author, Post, PostWithAuthor, POST_COLUMNS};
use crate::pagination::{self, Pagination};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Likes,
}

impl SortBy {
    /// Unknown keys fall back to date ordering.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("likes") => SortBy::Likes,
            _ => SortBy::Date,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            SortBy::Date => "p.created_at DESC, p.id DESC",
            SortBy::Likes => "p.like_count DESC, p.created_at DESC, p.id DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort_by: SortBy,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
            sort_by: SortBy::Date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostWithAuthor>,
    pub pagination: Pagination,
}

const AUTHOR_JOIN: &str = "JOIN users u ON u.id = p.author_id";
const SEARCH_PREDICATE: &str = "(p.title LIKE :pattern ESCAPE '\\' \
     OR p.content LIKE :pattern ESCAPE '\\' \
     OR u.username LIKE :pattern ESCAPE '\\')";

/// Renders the page and count statements from one description, so a
/// filtered listing always counts over the same join and predicate it pages
/// over.
struct PostQuery {
    pattern: Option<String>,
    sort_by: SortBy,
}

impl PostQuery {
    fn new(search: Option<&str>, sort_by: SortBy) -> Self {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));
        Self { pattern, sort_by }
    }

    /// The count only needs the author join when the predicate reads `u`.
    fn count_join(&self) -> Option<&'static str> {
        self.pattern.as_ref().map(|_| AUTHOR_JOIN)
    }

    fn predicate(&self) -> Option<&'static str> {
        self.pattern.as_ref().map(|_| SEARCH_PREDICATE)
    }

    fn where_clause(&self) -> String {
        self.predicate()
            .map(|p| format!(" WHERE {p}"))
            .unwrap_or_default()
    }

    fn page_sql(&self) -> String {
        format!(
            "SELECT {POST_COLUMNS}, u.id, u.username, u.created_at FROM posts p {AUTHOR_JOIN}{} \
             ORDER BY {} LIMIT :limit OFFSET :offset",
            self.where_clause(),
            self.sort_by.order_by()
        )
    }

    fn count_sql(&self) -> String {
        let join = self
            .count_join()
            .map(|j| format!(" {j}"))
            .unwrap_or_default();
        format!("SELECT COUNT(*) FROM posts p{join}{}", self.where_clause())
    }

    fn filter_params(&self) -> Vec<(&str, &dyn ToSql)> {
        match &self.pattern {
            Some(pattern) => vec![(":pattern", pattern as &dyn ToSql)],
            None => Vec::new(),
        }
    }
}

/// Escape `LIKE` wildcards so the term matches as a literal substring.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn list_posts(conn: &Connection, query: &FeedQuery) -> rusqlite::Result<PostPage> {
    let page = query.page.max(1);
    let limit = query.limit.max(1);
    let offset = pagination::sql_offset(page, limit);
    let limit_param = i64::from(limit);

    let post_query = PostQuery::new(query.search.as_deref(), query.sort_by);

    let mut page_params = post_query.filter_params();
    page_params.push((":limit", &limit_param));
    page_params.push((":offset", &offset));

    // Page and count read from one snapshot
    let tx = conn.unchecked_transaction()?;
    let posts = {
        let mut stmt = tx.prepare(&post_query.page_sql())?;
        let rows = stmt.query_map(page_params.as_slice(), |row| {
            Ok(PostWithAuthor {
                post: Post::from_row(row)?,
                author: Author {
                    id: row.get(6)?,
                    username: row.get(7)?,
                    created_at: row.get(8)?,
                },
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let total: i64 = tx.query_row(
        &post_query.count_sql(),
        post_query.filter_params().as_slice(),
        |row| row.get(0),
    )?;
    tx.commit()?;

    Ok(PostPage {
        posts,
        pagination: Pagination::new(page, limit, total.max(0) as u64),
    })
}
