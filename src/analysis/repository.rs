// Persistence for query analyses, browsed from the debug endpoints
use async_trait::async_trait;
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::analysis::QueryAnalysis;
use crate::pagination::{self, Pagination};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysis {
    pub id: i64,
    #[serde(flatten)]
    pub analysis: QueryAnalysis,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFilter {
    pub has_table_scan: Option<bool>,
    pub min_execution_time: Option<f64>,
    pub max_execution_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPage {
    pub analyses: Vec<StoredAnalysis>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub total_queries: i64,
    pub table_scan_queries: i64,
    pub avg_execution_time: f64,
    pub slow_queries: i64,
    pub table_scan_percentage: f64,
}

#[async_trait]
pub trait QueryAnalysisRepository: Send + Sync {
    /// Store an analysis, returning its id
    async fn save(&self, analysis: &QueryAnalysis) -> Result<i64, RepositoryError>;

    /// Newest first, filtered; `total` counts the filtered set
    async fn list(
        &self,
        filter: &AnalysisFilter,
        page: u32,
        limit: u32,
    ) -> Result<AnalysisPage, RepositoryError>;

    /// Aggregates; analyses at or above `slow_ms` count as slow
    async fn stats(&self, slow_ms: f64) -> Result<AnalysisStats, RepositoryError>;

    /// Slowest analyses first
    async fn top_slow(&self, limit: u32) -> Result<Vec<StoredAnalysis>, RepositoryError>;

    /// Keep only the `keep` newest analyses, returning how many were deleted
    async fn prune(&self, keep: u32) -> Result<usize, RepositoryError>;
}

pub struct SqliteQueryAnalysisRepository {
    pool: DbPool,
}

impl SqliteQueryAnalysisRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const ANALYSIS_COLUMNS: &str = "id, query, params, plan, has_table_scan, has_index_usage, \
     estimated_cost, warnings, execution_time_ms, created_at";

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredAnalysis> {
    Ok(StoredAnalysis {
        id: row.get(0)?,
        analysis: QueryAnalysis {
            query: row.get(1)?,
            params: json_column(row, 2)?,
            plan: json_column(row, 3)?,
            has_table_scan: row.get(4)?,
            has_index_usage: row.get(5)?,
            estimated_cost: row.get(6)?,
            warnings: json_column(row, 7)?,
            execution_time_ms: row.get(8)?,
        },
        created_at: row.get(9)?,
    })
}

impl AnalysisFilter {
    fn where_clause(&self) -> String {
        let mut conditions = Vec::new();
        if self.has_table_scan.is_some() {
            conditions.push("has_table_scan = :has_table_scan");
        }
        if self.min_execution_time.is_some() {
            conditions.push("execution_time_ms >= :min_execution_time");
        }
        if self.max_execution_time.is_some() {
            conditions.push("execution_time_ms <= :max_execution_time");
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    fn params(&self) -> Vec<(&str, &dyn ToSql)> {
        let mut out: Vec<(&str, &dyn ToSql)> = Vec::new();
        if let Some(ref v) = self.has_table_scan {
            out.push((":has_table_scan", v));
        }
        if let Some(ref v) = self.min_execution_time {
            out.push((":min_execution_time", v));
        }
        if let Some(ref v) = self.max_execution_time {
            out.push((":max_execution_time", v));
        }
        out
    }
}

#[async_trait]
impl QueryAnalysisRepository for SqliteQueryAnalysisRepository {
    async fn save(&self, analysis: &QueryAnalysis) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO query_analyses
               (query, params, plan, has_table_scan, has_index_usage,
                estimated_cost, warnings, execution_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                analysis.query,
                serde_json::to_string(&analysis.params)?,
                serde_json::to_string(&analysis.plan)?,
                analysis.has_table_scan,
                analysis.has_index_usage,
                analysis.estimated_cost,
                serde_json::to_string(&analysis.warnings)?,
                analysis.execution_time_ms,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    async fn list(
        &self,
        filter: &AnalysisFilter,
        page: u32,
        limit: u32,
    ) -> Result<AnalysisPage, RepositoryError> {
        let conn = self.pool.get()?;
        let page = page.max(1);
        let limit = limit.max(1);
        let where_clause = filter.where_clause();
        let limit_param = i64::from(limit);
        let offset = pagination::sql_offset(page, limit);

        let mut page_params = filter.params();
        page_params.push((":limit", &limit_param));
        page_params.push((":offset", &offset));

        let tx = conn.unchecked_transaction()?;
        let analyses = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ANALYSIS_COLUMNS} FROM query_analyses{where_clause}
                 ORDER BY created_at DESC, id DESC LIMIT :limit OFFSET :offset"
            ))?;
            let rows = stmt.query_map(page_params.as_slice(), stored_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let total: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM query_analyses{where_clause}"),
            filter.params().as_slice(),
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(AnalysisPage {
            analyses,
            pagination: Pagination::new(page, limit, total.max(0) as u64),
        })
    }

    async fn stats(&self, slow_ms: f64) -> Result<AnalysisStats, RepositoryError> {
        let conn = self.pool.get()?;

        let (total_queries, table_scan_queries, avg_execution_time, slow_queries): (
            i64,
            i64,
            f64,
            i64,
        ) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(has_table_scan), 0),
                    COALESCE(AVG(execution_time_ms), 0.0),
                    COALESCE(SUM(execution_time_ms >= ?1), 0)
             FROM query_analyses",
            params![slow_ms],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let table_scan_percentage = if total_queries > 0 {
            table_scan_queries as f64 / total_queries as f64 * 100.0
        } else {
            0.0
        };

        Ok(AnalysisStats {
            total_queries,
            table_scan_queries,
            avg_execution_time,
            slow_queries,
            table_scan_percentage,
        })
    }

    async fn top_slow(&self, limit: u32) -> Result<Vec<StoredAnalysis>, RepositoryError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM query_analyses
             ORDER BY execution_time_ms DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![i64::from(limit.max(1))], stored_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn prune(&self, keep: u32) -> Result<usize, RepositoryError> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM query_analyses WHERE id NOT IN (
                SELECT id FROM query_analyses ORDER BY created_at DESC, id DESC LIMIT ?1
             )",
            params![i64::from(keep)],
        )?;
        Ok(deleted)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynQueryAnalysisRepository = Arc<dyn QueryAnalysisRepository>;
