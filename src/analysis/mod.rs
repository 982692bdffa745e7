//! Query-plan diagnostics built on SQLite's `EXPLAIN QUERY PLAN`.
//!
//! Every inspection runs on its own read-only connection, so caller-supplied
//! SQL can never mutate data. Failures never escape [`QueryAnalyzer::analyze`]:
//! they come back as an analysis with an empty plan and a warning.

pub mod repository;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of `EXPLAIN QUERY PLAN` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: i64,
    pub parent: i64,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub query: String,
    pub params: Vec<Value>,
    pub plan: Vec<PlanStep>,
    pub has_table_scan: bool,
    pub has_index_usage: bool,
    pub estimated_cost: f64,
    pub warnings: Vec<String>,
    pub execution_time_ms: f64,
}

impl QueryAnalysis {
    /// An analysis that could not run: empty plan, one warning.
    pub fn failed(query: &str, params: &[Value], reason: &str, execution_time_ms: f64) -> Self {
        Self {
            query: query.to_string(),
            params: params.to_vec(),
            plan: Vec::new(),
            has_table_scan: false,
            has_index_usage: false,
            estimated_cost: 0.0,
            warnings: vec![format!("Analysis failed: {reason}")],
            execution_time_ms,
        }
    }
}

/// A query submitted for analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }
}

pub struct QueryAnalyzer {
    db_path: PathBuf,
    cost_warning_threshold: f64,
}

impl QueryAnalyzer {
    pub fn new(db_path: impl AsRef<Path>, cost_warning_threshold: f64) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            cost_warning_threshold,
        }
    }

    pub fn analyze(&self, query: &str, params: &[Value]) -> QueryAnalysis {
        let started = Instant::now();
        let result = self.inspect(query, params);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(plan) => classify(query, params, plan, elapsed_ms, self.cost_warning_threshold),
            Err(e) => {
                tracing::warn!(error = %e, query = %preview(query), "Query analysis failed");
                QueryAnalysis::failed(query, params, &e.to_string(), elapsed_ms)
            }
        }
    }

    /// Analyze each entry in order; one entry failing never affects the others.
    pub fn analyze_batch(&self, entries: &[AnalysisRequest]) -> Vec<QueryAnalysis> {
        entries
            .iter()
            .map(|entry| self.analyze(&entry.query, &entry.params))
            .collect()
    }

    /// Like [`analyze_batch`](Self::analyze_batch) over undecoded JSON entries.
    /// An entry that is not `{query: string, params?: array}` becomes a failed analysis.
    pub fn analyze_values(&self, entries: &[Value]) -> Vec<QueryAnalysis> {
        entries
            .iter()
            .map(|raw| match serde_json::from_value::<AnalysisRequest>(raw.clone()) {
                Ok(entry) => self.analyze(&entry.query, &entry.params),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid analysis entry");
                    QueryAnalysis::failed(
                        &raw_query(raw),
                        &raw_params(raw),
                        &format!("invalid entry: {e}"),
                        0.0,
                    )
                }
            })
            .collect()
    }

    fn inspect(&self, query: &str, params: &[Value]) -> rusqlite::Result<Vec<PlanStep>> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {query}"))?;
        let values: Vec<SqlValue> = params.iter().map(sql_value).collect();

        let plan = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Ok(PlanStep {
                    id: row.get("id")?,
                    parent: row.get("parent")?,
                    detail: row.get("detail")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plan)
    }
}

/// Bind JSON params the way SQLite would store them; nested values bind as JSON text.
fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Derive flags, cost and warnings from a plan.
pub fn classify(
    query: &str,
    params: &[Value],
    plan: Vec<PlanStep>,
    execution_time_ms: f64,
    cost_warning_threshold: f64,
) -> QueryAnalysis {
    let plan_text = plan
        .iter()
        .map(|step| step.detail.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let has_table_scan = plan.iter().any(|step| is_full_scan(&step.detail));
    let has_index_usage = plan_text.contains("INDEX") || plan_text.contains("PRIMARY KEY");
    let estimated_cost = parse_cost(&plan_text).unwrap_or(0.0);

    let mut warnings = Vec::new();
    if has_table_scan {
        warnings.push("Query performs table scan - consider adding indexes".to_string());
    }
    if estimated_cost > cost_warning_threshold {
        warnings.push(format!("High estimated cost: {estimated_cost}"));
    }
    if plan_text.contains("TEMP B-TREE") || plan_text.contains("TEMPORARY TABLE") {
        warnings.push("Query creates temporary structure - may be slow".to_string());
    }

    QueryAnalysis {
        query: query.to_string(),
        params: params.to_vec(),
        plan,
        has_table_scan,
        has_index_usage,
        estimated_cost,
        warnings,
        execution_time_ms,
    }
}

/// `SCAN posts` is a full scan; `SCAN posts USING INDEX ...` walks an index.
/// Older SQLite releases spell the former `SCAN TABLE posts`.
fn is_full_scan(detail: &str) -> bool {
    if detail.contains("FULL TABLE SCAN") {
        return true;
    }
    detail.starts_with("SCAN ")
        && !detail.contains(" USING ")
        && !detail.starts_with("SCAN CONSTANT ROW")
}

fn parse_cost(plan_text: &str) -> Option<f64> {
    static COST: OnceLock<Regex> = OnceLock::new();
    let re = COST.get_or_init(|| Regex::new(r"cost=(\d+(?:\.\d+)?)").expect("valid cost pattern"));
    re.captures(plan_text)?.get(1)?.as_str().parse().ok()
}

/// Advisory text for an analysis; never affects control flow.
pub fn recommendations(analysis: &QueryAnalysis, cost_threshold: f64) -> Vec<String> {
    let mut out = Vec::new();

    if analysis.has_table_scan {
        out.push("Add indexes on columns used in WHERE, ORDER BY, or JOIN clauses".to_string());
    }
    if analysis.estimated_cost > cost_threshold {
        out.push("Consider query optimization or adding more specific indexes".to_string());
    }
    if analysis
        .plan
        .iter()
        .any(|p| p.detail.contains("ORDER BY") || p.detail.contains("SORT"))
    {
        out.push("Sorting detected - ensure ORDER BY columns are indexed".to_string());
    }
    if analysis.plan.iter().any(|p| p.detail.contains("GROUP BY")) {
        out.push("Grouping detected - consider indexes on GROUP BY columns".to_string());
    }

    out
}

pub fn log_analysis(analysis: &QueryAnalysis, cost_threshold: f64) {
    tracing::info!(
        query = %preview(&analysis.query),
        steps = analysis.plan.len(),
        has_table_scan = analysis.has_table_scan,
        has_index_usage = analysis.has_index_usage,
        estimated_cost = analysis.estimated_cost,
        execution_time_ms = analysis.execution_time_ms,
        "Query analysis"
    );
    for warning in &analysis.warnings {
        tracing::warn!(query = %preview(&analysis.query), "{}", warning);
    }
    for rec in recommendations(analysis, cost_threshold) {
        tracing::info!(query = %preview(&analysis.query), "Recommendation: {}", rec);
    }
}

/// Queries shown by the debug endpoint when nothing is submitted.
pub fn example_queries() -> Vec<AnalysisRequest> {
    vec![
        AnalysisRequest::new("SELECT * FROM posts ORDER BY created_at DESC LIMIT 10", vec![]),
        AnalysisRequest::new(
            "SELECT * FROM posts WHERE title LIKE ? ORDER BY like_count DESC",
            vec![Value::String("%test%".into())],
        ),
        AnalysisRequest::new(
            "SELECT p.*, u.username FROM posts p LEFT JOIN users u ON p.author_id = u.id",
            vec![],
        ),
    ]
}

/// Best-effort query text of an entry that failed to decode.
fn raw_query(raw: &Value) -> String {
    match raw.get("query") {
        Some(Value::String(q)) => q.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn raw_params(raw: &Value) -> Vec<Value> {
    raw.get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn preview(query: &str) -> String {
    query.chars().take(50).collect()
}
