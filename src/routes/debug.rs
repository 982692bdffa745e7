use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::analysis::repository::{AnalysisFilter, AnalysisPage};
use crate::analysis::{self, QueryAnalysis, QueryAnalyzer};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::likes;
use crate::pagination::parse_positive;
use crate::state::AppState;

const DEFAULT_SLOW_LIMIT: u32 = 10;

/// An analysis as returned to clients, with advisory text attached.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub analysis: QueryAnalysis,
    pub recommendations: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalysesParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub has_table_scan: Option<String>,
    pub min_execution_time: Option<String>,
    pub max_execution_time: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct SlowParams {
    pub limit: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/debug/query-analysis",
            get(example_analyses).post(analyze_queries),
        )
        .route("/debug/query-analyses", get(list_analyses))
        .route("/debug/query-analyses/stats", get(analysis_stats))
        .route("/debug/query-analyses/slow", get(slow_analyses))
        .route("/debug/reconcile-likes", post(reconcile_likes))
}

/// The raw `queries` array. Entries are decoded one by one during analysis.
fn parse_entries(body: &Value) -> AppResult<Vec<Value>> {
    body.get("queries")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| AppError::BadRequest("Invalid queries array".into()))
}

/// Run an analysis job off the async runtime, then log, store and annotate each result.
async fn run_batch<F>(state: &AppState, job: F) -> AppResult<Vec<AnalysisReport>>
where
    F: FnOnce(&QueryAnalyzer) -> Vec<QueryAnalysis> + Send + 'static,
{
    let analyzer = state.analyzer.clone();
    let results = tokio::task::spawn_blocking(move || job(analyzer.as_ref()))
        .await
        .map_err(|e| AppError::Internal(format!("Analysis task failed: {e}")))?;

    let config = &state.config.analysis;
    let mut reports = Vec::with_capacity(results.len());
    for analysis in results {
        analysis::log_analysis(&analysis, config.cost_recommendation_threshold);
        if config.persist {
            if let Err(e) = state.analyses.save(&analysis).await {
                tracing::warn!(error = %e, "Failed to store query analysis");
            }
        }
        reports.push(AnalysisReport {
            recommendations: analysis::recommendations(
                &analysis,
                config.cost_recommendation_threshold,
            ),
            analysis,
        });
    }

    if config.persist && !reports.is_empty() {
        match state.analyses.prune(config.max_stored).await {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, "Pruned stored query analyses"),
            Err(e) => tracing::warn!(error = %e, "Failed to prune query analyses"),
        }
    }
    Ok(reports)
}

async fn analyze_queries(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body.map_err(|_| AppError::BadRequest("Invalid queries array".into()))?;
    let entries = parse_entries(&body)?;
    let analyses = run_batch(&state, move |analyzer| analyzer.analyze_values(&entries)).await?;

    Ok(Json(json!({ "success": true, "analyses": analyses })).into_response())
}

async fn example_analyses(State(state): State<AppState>) -> AppResult<Response> {
    let analyses = run_batch(&state, |analyzer| {
        analyzer.analyze_batch(&analysis::example_queries())
    })
    .await?;
    Ok(Json(json!({ "success": true, "exampleAnalyses": analyses })).into_response())
}

fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::trim) {
        Some("true") | Some("1") => Some(true),
        Some("false") | Some("0") => Some(false),
        _ => None,
    }
}

fn parse_millis(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

async fn list_analyses(
    State(state): State<AppState>,
    Query(params): Query<AnalysesParams>,
) -> AppResult<Json<AnalysisPage>> {
    let filter = AnalysisFilter {
        has_table_scan: parse_flag(params.has_table_scan.as_deref()),
        min_execution_time: parse_millis(params.min_execution_time.as_deref()),
        max_execution_time: parse_millis(params.max_execution_time.as_deref()),
    };
    let page = parse_positive(params.page.as_deref(), 1);
    let limit = parse_positive(params.limit.as_deref(), state.config.feed.default_limit)
        .min(state.config.feed.max_limit);

    Ok(Json(state.analyses.list(&filter, page, limit).await?))
}

async fn analysis_stats(State(state): State<AppState>) -> AppResult<Response> {
    let stats = state
        .analyses
        .stats(state.config.analysis.slow_query_ms)
        .await?;
    Ok(Json(json!({ "success": true, "stats": stats })).into_response())
}

async fn slow_analyses(
    State(state): State<AppState>,
    Query(params): Query<SlowParams>,
) -> AppResult<Response> {
    let limit = parse_positive(params.limit.as_deref(), DEFAULT_SLOW_LIMIT)
        .min(state.config.feed.max_limit);
    let analyses = state.analyses.top_slow(limit).await?;
    Ok(Json(json!({ "success": true, "analyses": analyses })).into_response())
}

async fn reconcile_likes(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let corrected = likes::reconcile_like_counts(&conn)?;
    tracing::info!(user = %user.username, corrected, "Like counters reconciled on request");

    Ok(Json(json!({ "success": true, "corrected": corrected })).into_response())
}
