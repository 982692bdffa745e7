use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::analysis::repository::{DynQueryAnalysisRepository, SqliteQueryAnalysisRepository};
use crate::analysis::QueryAnalyzer;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub analyzer: Arc<QueryAnalyzer>,
    pub analyses: DynQueryAnalysisRepository,
}

impl AppState {
    /// Wire the analyzer and analysis store to an already migrated pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let analyzer = QueryAnalyzer::new(config.db_path(), config.analysis.cost_warning_threshold);
        let analyses = Arc::new(SqliteQueryAnalysisRepository::new(db.clone()));
        Self {
            db,
            config,
            analyzer: Arc::new(analyzer),
            analyses,
        }
    }
}
