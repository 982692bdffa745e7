pub mod auth;
pub mod debug;
pub mod demo;
pub mod posts;
pub mod stats;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router with request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(debug::router())
        .merge(stats::router())
        .merge(demo::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
