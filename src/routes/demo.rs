use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::demo::{self, DemoFilter, DemoSort};
use crate::pagination::parse_positive;
use crate::state::AppState;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DemoParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub in_stock_only: Option<String>,
    pub page: Option<String>,
}

impl DemoParams {
    fn into_filter(self) -> DemoFilter {
        DemoFilter {
            search: self.search.unwrap_or_default(),
            category: self.category,
            in_stock_only: matches!(self.in_stock_only.as_deref(), Some("true") | Some("1")),
            sort: DemoSort::parse(self.sort_by.as_deref()),
            page: parse_positive(self.page.as_deref(), 1),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/demo/items", get(list_items))
}

async fn list_items(Query(params): Query<DemoParams>) -> Json<Value> {
    let items = demo::catalog();
    let page = demo::list_items(items, &params.into_filter());

    Json(json!({
        "items": page.items,
        "pagination": page.pagination,
        "categories": demo::categories(items),
    }))
}
