//! Generated catalog for the listing demo.
//!
//! The dataset is a fixed, deterministic sequence; every listing is a pure
//! function of (items, filters), so nothing here is shared or mutable.

use std::sync::OnceLock;

use serde::Serialize;

use crate::pagination::{self, Pagination};

pub const CATALOG_SIZE: usize = 5000;
pub const PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoItem {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub price: u32,
    pub category: String,
    pub tags: Vec<String>,
    pub in_stock: bool,
    pub rating: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DemoSort {
    #[default]
    Name,
    Price,
    Rating,
}

impl DemoSort {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("price") => DemoSort::Price,
            Some("rating") => DemoSort::Rating,
            _ => DemoSort::Name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DemoFilter {
    pub search: String,
    /// `None` or `"all"` matches every category
    pub category: Option<String>,
    pub in_stock_only: bool,
    pub sort: DemoSort,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoPage {
    pub items: Vec<DemoItem>,
    pub pagination: Pagination,
}

/// Deterministic pseudo-random value in `[0, 1)` for a seed.
fn seeded_random(seed: u32) -> f64 {
    let x = f64::from(seed).sin() * 10000.0;
    x - x.floor()
}

pub fn generate_items(count: usize) -> Vec<DemoItem> {
    (0..count as u32)
        .map(|i| DemoItem {
            id: i,
            name: format!("Item {i}"),
            description: format!(
                "This is a description for item {i}. It contains some text that makes each item unique."
            ),
            price: (seeded_random(i) * 1000.0).floor() as u32 + 10,
            category: format!("Category {}", i % 10),
            tags: vec![
                format!("tag{}", i % 5),
                format!("tag{}", (i + 1) % 5),
                format!("tag{}", (i + 2) % 5),
            ],
            in_stock: seeded_random(i + 1000) > 0.3,
            rating: (seeded_random(i + 2000) * 5.0).floor() as u8 + 1,
        })
        .collect()
}

/// The process-wide catalog, generated on first use.
pub fn catalog() -> &'static [DemoItem] {
    static ITEMS: OnceLock<Vec<DemoItem>> = OnceLock::new();
    ITEMS.get_or_init(|| generate_items(CATALOG_SIZE))
}

/// Distinct categories in first-seen order, prefixed with `"all"`.
pub fn categories(items: &[DemoItem]) -> Vec<String> {
    let mut out = vec!["all".to_string()];
    for item in items {
        if !out.contains(&item.category) {
            out.push(item.category.clone());
        }
    }
    out
}

pub fn list_items(items: &[DemoItem], filter: &DemoFilter) -> DemoPage {
    let needle = filter.search.trim().to_lowercase();
    let category = filter
        .category
        .as_deref()
        .filter(|c| !c.is_empty() && *c != "all");

    let mut matched: Vec<&DemoItem> = items
        .iter()
        .filter(|item| {
            needle.is_empty()
                || item.name.to_lowercase().contains(&needle)
                || item.description.to_lowercase().contains(&needle)
        })
        .filter(|item| category.map_or(true, |c| item.category == c))
        .filter(|item| !filter.in_stock_only || item.in_stock)
        .collect();

    match filter.sort {
        DemoSort::Name => matched.sort_by_cached_key(|item| item.name.to_lowercase()),
        DemoSort::Price => matched.sort_by_key(|item| item.price),
        DemoSort::Rating => matched.sort_by(|a, b| b.rating.cmp(&a.rating)),
    }

    let page = filter.page.max(1);
    let start = pagination::offset(page, PAGE_SIZE) as usize;
    let items = matched
        .iter()
        .skip(start)
        .take(PAGE_SIZE as usize)
        .map(|item| (*item).clone())
        .collect();

    DemoPage {
        items,
        pagination: Pagination::new(page, PAGE_SIZE, matched.len() as u64),
    }
}
