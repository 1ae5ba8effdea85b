//! Generic DTO scaffolding for paged admin endpoints.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

impl<T> PagedResponse<T> {
    pub fn new(mut items: Vec<T>, page: usize, size: usize) -> Self {
        let total = items.len();
        let start = page.saturating_mul(size).min(items.len());
        let end = start.saturating_add(size).min(items.len());
        items = items.drain(start..end).collect();
        Self { items, page, size, total }
    }
}
