//! Pagination and keyword filtering shared by the conversation and message stores.
//!
//! Pages are 1-based. `skip = page_size * (page - 1)` and
//! `page_count = ceil(total / page_size)`.

use crate::error::{AppError, AppResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Missing or zero values fall back to page 1 and `default_size`.
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s >= 1)
            .unwrap_or_else(|| default_size.max(1));
        Self { page, page_size }
    }

    pub fn skip(&self) -> u64 {
        u64::from(self.page_size) * u64::from(self.page - 1)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// `(LIMIT, OFFSET)` as SQL bigints. Pages whose offset does not fit are
    /// rejected rather than wrapped.
    pub fn sql_window(&self) -> AppResult<(i64, i64)> {
        let limit = i64::from(self.page_size);
        let offset = i64::try_from(self.skip()).map_err(|_| {
            AppError::Validation(format!("page {} is out of range", self.page))
        })?;
        Ok((limit, offset))
    }

    pub fn page_count(&self, total: u64) -> u64 {
        total.div_ceil(self.limit())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub page_count: u64,
    pub count: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: &PageRequest, count: u64) -> Self {
        Self {
            items,
            page: request.page,
            page_size: request.page_size,
            page_count: request.page_count(count),
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Trimmed keyword, or `None` when the caller sent nothing searchable.
pub fn normalize_keyword(keyword: Option<&str>) -> Option<String> {
    keyword
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// Case-insensitive substring match. Absent text never matches.
pub fn keyword_matches(text: Option<&str>, keyword: &str) -> bool {
    match text {
        Some(text) => text.to_lowercase().contains(&keyword.to_lowercase()),
        None => false,
    }
}

/// `ILIKE` pattern that matches `keyword` literally anywhere in the column.
pub fn ilike_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
