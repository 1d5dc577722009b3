use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Aggregate counts returned next to a page, keyed by bucket name.
pub type Stats = BTreeMap<String, i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Non-numeric or out-of-range values fall back to the defaults.
    pub fn parse(page: Option<&str>, page_size: Option<&str>, default_page_size: u32) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let per_page = page_size
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|s| *s >= 1)
            .map(|s| s.min(MAX_PAGE_SIZE))
            .unwrap_or(default_page_size);
        Self { page, per_page }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageMeta {
    pub total: i64,
    pub per_page: u32,
    pub current_page: u32,
    /// `ceil(total / per_page)`; zero for an empty collection.
    pub total_pages: u32,
    /// Like `total_pages` but never below 1.
    pub last_page: u32,
    pub first_page: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

impl PageMeta {
    pub fn new(total: i64, pagination: Pagination) -> Self {
        let per_page = pagination.per_page.max(1);
        let total_pages = ((total.max(0) as u64 + per_page as u64 - 1) / per_page as u64) as u32;
        let current_page = pagination.page;

        Self {
            total,
            per_page,
            current_page,
            total_pages,
            last_page: total_pages.max(1),
            first_page: 1,
            prev_page: (current_page > 1).then(|| current_page - 1),
            next_page: (current_page < total_pages).then(|| current_page + 1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub meta: PageMeta,
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            meta: PageMeta::new(total, pagination),
            data,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            meta: self.meta,
            data: self.data.into_iter().map(f).collect(),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(Pagination::parse(None, None, 10), Pagination { page: 1, per_page: 10 });
        assert_eq!(Pagination::parse(Some("0"), Some("abc"), 10), Pagination { page: 1, per_page: 10 });
        assert_eq!(Pagination::parse(Some("3"), Some("500"), 10), Pagination { page: 3, per_page: MAX_PAGE_SIZE });
    }

    #[test]
    fn page_count_is_ceiling() {
        for (total, size, expected) in [(0, 10, 0), (1, 10, 1), (10, 10, 1), (11, 10, 2), (25, 5, 5)] {
            let meta = PageMeta::new(total, Pagination { page: 1, per_page: size });
            assert_eq!(meta.total_pages, expected, "total={total} size={size}");
        }
    }

    #[test]
    fn prev_and_next_indicators() {
        let meta = PageMeta::new(25, Pagination { page: 2, per_page: 10 });
        assert_eq!(meta.prev_page, Some(1));
        assert_eq!(meta.next_page, Some(3));

        let last = PageMeta::new(25, Pagination { page: 3, per_page: 10 });
        assert_eq!(last.next_page, None);

        let beyond = PageMeta::new(25, Pagination { page: 4, per_page: 10 });
        assert_eq!(beyond.next_page, None);
        assert_eq!(beyond.prev_page, Some(3));
    }
}
