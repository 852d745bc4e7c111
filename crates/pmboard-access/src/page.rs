//! Offset pagination shared by every list endpoint.

use serde::Serialize;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// A validated page request: `page >= 1`, `1 <= limit <= MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Parse raw query values leniently: unparsable or non-positive input
    /// falls back to the defaults, oversized limits are clamped.
    pub fn from_query(page: Option<&str>, limit: Option<&str>, default_limit: usize) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(default_limit);
        Self::new(page, limit)
    }

    fn offset(&self) -> usize {
        (self.page - 1) * self.limit
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Slice an already filtered and ordered collection.
    pub fn slice(all: Vec<T>, req: PageRequest) -> Page<T> {
        let total = all.len();
        let items = all.into_iter().skip(req.offset()).take(req.limit).collect();
        Page {
            items,
            total,
            page: req.page,
            limit: req.limit,
            total_pages: total.div_ceil(req.limit),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}
