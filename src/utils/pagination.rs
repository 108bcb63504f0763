use serde::Serialize;

const MAX_SKIP: u64 = i64::MAX as u64;

/// Page/limit pair normalized from query parameters (pages are 1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64, max_limit: u64) -> Self {
        let limit = limit.unwrap_or(default_limit).clamp(1, max_limit.max(1));
        // Keeps the offset within what MongoDB accepts as a signed 64-bit skip
        let last_page = MAX_SKIP / limit + 1;
        Self {
            page: page.unwrap_or(1).clamp(1, last_page),
            limit,
        }
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit).min(MAX_SKIP)
    }

    pub fn pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

/// One page of results plus the counters the explorer needs
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            pages: pagination.pages(total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.pages,
        }
    }
}
