//! Page-based pagination helpers.

use serde::{Deserialize, Serialize};

/// A normalized page request (`page` is 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Page size used when none is supplied.
    pub const DEFAULT_LIMIT: u32 = 20;
    /// Largest accepted page size.
    pub const MAX_LIMIT: u32 = 100;

    /// Build a request from optional query values.
    ///
    /// Missing or zero `page` becomes 1; missing or zero `limit` becomes
    /// [`Self::DEFAULT_LIMIT`]; `limit` is capped at [`Self::MAX_LIMIT`].
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT);
        Self { page, limit }
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Pagination metadata returned alongside a page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_products: u64,
    pub products_per_page: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    /// Compute metadata for `request` given the total number of matches.
    #[must_use]
    pub fn new(request: PageRequest, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(request.limit));
        Self {
            current_page: request.page,
            total_pages,
            total_products: total,
            products_per_page: request.limit,
            has_next: u64::from(request.page) < total_pages,
            has_previous: request.page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        let req = PageRequest::new(None, None);
        assert_eq!((req.page(), req.limit()), (1, 20));

        let req = PageRequest::new(Some(0), Some(0));
        assert_eq!((req.page(), req.limit()), (1, 20));

        let req = PageRequest::new(Some(3), Some(500));
        assert_eq!(req.limit(), PageRequest::MAX_LIMIT);
        assert_eq!(req.offset(), 200);
    }

    #[test]
    fn test_pagination_flags() {
        let meta = Pagination::new(PageRequest::new(Some(2), Some(10)), 25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_previous);

        let last = Pagination::new(PageRequest::new(Some(3), Some(10)), 25);
        assert!(!last.has_next);

        let empty = Pagination::new(PageRequest::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_previous);
    }
}
