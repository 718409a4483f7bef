//! Pagination types for list operations.

use serde::{Deserialize, Serialize};

/// A request for a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// The page number (0-indexed).
    pub page: u32,
    /// The number of items per page.
    pub size: u32,
}

impl PageRequest {
    /// The default page size.
    pub const DEFAULT_SIZE: u32 = 20;
    /// The maximum allowed page size.
    pub const MAX_SIZE: u32 = 100;

    /// Creates a new page request, clamping the size to `1..=MAX_SIZE`.
    #[must_use]
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    /// Creates a page request for the first page with default size.
    #[must_use]
    pub fn first() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }

    /// Returns the offset for database queries.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }

    /// Returns the limit for database queries.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items on this page.
    pub content: Vec<T>,
    /// The current page number (0-indexed).
    pub page: u32,
    /// The number of items per page.
    pub size: u32,
    /// The total number of items across all pages.
    pub total_elements: u64,
}

impl<T> Page<T> {
    /// Creates a new page.
    #[must_use]
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
        }
    }

    /// Total number of pages.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(u64::from(self.size))
    }

    /// Whether this is the last page.
    #[must_use]
    pub fn is_last(&self) -> bool {
        u64::from(self.page) + 1 >= self.total_pages()
    }

    /// Returns true if the page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns the number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_offset() {
        let req = PageRequest::new(2, 10);
        assert_eq!(req.offset(), 20);
        assert_eq!(req.limit(), 10);
    }

    #[test]
    fn test_page_request_clamps_size() {
        assert_eq!(PageRequest::new(0, 1_000).size, PageRequest::MAX_SIZE);
        assert_eq!(PageRequest::new(0, 0).size, 1);
    }

    #[test]
    fn test_page_totals() {
        let page = Page::new(vec![1, 2, 3], PageRequest::new(0, 3), 7);
        assert_eq!(page.total_pages(), 3);
        assert!(!page.is_last());
        assert_eq!(page.len(), 3);

        let last = Page::new(vec![7], PageRequest::new(2, 3), 7);
        assert!(last.is_last());
    }

    #[test]
    fn test_empty_page() {
        let page: Page<u8> = Page::new(Vec::new(), PageRequest::first(), 0);
        assert!(page.is_empty());
        assert_eq!(page.total_pages(), 0);
        assert!(page.is_last());
    }
}
