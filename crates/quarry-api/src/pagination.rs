//! # Pagination Adapter
//!
//! Exposes a [`Page`] as the `meta.pagination` block of a paginated response:
//!
//! ```json
//! {
//!   "pagination": {
//!     "total": 42, "count": 10, "per_page": 10,
//!     "current_page": 2, "total_pages": 5,
//!     "links": { "previous": "/users?page=1", "next": "/users?page=3" }
//!   }
//! }
//! ```
//!
//! Links are only emitted when the adapter knows the base URL.

use serde::Serialize;

use quarry_core::Page;

/// What a paginated transform needs to know about its page.
pub trait Paginator {
    fn current_page(&self) -> u64;
    fn last_page(&self) -> u64;
    fn total(&self) -> u64;
    /// Items on this page.
    fn count(&self) -> u64;
    fn per_page(&self) -> u64;
    /// URL of another page, when one can be built.
    fn url(&self, page: u64) -> Option<String>;
}

/// [`Paginator`] over a repository [`Page`].
#[derive(Debug, Clone)]
pub struct PageAdapter<'a> {
    page: &'a Page,
    base_url: Option<String>,
}

impl<'a> PageAdapter<'a> {
    pub fn new(page: &'a Page) -> Self {
        PageAdapter {
            page,
            base_url: None,
        }
    }

    /// Base URL for page links; `?page=N` (or `&page=N`) is appended.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl Paginator for PageAdapter<'_> {
    fn current_page(&self) -> u64 {
        self.page.current_page
    }

    fn last_page(&self) -> u64 {
        self.page.last_page()
    }

    fn total(&self) -> u64 {
        self.page.total
    }

    fn count(&self) -> u64 {
        self.page.count() as u64
    }

    fn per_page(&self) -> u64 {
        self.page.per_page
    }

    fn url(&self, page: u64) -> Option<String> {
        let base = self.base_url.as_ref()?;
        let separator = if base.contains('?') { '&' } else { '?' };
        Some(format!("{}{}page={}", base, separator, page))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaginationLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub count: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub links: PaginationLinks,
}

impl PaginationMeta {
    pub fn from_paginator(paginator: &dyn Paginator) -> Self {
        let current = paginator.current_page();
        let last = paginator.last_page();

        let links = PaginationLinks {
            previous: (current > 1).then(|| paginator.url(current - 1)).flatten(),
            next: (current < last).then(|| paginator.url(current + 1)).flatten(),
        };

        PaginationMeta {
            total: paginator.total(),
            count: paginator.count(),
            per_page: paginator.per_page(),
            current_page: current,
            total_pages: last,
            links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_from_page() {
        let page = Page::new(Vec::new(), 2, 10, 42);
        let meta = PaginationMeta::from_paginator(&PageAdapter::new(&page));

        assert_eq!(meta.total_pages, 5);
        assert_eq!(meta.current_page, 2);
        assert_eq!(
            serde_json::to_value(&meta).unwrap()["links"],
            json!({})
        );
    }

    #[test]
    fn test_links_need_a_base_url() {
        let page = Page::new(Vec::new(), 2, 10, 42);
        let adapter = PageAdapter::new(&page).with_base_url("/users?sort=name");
        let meta = PaginationMeta::from_paginator(&adapter);

        assert_eq!(meta.links.previous.as_deref(), Some("/users?sort=name&page=1"));
        assert_eq!(meta.links.next.as_deref(), Some("/users?sort=name&page=3"));

        let last = Page::new(Vec::new(), 5, 10, 42);
        let meta = PaginationMeta::from_paginator(&PageAdapter::new(&last).with_base_url("/users"));
        assert_eq!(meta.links.previous.as_deref(), Some("/users?page=4"));
        assert!(meta.links.next.is_none());
    }
}
