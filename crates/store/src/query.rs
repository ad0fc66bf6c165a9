//! Pagination and per-entity list filters.

use common::{Money, OrderStatus, UserId};
use thiserror::Error;

/// Errors produced when a page request is out of range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("count must be between 1 and {max}, got {got}", max = Page::MAX_COUNT)]
    Count { got: i64 },

    #[error("page must be at least 1, got {got}")]
    Page { got: i64 },
}

/// A validated page request.
///
/// `count` lies in `(0, 100]` and `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: i64,
    count: i64,
}

impl Page {
    /// Largest page size a caller may ask for.
    pub const MAX_COUNT: i64 = 100;

    /// Page size used when the caller does not ask for one.
    pub const DEFAULT_COUNT: i64 = 10;

    /// Validates and creates a page request.
    pub fn new(page: i64, count: i64) -> Result<Self, PageError> {
        if count <= 0 || count > Self::MAX_COUNT {
            return Err(PageError::Count { got: count });
        }
        if page < 1 {
            return Err(PageError::Page { got: page });
        }
        Ok(Self { page, count })
    }

    /// Returns the 1-based page number.
    pub fn page(&self) -> i64 {
        self.page
    }

    /// Returns the maximum number of rows on this page.
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Number of rows to skip: `(page - 1) * count`.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.count)
    }

    /// Applies this page to an iterator already in insertion order.
    pub fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items
            .skip(self.offset() as usize)
            .take(self.count as usize)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            count: Self::DEFAULT_COUNT,
        }
    }
}

/// Filters for listing users. Text filters match case-insensitive substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl UserFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by a username fragment.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = non_empty(username.into());
        self
    }

    /// Filters by an email fragment.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = non_empty(email.into());
        self
    }
}

/// Filters for listing products.
///
/// `name` matches a case-insensitive substring; the price bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
}

impl ProductFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by a name fragment.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = non_empty(name.into());
        self
    }

    /// Keeps products priced at or above `price`.
    pub fn min_price(mut self, price: Money) -> Self {
        self.min_price = Some(price);
        self
    }

    /// Keeps products priced at or below `price`.
    pub fn max_price(mut self, price: Money) -> Self {
        self.max_price = Some(price);
        self
    }
}

/// Filters for listing orders. Both fields match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps orders placed by `user_id`.
    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Keeps orders in `status`.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Case-insensitive substring match used by the in-memory backend.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Wraps a fragment in `%...%` for `ILIKE`, escaping LIKE metacharacters.
pub(crate) fn like_pattern(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
