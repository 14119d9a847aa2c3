//! Pagination and ordering for list queries

use serde::{Deserialize, Serialize};

/// Maximum rows per page
const MAX_PER_PAGE: u32 = 200;

/// Default rows per page
const DEFAULT_PER_PAGE: u32 = 20;

/// Page selection (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Page is clamped to at least 1, per page to 1..=200.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// First page with `per_page` rows.
    pub fn first(per_page: u32) -> Self {
        Self::new(1, per_page)
    }

    /// SQL OFFSET.
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    /// SQL LIMIT.
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One page of rows plus the total across all pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.total <= 0 {
            1
        } else {
            let per_page = self.per_page.max(1) as i64;
            ((self.total + per_page - 1) / per_page).max(1) as u32
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transform the items while keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordering on a named column; the column is checked against the
/// entity's whitelist before it reaches SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: SortOrder::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn offset_calculation() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(2, 10).offset(), 10);
        assert_eq!(Pagination::new(3, 25).offset(), 50);
    }

    #[test]
    fn clamps_page_and_size() {
        assert_eq!(Pagination::new(0, 10).page, 1);
        assert_eq!(Pagination::new(1, 0).per_page, 1);
        assert_eq!(Pagination::new(1, 999).per_page, 200);
    }

    #[test]
    fn total_pages() {
        let page = |total| Paginated::<()>::new(vec![], total, Pagination::new(1, 10));
        assert_eq!(page(0).total_pages(), 1);
        assert_eq!(page(25).total_pages(), 3);
        assert_eq!(page(100).total_pages(), 10);
    }

    #[test]
    fn has_next_prev() {
        let at = |n| Paginated::<()>::new(vec![], 30, Pagination::new(n, 10));
        assert!(at(1).has_next() && !at(1).has_prev());
        assert!(at(2).has_next() && at(2).has_prev());
        assert!(!at(3).has_next() && at(3).has_prev());
    }

    #[test]
    fn map_keeps_metadata() {
        let page = Paginated::new(vec![1, 2, 3], 13, Pagination::new(2, 3)).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20, 30]);
        assert_eq!(page.total, 13);
        assert_eq!(page.page, 2);
    }

    proptest! {
        #[test]
        fn pages_cover_every_row(total in 0i64..10_000, per_page in 1u32..200) {
            let last = Paginated::<()>::new(vec![], total, Pagination::new(1, per_page)).total_pages();
            let covered = Pagination::new(last, per_page).offset() + per_page as i64;
            prop_assert!(covered >= total);
            prop_assert!(Pagination::new(last, per_page).offset() <= total.max(0));
        }
    }
}
