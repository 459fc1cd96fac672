//! Post model and listing helpers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Post entity as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    /// Publication date; a post dated in the future stays hidden until then
    pub pub_date: DateTime<Utc>,
    pub author_id: i64,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating or replacing a post
#[derive(Debug, Clone)]
pub struct PostInput {
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub is_published: bool,
}

/// One row of the admin list's inline edit
#[derive(Debug, Clone, PartialEq)]
pub struct ListingChange {
    pub post_id: i64,
    pub is_published: bool,
    pub category_id: Option<i64>,
}

/// The parts of a category a post listing needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRef {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub is_published: bool,
}

/// The parts of a location a post listing needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationRef {
    pub id: i64,
    pub name: String,
    pub is_published: bool,
}

/// Post joined with author, category, location and comment count.
///
/// This is what every listing and the detail page render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMeta {
    #[serde(flatten)]
    pub post: Post,
    pub author_username: String,
    pub category: Option<CategoryRef>,
    pub location: Option<LocationRef>,
    pub comment_count: i64,
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Number of pages, at least one even for an empty listing
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 1;
        }
        let per_page = self.per_page as i64;
        ((self.total + per_page - 1) / per_page) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Does `page` exist for a listing of `total` items?
pub fn page_exists(page: u32, total: i64, per_page: u32) -> bool {
    let probe: PagedResult<()> = PagedResult {
        items: Vec::new(),
        total,
        page,
        per_page,
    };
    page >= 1 && page <= probe.total_pages()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_list_params_offset() {
        assert_eq!(ListParams::new(1, 10).offset(), 0);
        assert_eq!(ListParams::new(3, 10).offset(), 20);
        assert_eq!(ListParams::new(0, 10).page, 1);
    }

    #[test]
    fn test_empty_listing_has_one_page() {
        let result: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::new(1, 10));
        assert_eq!(result.total_pages(), 1);
        assert!(!result.has_next());
        assert!(!result.has_prev());
        assert!(page_exists(1, 0, 10));
        assert!(!page_exists(2, 0, 10));
    }

    #[test]
    fn test_partial_last_page() {
        let result: PagedResult<i32> = PagedResult::new(vec![], 21, &ListParams::new(2, 10));
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
        assert!(result.has_prev());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn pages_cover_every_item_exactly_once(total in 0i64..500, per_page in 1u32..30) {
            let pages = PagedResult::<()>::new(vec![], total, &ListParams::new(1, per_page)).total_pages();
            let expected = if total == 0 { 1 } else { ((total + per_page as i64 - 1) / per_page as i64) as u32 };
            prop_assert_eq!(pages, expected);

            // Sum of page sizes equals the total
            let mut covered = 0i64;
            for page in 1..=pages {
                let offset = ListParams::new(page, per_page).offset();
                covered += (total - offset).clamp(0, per_page as i64);
            }
            prop_assert_eq!(covered, total);
            prop_assert!(!page_exists(pages + 1, total, per_page));
        }
    }
}
