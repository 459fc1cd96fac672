//! Post service
//!
//! Feeds, the detail page lookup, author-only mutations and the staff
//! operations behind the admin post screens. Every paginated listing goes
//! through [`PostService::paginate`], which treats a page past the end as
//! not found.

use crate::db::repositories::{CategoryRepository, LocationRepository, PostFilter, PostRepository};
use crate::models::{page_exists, ListParams, ListingChange, PagedResult, Post, PostInput, PostWithMeta, User};
use crate::services::validation::FieldErrors;
use crate::services::visibility::{self, EditDecision};
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const TITLE_MAX_LENGTH: usize = 256;

/// Datetime format of `<input type="datetime-local">`
pub const PUB_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

const PUB_DATE_FALLBACK_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    /// The viewer is not the author; handlers send them to the detail page
    #[error("Only the author may change post {0}")]
    Forbidden(i64),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for PostServiceError {
    fn from(errors: FieldErrors) -> Self {
        PostServiceError::ValidationError(errors)
    }
}

/// Post form contents as submitted, before parsing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostDraft {
    pub title: String,
    pub text: String,
    pub pub_date: String,
    /// Category ID, empty when none was chosen
    pub category_id: String,
    /// Location ID, empty when none was chosen
    pub location_id: String,
    pub is_published: bool,
}

impl PostDraft {
    /// A blank form: published, dated now
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            pub_date: now.format(PUB_DATE_FORMAT).to_string(),
            is_published: true,
            ..Self::default()
        }
    }

    /// Prefill from a stored post
    pub fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            text: post.text.clone(),
            pub_date: post.pub_date.format(PUB_DATE_FORMAT).to_string(),
            category_id: post.category_id.map(|id| id.to_string()).unwrap_or_default(),
            location_id: post.location_id.map(|id| id.to_string()).unwrap_or_default(),
            is_published: post.is_published,
        }
    }
}

/// Search and filter of the admin post list
#[derive(Debug, Clone, Default)]
pub struct AdminPostQuery {
    pub q: Option<String>,
    pub category_id: Option<i64>,
}

/// Parse a submitted publication date as UTC
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    std::iter::once(PUB_DATE_FORMAT)
        .chain(PUB_DATE_FALLBACK_FORMATS.iter().copied())
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn admin_filter(query: &AdminPostQuery) -> PostFilter {
    let mut filter = PostFilter::all();
    if let Some(q) = &query.q {
        filter = filter.title_contains(q);
    }
    if let Some(id) = query.category_id {
        filter = filter.in_category(id);
    }
    filter
}

/// Post service
pub struct PostService {
    repo: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    locations: Arc<dyn LocationRepository>,
    per_page: u32,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        locations: Arc<dyn LocationRepository>,
        per_page: u32,
    ) -> Self {
        Self {
            repo,
            categories,
            locations,
            per_page: per_page.max(1),
        }
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// The index feed
    pub async fn list_public(&self, page: u32) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        self.paginate(&PostFilter::public(Utc::now()), page).await
    }

    /// Public posts of one category; the caller has already checked that
    /// the category itself is published
    pub async fn list_in_category(
        &self,
        category_id: i64,
        page: u32,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        self.paginate(&PostFilter::public(Utc::now()).in_category(category_id), page)
            .await
    }

    /// A profile's posts: all of them for the owner, the public ones for
    /// everyone else
    pub async fn list_for_profile(
        &self,
        profile: &User,
        viewer: Option<&User>,
        page: u32,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let filter = if visibility::can_see_unpublished_in_profile(profile, viewer) {
            PostFilter::all().by_author(profile.id)
        } else {
            PostFilter::public(Utc::now()).by_author(profile.id)
        };
        self.paginate(&filter, page).await
    }

    /// Any post by ID
    pub async fn get(&self, id: i64) -> Result<PostWithMeta, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
    }

    /// A post the viewer may read; anything else is `NotFound`
    pub async fn get_viewable(&self, id: i64, viewer: Option<&User>) -> Result<PostWithMeta, PostServiceError> {
        let post = self.get(id).await?;
        if visibility::can_view(&post, viewer, Utc::now()) {
            Ok(post)
        } else {
            Err(PostServiceError::NotFound(id.to_string()))
        }
    }

    /// A post the editor may change, else `Forbidden`
    pub async fn get_editable(&self, id: i64, editor: &User) -> Result<PostWithMeta, PostServiceError> {
        let post = self.get(id).await?;
        match visibility::can_edit_post(&post, editor) {
            EditDecision::Allow => Ok(post),
            EditDecision::RedirectToDetail => Err(PostServiceError::Forbidden(id)),
        }
    }

    /// A post the viewer may delete; others' posts are `NotFound`
    pub async fn get_deletable(&self, id: i64, viewer: &User) -> Result<PostWithMeta, PostServiceError> {
        let post = self.get(id).await?;
        if visibility::can_delete_post(&post, viewer) {
            Ok(post)
        } else {
            Err(PostServiceError::NotFound(id.to_string()))
        }
    }

    pub async fn create(&self, author: &User, draft: &PostDraft) -> Result<Post, PostServiceError> {
        let input = self.parse_draft(draft).await?;
        let post = self
            .repo
            .create(author.id, &input)
            .await
            .context("Failed to create post")?;

        tracing::info!(post_id = post.id, author_id = author.id, "Post created");
        Ok(post)
    }

    pub async fn update(&self, id: i64, editor: &User, draft: &PostDraft) -> Result<(), PostServiceError> {
        self.get_editable(id, editor).await?;
        let input = self.parse_draft(draft).await?;
        self.repo
            .update(id, &input)
            .await
            .context("Failed to update post")?;
        Ok(())
    }

    /// Delete a post with its comments
    pub async fn delete(&self, id: i64, viewer: &User) -> Result<(), PostServiceError> {
        self.get_deletable(id, viewer).await?;
        self.repo.delete(id).await.context("Failed to delete post")?;
        tracing::info!(post_id = id, user_id = viewer.id, "Post deleted");
        Ok(())
    }

    // Staff operations. These bypass the ownership rules; the admin
    // handlers gate them on `is_staff`.

    /// Admin list: every post, searchable and filterable
    pub async fn admin_list(
        &self,
        query: &AdminPostQuery,
        page: u32,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        self.paginate(&admin_filter(query), page).await
    }

    /// Last page of the admin list for `query`; 1 when it is empty
    pub async fn admin_last_page(&self, query: &AdminPostQuery) -> Result<u32, PostServiceError> {
        let total = self
            .repo
            .count(&admin_filter(query))
            .await
            .context("Failed to count posts")?;
        let empty = PagedResult::<PostWithMeta>::new(Vec::new(), total, &ListParams::new(1, self.per_page));
        Ok(empty.total_pages())
    }

    /// All posts of a category, for the inline list on its change screen
    pub async fn all_in_category(&self, category_id: i64) -> Result<Vec<PostWithMeta>, PostServiceError> {
        self.list_all(&PostFilter::all().in_category(category_id)).await
    }

    /// All posts at a location, for the inline list on its change screen
    pub async fn all_at_location(&self, location_id: i64) -> Result<Vec<PostWithMeta>, PostServiceError> {
        self.list_all(&PostFilter::all().at_location(location_id)).await
    }

    pub async fn count_all(&self) -> Result<i64, PostServiceError> {
        Ok(self
            .repo
            .count(&PostFilter::all())
            .await
            .context("Failed to count posts")?)
    }

    /// Replace a post's fields on behalf of its author
    pub async fn admin_update(&self, id: i64, draft: &PostDraft) -> Result<(), PostServiceError> {
        self.get(id).await?;
        let input = self.parse_draft(draft).await?;
        self.repo
            .update(id, &input)
            .await
            .context("Failed to update post")?;
        Ok(())
    }

    pub async fn admin_delete(&self, id: i64) -> Result<(), PostServiceError> {
        self.get(id).await?;
        self.repo.delete(id).await.context("Failed to delete post")?;
        tracing::info!(post_id = id, "Post deleted by staff");
        Ok(())
    }

    /// Save the admin list's inline `is_published` and category columns.
    ///
    /// Either every row is valid and all are written, or nothing is.
    pub async fn apply_listing_changes(&self, changes: &[ListingChange]) -> Result<usize, PostServiceError> {
        let mut errors = FieldErrors::new();
        for change in changes {
            let field = format!("post-{}", change.post_id);
            if self
                .repo
                .get_by_id(change.post_id)
                .await
                .context("Failed to get post")?
                .is_none()
            {
                errors.add(&field, "Post no longer exists.");
            }
            if let Some(category_id) = change.category_id {
                if self
                    .categories
                    .get_by_id(category_id)
                    .await
                    .context("Failed to get category")?
                    .is_none()
                {
                    errors.add(&field, "Select a valid choice. That choice is not one of the available choices.");
                }
            }
        }
        errors.into_result()?;

        self.repo
            .update_listing_fields(changes)
            .await
            .context("Failed to update post listing fields")?;
        Ok(changes.len())
    }

    /// Validate a draft into the input a repository stores, without saving it
    pub async fn prepare_draft(&self, draft: &PostDraft) -> Result<PostInput, PostServiceError> {
        self.parse_draft(draft).await
    }

    async fn paginate(&self, filter: &PostFilter, page: u32) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let total = self.repo.count(filter).await.context("Failed to count posts")?;
        if !page_exists(page, total, self.per_page) {
            return Err(PostServiceError::NotFound(format!("page {}", page)));
        }

        let params = ListParams::new(page, self.per_page);
        let items = self
            .repo
            .list(filter, params.offset(), params.limit())
            .await
            .context("Failed to list posts")?;

        Ok(PagedResult::new(items, total, &params))
    }

    async fn list_all(&self, filter: &PostFilter) -> Result<Vec<PostWithMeta>, PostServiceError> {
        let total = self.repo.count(filter).await.context("Failed to count posts")?;
        if total == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .repo
            .list(filter, 0, total)
            .await
            .context("Failed to list posts")?)
    }

    /// Validate a draft and resolve its references
    async fn parse_draft(&self, draft: &PostDraft) -> Result<PostInput, PostServiceError> {
        const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

        let title = draft.title.trim().to_string();
        let text = draft.text.trim().to_string();

        let mut errors = FieldErrors::new();
        if errors.require("title", &title) {
            errors.max_chars("title", &title, TITLE_MAX_LENGTH);
        }
        errors.require("text", &text);

        let pub_date = if errors.require("pub_date", &draft.pub_date) {
            let parsed = parse_pub_date(&draft.pub_date);
            if parsed.is_none() {
                errors.add("pub_date", "Enter a valid date/time.");
            }
            parsed
        } else {
            None
        };

        let mut category_id = None;
        if errors.require("category", &draft.category_id) {
            category_id = match draft.category_id.trim().parse::<i64>() {
                Ok(id) => self
                    .categories
                    .get_by_id(id)
                    .await
                    .context("Failed to get category")?
                    .map(|c| c.id),
                Err(_) => None,
            };
            if category_id.is_none() {
                errors.add("category", INVALID_CHOICE);
            }
        }

        let mut location_id = None;
        if !draft.location_id.trim().is_empty() {
            location_id = match draft.location_id.trim().parse::<i64>() {
                Ok(id) => self
                    .locations
                    .get_by_id(id)
                    .await
                    .context("Failed to get location")?
                    .map(|l| l.id),
                Err(_) => None,
            };
            if location_id.is_none() {
                errors.add("location", INVALID_CHOICE);
            }
        }

        errors.into_result()?;

        let pub_date = pub_date.ok_or_else(|| FieldErrors::single("pub_date", "Enter a valid date/time."))?;
        Ok(PostInput {
            title,
            text,
            pub_date,
            category_id,
            location_id,
            is_published: draft.is_published,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxLocationRepository, SqlxPostRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CategoryInput, LocationInput, UserRole};
    use chrono::Duration;
    use proptest::prelude::*;

    struct Fixture {
        service: PostService,
        categories: Arc<dyn CategoryRepository>,
        locations: Arc<dyn LocationRepository>,
        author: User,
        other: User,
    }

    async fn setup(per_page: u32) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let author = users
            .create(&User::new("author".into(), String::new(), "h".into(), UserRole::Author))
            .await
            .unwrap();
        let other = users
            .create(&User::new("other".into(), String::new(), "h".into(), UserRole::Author))
            .await
            .unwrap();

        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let locations = SqlxLocationRepository::boxed(pool.clone());
        Fixture {
            service: PostService::new(
                SqlxPostRepository::boxed(pool),
                categories.clone(),
                locations.clone(),
                per_page,
            ),
            categories,
            locations,
            author,
            other,
        }
    }

    async fn category(f: &Fixture, slug: &str, published: bool) -> i64 {
        f.categories
            .create(&CategoryInput {
                title: slug.to_string(),
                description: "d".into(),
                slug: slug.to_string(),
                is_published: published,
            })
            .await
            .unwrap()
            .id
    }

    fn draft(title: &str, category_id: i64, pub_date: DateTime<Utc>, published: bool) -> PostDraft {
        PostDraft {
            title: title.to_string(),
            text: "Some text".to_string(),
            pub_date: pub_date.format(PUB_DATE_FORMAT).to_string(),
            category_id: category_id.to_string(),
            location_id: String::new(),
            is_published: published,
        }
    }

    #[test]
    fn test_parse_pub_date_formats() {
        let expected = "2024-05-01T10:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(parse_pub_date("2024-05-01T10:30"), Some(expected));
        assert_eq!(parse_pub_date("2024-05-01 10:30:00"), Some(expected));
        assert_eq!(parse_pub_date("2024-05-01T10:30:00+00:00"), Some(expected));
        assert_eq!(parse_pub_date("yesterday"), None);
    }

    #[test]
    fn test_draft_from_post_round_trips_pub_date() {
        let now = Utc::now();
        let d = PostDraft::new_at(now);
        assert!(d.is_published);
        assert!(parse_pub_date(&d.pub_date).is_some());
    }

    #[tokio::test]
    async fn test_public_feed_hides_unpublished_scheduled_and_hidden_category() {
        let f = setup(10).await;
        let open = category(&f, "open", true).await;
        let closed = category(&f, "closed", false).await;
        let past = Utc::now() - Duration::hours(1);

        f.service.create(&f.author, &draft("visible", open, past, true)).await.unwrap();
        f.service.create(&f.author, &draft("draft", open, past, false)).await.unwrap();
        f.service
            .create(&f.author, &draft("scheduled", open, Utc::now() + Duration::days(1), true))
            .await
            .unwrap();
        f.service.create(&f.author, &draft("hidden-cat", closed, past, true)).await.unwrap();

        let feed = f.service.list_public(1).await.unwrap();
        let titles: Vec<_> = feed.items.iter().map(|p| p.post.title.as_str()).collect();
        assert_eq!(titles, vec!["visible"]);
        assert_eq!(feed.total, 1);
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_not_found() {
        let f = setup(2).await;
        let open = category(&f, "open", true).await;
        for i in 0..3 {
            f.service
                .create(&f.author, &draft(&format!("p{}", i), open, Utc::now() - Duration::minutes(i + 1), true))
                .await
                .unwrap();
        }

        assert_eq!(f.service.list_public(2).await.unwrap().items.len(), 1);
        assert!(matches!(f.service.list_public(3).await, Err(PostServiceError::NotFound(_))));
        assert!(matches!(f.service.list_public(0).await, Err(PostServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_feed_has_a_first_page() {
        let f = setup(10).await;
        let page = f.service.list_public(1).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages(), 1);
    }

    #[tokio::test]
    async fn test_profile_shows_owner_everything() {
        let f = setup(10).await;
        let open = category(&f, "open", true).await;
        let past = Utc::now() - Duration::hours(1);
        f.service.create(&f.author, &draft("public", open, past, true)).await.unwrap();
        f.service.create(&f.author, &draft("private", open, past, false)).await.unwrap();

        let own = f.service.list_for_profile(&f.author, Some(&f.author), 1).await.unwrap();
        assert_eq!(own.total, 2);

        let seen_by_other = f.service.list_for_profile(&f.author, Some(&f.other), 1).await.unwrap();
        assert_eq!(seen_by_other.total, 1);

        let anonymous = f.service.list_for_profile(&f.author, None, 1).await.unwrap();
        assert_eq!(anonymous.total, 1);
    }

    #[tokio::test]
    async fn test_detail_visibility() {
        let f = setup(10).await;
        let open = category(&f, "open", true).await;
        let hidden = f
            .service
            .create(&f.author, &draft("hidden", open, Utc::now(), false))
            .await
            .unwrap();

        assert!(matches!(
            f.service.get_viewable(hidden.id, None).await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.get_viewable(hidden.id, Some(&f.other)).await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(f.service.get_viewable(hidden.id, Some(&f.author)).await.is_ok());
    }

    #[tokio::test]
    async fn test_only_author_may_update_or_delete() {
        let f = setup(10).await;
        let open = category(&f, "open", true).await;
        let post = f
            .service
            .create(&f.author, &draft("mine", open, Utc::now(), true))
            .await
            .unwrap();

        let attempt = f.service.update(post.id, &f.other, &draft("stolen", open, Utc::now(), true)).await;
        assert!(matches!(attempt, Err(PostServiceError::Forbidden(_))));

        let attempt = f.service.delete(post.id, &f.other).await;
        assert!(matches!(attempt, Err(PostServiceError::NotFound(_))));
        assert_eq!(f.service.get(post.id).await.unwrap().post.title, "mine");

        f.service
            .update(post.id, &f.author, &draft("edited", open, Utc::now(), true))
            .await
            .unwrap();
        assert_eq!(f.service.get(post.id).await.unwrap().post.title, "edited");

        f.service.delete(post.id, &f.author).await.unwrap();
        assert!(matches!(f.service.get(post.id).await, Err(PostServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_draft_validation() {
        let f = setup(10).await;

        let result = f
            .service
            .create(
                &f.author,
                &PostDraft {
                    title: "x".repeat(TITLE_MAX_LENGTH + 1),
                    text: " ".into(),
                    pub_date: "not a date".into(),
                    category_id: "999".into(),
                    location_id: "abc".into(),
                    is_published: true,
                },
            )
            .await;

        match result {
            Err(PostServiceError::ValidationError(errors)) => {
                for field in ["title", "text", "pub_date", "category", "location"] {
                    assert!(errors.has(field), "missing error for {}", field);
                }
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_location_is_optional_but_must_exist() {
        let f = setup(10).await;
        let open = category(&f, "open", true).await;
        let place = f
            .locations
            .create(&LocationInput { name: "Here".into(), is_published: true })
            .await
            .unwrap();

        let mut d = draft("located", open, Utc::now(), true);
        d.location_id = place.id.to_string();
        let post = f.service.create(&f.author, &d).await.unwrap();
        assert_eq!(post.location_id, Some(place.id));
        assert_eq!(f.service.all_at_location(place.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_list_search_filter_and_inline_changes() {
        let f = setup(10).await;
        let travel = category(&f, "travel", true).await;
        let food = category(&f, "food", true).await;
        let a = f.service.create(&f.author, &draft("Trip to Kazan", travel, Utc::now(), true)).await.unwrap();
        f.service.create(&f.other, &draft("Pelmeni", food, Utc::now(), false)).await.unwrap();

        let found = f
            .service
            .admin_list(&AdminPostQuery { q: Some("kazan".into()), category_id: None }, 1)
            .await
            .unwrap();
        assert_eq!(found.total, 1);

        let food_only = f
            .service
            .admin_list(&AdminPostQuery { q: None, category_id: Some(food) }, 1)
            .await
            .unwrap();
        assert_eq!(food_only.items[0].post.title, "Pelmeni");

        let bad = f
            .service
            .apply_listing_changes(&[ListingChange { post_id: a.id, is_published: false, category_id: Some(404) }])
            .await;
        assert!(matches!(bad, Err(PostServiceError::ValidationError(_))));
        assert!(f.service.get(a.id).await.unwrap().post.is_published);

        let saved = f
            .service
            .apply_listing_changes(&[ListingChange { post_id: a.id, is_published: false, category_id: Some(food) }])
            .await
            .unwrap();
        assert_eq!(saved, 1);
        let changed = f.service.get(a.id).await.unwrap();
        assert!(!changed.post.is_published);
        assert_eq!(changed.post.category_id, Some(food));
        assert_eq!(f.service.all_in_category(food).await.unwrap().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn feed_splits_into_ceil_n_over_page_size_pages(n in 0i64..23, per_page in 1u32..6) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let f = setup(per_page).await;
                let open = category(&f, "open", true).await;
                for i in 0..n {
                    f.service
                        .create(&f.author, &draft(&format!("p{}", i), open, Utc::now() - Duration::minutes(i + 1), true))
                        .await
                        .unwrap();
                }

                let first = f.service.list_public(1).await.unwrap();
                let pages = first.total_pages();
                let expected_pages = std::cmp::max(1, (n + per_page as i64 - 1) / per_page as i64) as u32;
                prop_assert_eq!(pages, expected_pages);

                let mut seen = 0;
                for page in 1..=pages {
                    let listing = f.service.list_public(page).await.unwrap();
                    if page < pages {
                        prop_assert_eq!(listing.items.len(), per_page as usize);
                    }
                    seen += listing.items.len() as i64;
                }
                prop_assert_eq!(seen, n);
                prop_assert!(f.service.list_public(pages + 1).await.is_err());
                Ok(())
            });
            result?;
        }
    }
}
