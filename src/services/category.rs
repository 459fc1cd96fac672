//! Category service
//!
//! Staff maintain categories; readers only ever reach published ones by
//! slug. Those slug lookups sit on every category page, so hits are cached
//! and every write drops the cached entries.
//!
//! A lookup that started before a write must not re-cache what it read.
//! Writes bump a generation counter before clearing the cache, and a lookup
//! drops its own entry again when the generation moved underneath it.

use crate::cache::{CacheLayer, MemoryCache};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryInput, PostInput};
use crate::services::validation::{is_valid_slug, FieldErrors};
use anyhow::Context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const TITLE_MAX_LENGTH: usize = 256;
pub const SLUG_MAX_LENGTH: usize = 64;

const CACHE_PREFIX: &str = "category:";
const CACHE_KEY_BY_SLUG: &str = "category:slug:";

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for CategoryServiceError {
    fn from(errors: FieldErrors) -> Self {
        CategoryServiceError::ValidationError(errors)
    }
}

/// Category service for managing blog categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
    generation: AtomicU64,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        Self {
            repo,
            cache,
            generation: AtomicU64::new(0),
        }
    }

    /// A published category by slug; hidden and missing ones are both
    /// `NotFound`
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        let key = format!("{}{}", CACHE_KEY_BY_SLUG, slug);

        match self.cache.get::<Category>(&key).await {
            Ok(Some(category)) => return Ok(category),
            Ok(None) => {}
            Err(e) => tracing::warn!("Category cache read failed: {:#}", e),
        }

        let generation = self.generation.load(Ordering::Acquire);
        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?
            .filter(|c| c.is_published)
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))?;

        if let Err(e) = self.cache.set(&key, &category).await {
            tracing::warn!("Category cache write failed: {:#}", e);
        }
        if self.generation.load(Ordering::Acquire) != generation {
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!("Category cache invalidation failed: {:#}", e);
            }
        }
        Ok(category)
    }

    /// Any category by ID, published or not
    pub async fn get_by_id(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))
    }

    /// Every category, ordered by title
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        Ok(self.repo.list().await.context("Failed to list categories")?)
    }

    pub async fn count(&self) -> Result<i64, CategoryServiceError> {
        Ok(self.repo.count().await.context("Failed to count categories")?)
    }

    pub async fn create(&self, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        let input = self.validate(input, None).await?;

        let category = self
            .repo
            .create(&input)
            .await
            .context("Failed to create category")?;

        self.invalidate().await;
        tracing::info!(category_id = category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    pub async fn update(&self, id: i64, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        self.update_with_post(id, input, None).await
    }

    /// Update a category, adding `post` (author ID and input) in the same
    /// transaction when one is given
    pub async fn update_with_post(
        &self,
        id: i64,
        input: CategoryInput,
        post: Option<(i64, &PostInput)>,
    ) -> Result<Category, CategoryServiceError> {
        self.get_by_id(id).await?;
        let input = self.validate(input, Some(id)).await?;

        let category = match post {
            Some((author_id, post)) => self
                .repo
                .update_with_post(id, &input, author_id, post)
                .await
                .context("Failed to update category with post")?,
            None => self
                .repo
                .update(id, &input)
                .await
                .context("Failed to update category")?,
        };

        self.invalidate().await;
        Ok(category)
    }

    /// Delete a category; its posts keep existing without one
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let category = self.get_by_id(id).await?;

        self.repo
            .delete(id)
            .await
            .context("Failed to delete category")?;

        self.invalidate().await;
        tracing::info!(category_id = id, slug = %category.slug, "Category deleted");
        Ok(())
    }

    async fn validate(
        &self,
        input: CategoryInput,
        exclude_id: Option<i64>,
    ) -> Result<CategoryInput, CategoryServiceError> {
        let input = CategoryInput {
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            slug: input.slug.trim().to_string(),
            is_published: input.is_published,
        };

        let mut errors = FieldErrors::new();
        if errors.require("title", &input.title) {
            errors.max_chars("title", &input.title, TITLE_MAX_LENGTH);
        }
        errors.require("description", &input.description);
        if errors.require("slug", &input.slug) {
            errors.max_chars("slug", &input.slug, SLUG_MAX_LENGTH);
            if !is_valid_slug(&input.slug) {
                errors.add(
                    "slug",
                    "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
                );
            } else if self
                .repo
                .slug_exists(&input.slug, exclude_id)
                .await
                .context("Failed to check slug")?
            {
                errors.add("slug", "Category with this slug already exists.");
            }
        }
        errors.into_result()?;

        Ok(input)
    }

    /// Called after the write has been committed
    async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.cache.delete_prefix(CACHE_PREFIX).await {
            tracing::warn!("Category cache invalidation failed: {:#}", e);
        }
    }
}
