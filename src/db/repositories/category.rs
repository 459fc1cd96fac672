//! Category repository
//!
//! Database operations for categories.

use crate::db::repositories::post::INSERT_POST;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, CategoryInput, PostInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const CATEGORY_COLUMNS: &str = "id, title, description, slug, is_published, created_at";

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, input: &CategoryInput) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug regardless of its published flag
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// List every category ordered by title
    async fn list(&self) -> Result<Vec<Category>>;

    /// Replace all editable fields of a category
    async fn update(&self, id: i64, input: &CategoryInput) -> Result<Category>;

    /// Update a category and add a post authored by `author_id` in one
    /// transaction; neither is saved when either fails
    async fn update_with_post(
        &self,
        id: i64,
        input: &CategoryInput,
        author_id: i64,
        post: &PostInput,
    ) -> Result<Category>;

    /// Delete a category; its posts keep existing without one
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check whether a slug is taken, optionally ignoring one category
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, input: &CategoryInput) -> Result<Category> {
        const SQL: &str = "INSERT INTO categories (title, description, slug, is_published, created_at) VALUES (?, ?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(&input.title)
                .bind(&input.description)
                .bind(&input.slug)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(&input.title)
                .bind(&input.description)
                .bind(&input.slug)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create category")?;

        Ok(Category {
            id,
            title: input.title.clone(),
            description: input.description.clone(),
            slug: input.slug.clone(),
            is_published: input.is_published,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get category by ID")
                .map(|row| row.as_ref().map(row_to_category_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get category by ID")
                .map(|row| row.as_ref().map(row_to_category_mysql)),
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(p)
                .await
                .context("Failed to get category by slug")
                .map(|row| row.as_ref().map(row_to_category_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(p)
                .await
                .context("Failed to get category by slug")
                .map(|row| row.as_ref().map(row_to_category_mysql)),
        }
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {} FROM categories ORDER BY title, id", CATEGORY_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .context("Failed to list categories")
                .map(|rows| rows.iter().map(row_to_category_sqlite).collect()),
            Backend::Mysql(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .context("Failed to list categories")
                .map(|rows| rows.iter().map(row_to_category_mysql).collect()),
        }
    }

    async fn update(&self, id: i64, input: &CategoryInput) -> Result<Category> {
        const SQL: &str =
            "UPDATE categories SET title = ?, description = ?, slug = ?, is_published = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(&input.title)
                .bind(&input.description)
                .bind(&input.slug)
                .bind(input.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(&input.title)
                .bind(&input.description)
                .bind(&input.slug)
                .bind(input.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
        }
        .context("Failed to update category")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn update_with_post(
        &self,
        id: i64,
        input: &CategoryInput,
        author_id: i64,
        post: &PostInput,
    ) -> Result<Category> {
        const SQL: &str =
            "UPDATE categories SET title = ?, description = ?, slug = ?, is_published = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                sqlx::query(SQL)
                    .bind(&input.title)
                    .bind(&input.description)
                    .bind(&input.slug)
                    .bind(input.is_published)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update category")?;
                sqlx::query(INSERT_POST)
                    .bind(&post.title)
                    .bind(&post.text)
                    .bind(post.pub_date)
                    .bind(author_id)
                    .bind(post.category_id)
                    .bind(post.location_id)
                    .bind(post.is_published)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create post")?;
                tx.commit().await.context("Failed to commit category change")?;
            }
            Backend::Mysql(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                sqlx::query(SQL)
                    .bind(&input.title)
                    .bind(&input.description)
                    .bind(&input.slug)
                    .bind(input.is_published)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update category")?;
                sqlx::query(INSERT_POST)
                    .bind(&post.title)
                    .bind(&post.text)
                    .bind(post.pub_date)
                    .bind(author_id)
                    .bind(post.category_id)
                    .bind(post.location_id)
                    .bind(post.is_published)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create post")?;
                tx.commit().await.context("Failed to commit category change")?;
            }
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        const SQL: &str = "DELETE FROM categories WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to delete category")
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        const SQL: &str = "SELECT COUNT(*) FROM categories WHERE slug = ? AND id <> ?";
        let exclude = exclude_id.unwrap_or(0);
        let count = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
            Backend::Mysql(p) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(p)
                    .await
            }
        }
        .context("Failed to check category slug")?;
        Ok(count > 0)
    }

    async fn count(&self) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) FROM categories";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(p).await,
        }
        .context("Failed to count categories")
    }
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        slug: row.get("slug"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        slug: row.get("slug"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}
