//! Location repository

use crate::db::repositories::post::INSERT_POST;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{Location, LocationInput, PostInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Location repository trait
#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn create(&self, input: &LocationInput) -> Result<Location>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>>;

    /// List every location ordered by name
    async fn list(&self) -> Result<Vec<Location>>;

    async fn update(&self, id: i64, input: &LocationInput) -> Result<Location>;

    /// Update a location and add a post in one transaction
    async fn update_with_post(
        &self,
        id: i64,
        input: &LocationInput,
        author_id: i64,
        post: &PostInput,
    ) -> Result<Location>;

    /// Delete a location; its posts keep existing without one
    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based location repository implementation
pub struct SqlxLocationRepository {
    pool: DynDatabasePool,
}

impl SqlxLocationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LocationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LocationRepository for SqlxLocationRepository {
    async fn create(&self, input: &LocationInput) -> Result<Location> {
        const SQL: &str = "INSERT INTO locations (name, is_published, created_at) VALUES (?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create location")?;

        Ok(Location {
            id,
            name: input.name.clone(),
            is_published: input.is_published,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>> {
        const SQL: &str = "SELECT id, name, is_published, created_at FROM locations WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get location by ID")
                .map(|row| row.as_ref().map(row_to_location_sqlite)),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get location by ID")
                .map(|row| row.as_ref().map(row_to_location_mysql)),
        }
    }

    async fn list(&self) -> Result<Vec<Location>> {
        const SQL: &str = "SELECT id, name, is_published, created_at FROM locations ORDER BY name, id";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .fetch_all(p)
                .await
                .context("Failed to list locations")
                .map(|rows| rows.iter().map(row_to_location_sqlite).collect()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .fetch_all(p)
                .await
                .context("Failed to list locations")
                .map(|rows| rows.iter().map(row_to_location_mysql).collect()),
        }
    }

    async fn update(&self, id: i64, input: &LocationInput) -> Result<Location> {
        const SQL: &str = "UPDATE locations SET name = ?, is_published = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
        }
        .context("Failed to update location")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Location not found after update"))
    }

    async fn update_with_post(
        &self,
        id: i64,
        input: &LocationInput,
        author_id: i64,
        post: &PostInput,
    ) -> Result<Location> {
        const SQL: &str = "UPDATE locations SET name = ?, is_published = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                sqlx::query(SQL)
                    .bind(&input.name)
                    .bind(input.is_published)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update location")?;
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
                tx.commit().await.context("Failed to commit location change")?;
            }
            Backend::Mysql(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                sqlx::query(SQL)
                    .bind(&input.name)
                    .bind(input.is_published)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update location")?;
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
                tx.commit().await.context("Failed to commit location change")?;
            }
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Location not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        const SQL: &str = "DELETE FROM locations WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to delete location")
    }

    async fn count(&self) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) FROM locations";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(p).await,
            Backend::Mysql(p) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(p).await,
        }
        .context("Failed to count locations")
    }
}

fn row_to_location_sqlite(row: &sqlx::sqlite::SqliteRow) -> Location {
    Location {
        id: row.get("id"),
        name: row.get("name"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_location_mysql(row: &sqlx::mysql::MySqlRow) -> Location {
    Location {
        id: row.get("id"),
        name: row.get("name"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}
