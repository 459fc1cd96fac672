//! Post repository
//!
//! Every read goes through one joined query that carries the author name,
//! the category and location references and the comment count. Listings
//! narrow it with a [`PostFilter`].

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CategoryRef, ListingChange, LocationRef, Post, PostInput, PostWithMeta};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

const SELECT_POST_WITH_META: &str = r#"
    SELECT p.id, p.title, p.text, p.pub_date, p.author_id, p.category_id, p.location_id,
           p.is_published, p.created_at,
           u.username AS author_username,
           c.title AS category_title, c.slug AS category_slug,
           c.is_published AS category_is_published,
           l.name AS location_name, l.is_published AS location_is_published,
           (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN locations l ON l.id = p.location_id
"#;

/// Binds: title, text, pub_date, author_id, category_id, location_id,
/// is_published, created_at
pub(crate) const INSERT_POST: &str = r#"
    INSERT INTO posts (title, text, pub_date, author_id, category_id, location_id, is_published, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const COUNT_POSTS: &str = r#"
    SELECT COUNT(*)
    FROM posts p
    LEFT JOIN categories c ON c.id = p.category_id
"#;

/// Conditions narrowing a post listing. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilter {
    /// Only posts publicly visible at this instant: published, in a
    /// published category, with `pub_date` not in the future
    pub public_at: Option<DateTime<Utc>>,
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    /// Case-insensitive substring of the title
    pub title_contains: Option<String>,
}

impl PostFilter {
    /// Posts anyone may read at `now`
    pub fn public(now: DateTime<Utc>) -> Self {
        Self {
            public_at: Some(now),
            ..Self::default()
        }
    }

    /// Every post regardless of visibility
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn at_location(mut self, location_id: i64) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn title_contains(mut self, needle: &str) -> Self {
        let needle = needle.trim();
        if !needle.is_empty() {
            self.title_contains = Some(needle.to_string());
        }
        self
    }

    /// Render the WHERE clause and the values to bind, in order
    fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(now) = self.public_at {
            clauses.push("p.is_published = 1 AND c.is_published = 1 AND p.pub_date <= ?");
            values.push(SqlValue::Time(now));
        }
        if let Some(id) = self.author_id {
            clauses.push("p.author_id = ?");
            values.push(SqlValue::Int(id));
        }
        if let Some(id) = self.category_id {
            clauses.push("p.category_id = ?");
            values.push(SqlValue::Int(id));
        }
        if let Some(id) = self.location_id {
            clauses.push("p.location_id = ?");
            values.push(SqlValue::Int(id));
        }
        if let Some(needle) = &self.title_contains {
            clauses.push("LOWER(p.title) LIKE ? ESCAPE '!'");
            values.push(SqlValue::Text(format!("%{}%", escape_like(&needle.to_lowercase()))));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// A value bound into a dynamically built query
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Int(i64),
    Time(DateTime<Utc>),
    Text(String),
}

macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Time(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
            };
        }
        query
    }};
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '!' | '%' | '_') {
            out.push('!');
        }
        out.push(ch);
    }
    out
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a post authored by `author_id`
    async fn create(&self, author_id: i64, input: &PostInput) -> Result<Post>;

    /// Get a post with its joined metadata, regardless of visibility
    async fn get_by_id(&self, id: i64) -> Result<Option<PostWithMeta>>;

    /// List posts matching `filter`, newest `pub_date` first
    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<PostWithMeta>>;

    /// Count posts matching `filter`
    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    /// Replace all editable fields; the author never changes
    async fn update(&self, id: i64, input: &PostInput) -> Result<()>;

    /// Set the two fields the admin list edits inline, for every row in one
    /// transaction. A row whose post is gone fails the whole batch.
    async fn update_listing_fields(&self, changes: &[ListingChange]) -> Result<()>;

    /// Delete a post and, through the schema, its comments
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, author_id: i64, input: &PostInput) -> Result<Post> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(INSERT_POST)
                .bind(&input.title)
                .bind(&input.text)
                .bind(input.pub_date)
                .bind(author_id)
                .bind(input.category_id)
                .bind(input.location_id)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(INSERT_POST)
                .bind(&input.title)
                .bind(&input.text)
                .bind(input.pub_date)
                .bind(author_id)
                .bind(input.category_id)
                .bind(input.location_id)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create post")?;

        Ok(Post {
            id,
            title: input.title.clone(),
            text: input.text.clone(),
            pub_date: input.pub_date,
            author_id,
            category_id: input.category_id,
            location_id: input.location_id,
            is_published: input.is_published,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<PostWithMeta>> {
        let sql = format!("{} WHERE p.id = ?", SELECT_POST_WITH_META);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get post by ID")
                .map(|row| row.as_ref().map(row_to_post_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get post by ID")
                .map(|row| row.as_ref().map(row_to_post_mysql)),
        }
    }

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<PostWithMeta>> {
        let (where_sql, values) = filter.to_sql();
        let sql = format!(
            "{}{} ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            SELECT_POST_WITH_META, where_sql
        );

        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let query = bind_values!(sqlx::query::<sqlx::Sqlite>(&sql), &values);
                query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list posts")
                    .map(|rows| rows.iter().map(row_to_post_sqlite).collect())
            }
            Backend::Mysql(p) => {
                let query = bind_values!(sqlx::query::<sqlx::MySql>(&sql), &values);
                query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list posts")
                    .map(|rows| rows.iter().map(row_to_post_mysql).collect())
            }
        }
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        let (where_sql, values) = filter.to_sql();
        let sql = format!("{}{}", COUNT_POSTS, where_sql);

        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let query = bind_values!(sqlx::query::<sqlx::Sqlite>(&sql), &values);
                query.fetch_one(p).await.map(|row| row.get::<i64, _>(0))
            }
            Backend::Mysql(p) => {
                let query = bind_values!(sqlx::query::<sqlx::MySql>(&sql), &values);
                query.fetch_one(p).await.map(|row| row.get::<i64, _>(0))
            }
        }
        .context("Failed to count posts")
    }

    async fn update(&self, id: i64, input: &PostInput) -> Result<()> {
        const SQL: &str = r#"
            UPDATE posts
            SET title = ?, text = ?, pub_date = ?, category_id = ?, location_id = ?, is_published = ?
            WHERE id = ?
        "#;
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(&input.title)
                .bind(&input.text)
                .bind(input.pub_date)
                .bind(input.category_id)
                .bind(input.location_id)
                .bind(input.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(&input.title)
                .bind(&input.text)
                .bind(input.pub_date)
                .bind(input.category_id)
                .bind(input.location_id)
                .bind(input.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ()),
        }
        .context("Failed to update post")
    }

    async fn update_listing_fields(&self, changes: &[ListingChange]) -> Result<()> {
        const SQL: &str = "UPDATE posts SET is_published = ?, category_id = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                for change in changes {
                    let result = sqlx::query(SQL)
                        .bind(change.is_published)
                        .bind(change.category_id)
                        .bind(change.post_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to update post listing fields")?;
                    if result.rows_affected() == 0 {
                        anyhow::bail!("Post {} no longer exists", change.post_id);
                    }
                }
                tx.commit().await.context("Failed to commit listing changes")?;
            }
            Backend::Mysql(p) => {
                let mut tx = p.begin().await.context("Failed to begin transaction")?;
                for change in changes {
                    // MySQL counts changed rows, so an unchanged row reads as 0
                    sqlx::query(SQL)
                        .bind(change.is_published)
                        .bind(change.category_id)
                        .bind(change.post_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to update post listing fields")?;
                    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE id = ?")
                        .bind(change.post_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to check post")?;
                    if exists.is_none() {
                        anyhow::bail!("Post {} no longer exists", change.post_id);
                    }
                }
                tx.commit().await.context("Failed to commit listing changes")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        const SQL: &str = "DELETE FROM posts WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to delete post")
    }
}

// ============================================================================
// Row mapping
// ============================================================================

macro_rules! row_to_post {
    ($row:expr) => {{
        let row = $row;
        let category_id: Option<i64> = row.get("category_id");
        let category_title: Option<String> = row.get("category_title");
        let location_id: Option<i64> = row.get("location_id");
        let location_name: Option<String> = row.get("location_name");

        let category = match (category_id, category_title) {
            (Some(id), Some(title)) => Some(CategoryRef {
                id,
                title,
                slug: row.get::<Option<String>, _>("category_slug").unwrap_or_default(),
                is_published: row
                    .get::<Option<bool>, _>("category_is_published")
                    .unwrap_or(false),
            }),
            _ => None,
        };
        let location = match (location_id, location_name) {
            (Some(id), Some(name)) => Some(LocationRef {
                id,
                name,
                is_published: row
                    .get::<Option<bool>, _>("location_is_published")
                    .unwrap_or(false),
            }),
            _ => None,
        };

        PostWithMeta {
            post: Post {
                id: row.get("id"),
                title: row.get("title"),
                text: row.get("text"),
                pub_date: row.get("pub_date"),
                author_id: row.get("author_id"),
                category_id,
                location_id,
                is_published: row.get("is_published"),
                created_at: row.get("created_at"),
            },
            author_username: row.get("author_username"),
            category,
            location,
            comment_count: row.get("comment_count"),
        }
    }};
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> PostWithMeta {
    row_to_post!(row)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> PostWithMeta {
    row_to_post!(row)
}
