//! Comment repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Comment, CommentWithAuthor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a comment by `author_id` under `post_id`
    async fn create(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Comments of a post, oldest first, with author usernames
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>>;

    async fn update_text(&self, id: i64, text: &str) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment> {
        const SQL: &str =
            "INSERT INTO comments (text, post_id, author_id, created_at) VALUES (?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(text)
                .bind(post_id)
                .bind(author_id)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(text)
                .bind(post_id)
                .bind(author_id)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create comment")?;

        Ok(Comment {
            id,
            text: text.to_string(),
            post_id,
            author_id,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        const SQL: &str =
            "SELECT id, text, post_id, author_id, created_at FROM comments WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| {
                    row.map(|row| Comment {
                        id: row.get("id"),
                        text: row.get("text"),
                        post_id: row.get("post_id"),
                        author_id: row.get("author_id"),
                        created_at: row.get("created_at"),
                    })
                }),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| {
                    row.map(|row| Comment {
                        id: row.get("id"),
                        text: row.get("text"),
                        post_id: row.get("post_id"),
                        author_id: row.get("author_id"),
                        created_at: row.get("created_at"),
                    })
                }),
        }
        .context("Failed to get comment by ID")
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>> {
        const SQL: &str = r#"
            SELECT cm.id, cm.text, cm.post_id, cm.author_id, cm.created_at,
                   u.username AS author_username
            FROM comments cm
            JOIN users u ON u.id = cm.author_id
            WHERE cm.post_id = ?
            ORDER BY cm.created_at ASC, cm.id ASC
        "#;
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL)
                .bind(post_id)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(row_to_comment_sqlite).collect()),
            Backend::Mysql(p) => sqlx::query(SQL)
                .bind(post_id)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(row_to_comment_mysql).collect()),
        }
        .context("Failed to list comments")
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<()> {
        const SQL: &str = "UPDATE comments SET text = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL).bind(text).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL).bind(text).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to update comment")
    }

    async fn delete(&self, id: i64) -> Result<()> {
        const SQL: &str = "DELETE FROM comments WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(SQL).bind(id).execute(p).await.map(|_| ()),
        }
        .context("Failed to delete comment")
    }
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> CommentWithAuthor {
    CommentWithAuthor {
        comment: Comment {
            id: row.get("id"),
            text: row.get("text"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            created_at: row.get("created_at"),
        },
        author_username: row.get("author_username"),
    }
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> CommentWithAuthor {
    CommentWithAuthor {
        comment: Comment {
            id: row.get("id"),
            text: row.get("text"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            created_at: row.get("created_at"),
        },
        author_username: row.get("author_username"),
    }
}
