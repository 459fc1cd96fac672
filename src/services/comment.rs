//! Comment service
//!
//! Comments may be left on any post the commenter can read. Editing and
//! deleting belong to the comment's author alone; every refusal looks like
//! a missing comment.

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{Comment, CommentWithAuthor, User};
use crate::services::validation::FieldErrors;
use crate::services::visibility;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for CommentServiceError {
    fn from(errors: FieldErrors) -> Self {
        CommentServiceError::ValidationError(errors)
    }
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, posts: Arc<dyn PostRepository>) -> Self {
        Self { repo, posts }
    }

    /// Comments under a post, oldest first
    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>, CommentServiceError> {
        Ok(self
            .repo
            .list_for_post(post_id)
            .await
            .context("Failed to list comments")?)
    }

    /// Comment on a post the author can read
    pub async fn create(&self, post_id: i64, author: &User, text: &str) -> Result<Comment, CommentServiceError> {
        let post = self
            .posts
            .get_by_id(post_id)
            .await
            .context("Failed to get post")?
            .filter(|p| visibility::can_view(p, Some(author), Utc::now()))
            .ok_or_else(|| CommentServiceError::NotFound(format!("post {}", post_id)))?;

        let text = validate_text(text)?;
        let comment = self
            .repo
            .create(post.post.id, author.id, &text)
            .await
            .context("Failed to create comment")?;

        tracing::debug!(comment_id = comment.id, post_id, "Comment created");
        Ok(comment)
    }

    /// A comment the viewer may change, addressed under its own post
    pub async fn get_for_change(
        &self,
        post_id: i64,
        comment_id: i64,
        viewer: &User,
    ) -> Result<Comment, CommentServiceError> {
        self.repo
            .get_by_id(comment_id)
            .await
            .context("Failed to get comment")?
            .filter(|c| visibility::can_change_comment(c, post_id, viewer))
            .ok_or_else(|| CommentServiceError::NotFound(format!("comment {}", comment_id)))
    }

    pub async fn update(
        &self,
        post_id: i64,
        comment_id: i64,
        viewer: &User,
        text: &str,
    ) -> Result<(), CommentServiceError> {
        self.get_for_change(post_id, comment_id, viewer).await?;
        let text = validate_text(text)?;
        self.repo
            .update_text(comment_id, &text)
            .await
            .context("Failed to update comment")?;
        Ok(())
    }

    pub async fn delete(&self, post_id: i64, comment_id: i64, viewer: &User) -> Result<(), CommentServiceError> {
        self.get_for_change(post_id, comment_id, viewer).await?;
        self.repo
            .delete(comment_id)
            .await
            .context("Failed to delete comment")?;
        tracing::debug!(comment_id, post_id, "Comment deleted");
        Ok(())
    }
}

fn validate_text(text: &str) -> Result<String, FieldErrors> {
    let text = text.trim();
    let mut errors = FieldErrors::new();
    errors.require("text", text);
    errors.into_result()?;
    Ok(text.to_string())
}
