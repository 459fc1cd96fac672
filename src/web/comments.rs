//! Comment handlers
//!
//! A comment is addressed under its post; a comment that belongs to another
//! post, or to another author, is not found.

use axum::{extract::State, response::Response, routing::{get, post}, Router};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::models::Comment;
use crate::services::{CommentServiceError, FieldErrors};
use crate::web::common::{post_detail_url, redirect, CsrfForm, FormPairs, Page, RequireUser, RoutePath};
use crate::web::error::WebError;
use crate::web::middleware::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/comment/", post(add_comment))
        .route(
            "/posts/{id}/edit_comment/{comment_id}/",
            get(edit_comment_form).post(edit_comment),
        )
        .route(
            "/posts/{id}/delete_comment/{comment_id}/",
            get(delete_comment_confirm).post(delete_comment),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

/// POST /posts/{id}/comment/
async fn add_comment(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath(post_id): RoutePath<i64>,
    CsrfForm(form): CsrfForm<CommentForm>,
) -> Result<Response, WebError> {
    match state.comment_service.create(post_id, &user, &form.text).await {
        Ok(_) => Ok(redirect(&post_detail_url(post_id))),
        Err(CommentServiceError::ValidationError(errors)) => {
            // back to the detail page with the message under the form
            let post = state.post_service.get_viewable(post_id, Some(&user)).await?;
            let comments = state.comment_service.list_for_post(post_id).await?;

            let mut context = TeraContext::new();
            context.insert("post", &post);
            context.insert("comments", &comments);
            context.insert("comment_text", &form.text);
            context.insert("errors", &errors);
            page.render(&state, "blog/detail.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

fn render_comment_page(
    state: &AppState,
    page: &Page,
    post_id: i64,
    comment: &Comment,
    text: &str,
    errors: &FieldErrors,
    deleting: bool,
) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("post_id", &post_id);
    context.insert("comment", comment);
    context.insert("comment_text", text);
    context.insert("errors", errors);
    context.insert("deleting", &deleting);
    page.render(state, "blog/comment.html", &context)
}

/// GET /posts/{id}/edit_comment/{comment_id}/
async fn edit_comment_form(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath((post_id, comment_id)): RoutePath<(i64, i64)>,
) -> Result<Response, WebError> {
    let comment = state
        .comment_service
        .get_for_change(post_id, comment_id, &user)
        .await?;
    render_comment_page(&state, &page, post_id, &comment, &comment.text, &FieldErrors::new(), false)
}

/// POST /posts/{id}/edit_comment/{comment_id}/
async fn edit_comment(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath((post_id, comment_id)): RoutePath<(i64, i64)>,
    CsrfForm(form): CsrfForm<CommentForm>,
) -> Result<Response, WebError> {
    match state
        .comment_service
        .update(post_id, comment_id, &user, &form.text)
        .await
    {
        Ok(()) => Ok(redirect(&post_detail_url(post_id))),
        Err(CommentServiceError::ValidationError(errors)) => {
            let comment = state
                .comment_service
                .get_for_change(post_id, comment_id, &user)
                .await?;
            render_comment_page(&state, &page, post_id, &comment, &form.text, &errors, false)
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /posts/{id}/delete_comment/{comment_id}/
async fn delete_comment_confirm(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath((post_id, comment_id)): RoutePath<(i64, i64)>,
) -> Result<Response, WebError> {
    let comment = state
        .comment_service
        .get_for_change(post_id, comment_id, &user)
        .await?;
    render_comment_page(&state, &page, post_id, &comment, &comment.text, &FieldErrors::new(), true)
}

/// POST /posts/{id}/delete_comment/{comment_id}/
async fn delete_comment(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    RoutePath((post_id, comment_id)): RoutePath<(i64, i64)>,
    CsrfForm(_): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    state
        .comment_service
        .delete(post_id, comment_id, &user)
        .await?;
    Ok(redirect(&post_detail_url(post_id)))
}
