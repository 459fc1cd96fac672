//! Post pages: the public feed, the detail page and the author's
//! create/edit/delete forms

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::models::PostWithMeta;
use crate::services::{FieldErrors, PostDraft, PostServiceError};
use crate::web::common::{
    category_choices, is_checked, location_choices, post_detail_url, profile_url, redirect,
    CsrfForm, FormPairs, MaybeUser, Page, PageQuery, Paginator, RequireUser, RoutePath,
};
use crate::web::error::WebError;
use crate::web::middleware::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/posts/create/", get(create_form).post(create_post))
        .route("/posts/{id}/", get(post_detail))
        .route("/posts/{id}/edit/", get(edit_form).post(edit_post))
        .route("/posts/{id}/delete/", get(delete_confirm).post(delete_post))
}

/// Post form fields as the browser submits them
#[derive(Debug, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    pub is_published: Option<String>,
}

impl From<PostForm> for PostDraft {
    fn from(form: PostForm) -> Self {
        PostDraft {
            is_published: is_checked(&form.is_published),
            title: form.title,
            text: form.text,
            pub_date: form.pub_date,
            category_id: form.category,
            location_id: form.location,
        }
    }
}

/// GET / - public feed
async fn index(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let result = state.post_service.list_public(query.number()?).await?;

    let mut context = TeraContext::new();
    context.insert("posts", &result.items);
    context.insert("paginator", &Paginator::new(&result));
    page.render(&state, "blog/index.html", &context)
}

/// GET /posts/{id}/ - detail page with comments
async fn post_detail(
    State(state): State<AppState>,
    page: Page,
    MaybeUser(user): MaybeUser,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let post = state.post_service.get_viewable(id, user.as_ref()).await?;
    let comments = state.comment_service.list_for_post(id).await?;

    let mut context = TeraContext::new();
    context.insert("post", &post);
    context.insert("comments", &comments);
    context.insert("comment_text", "");
    context.insert("errors", &FieldErrors::new());
    page.render(&state, "blog/detail.html", &context)
}

/// Render the post form, blank, prefilled or with errors
pub(crate) async fn render_post_form(
    state: &AppState,
    page: &Page,
    draft: &PostDraft,
    errors: &FieldErrors,
    post: Option<&PostWithMeta>,
) -> Result<Response, WebError> {
    let categories = state.category_service.list().await?;
    let locations = state.location_service.list().await?;

    let mut context = TeraContext::new();
    context.insert("form", draft);
    context.insert("errors", errors);
    context.insert("category_choices", &category_choices(&categories, &draft.category_id));
    context.insert("location_choices", &location_choices(&locations, &draft.location_id));
    context.insert("post", &post);
    context.insert("deleting", &false);
    page.render(state, "blog/create.html", &context)
}

/// GET /posts/create/
async fn create_form(
    State(state): State<AppState>,
    page: Page,
    RequireUser(_user): RequireUser,
) -> Result<Response, WebError> {
    render_post_form(&state, &page, &PostDraft::new_at(Utc::now()), &FieldErrors::new(), None).await
}

/// POST /posts/create/
async fn create_post(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    CsrfForm(form): CsrfForm<PostForm>,
) -> Result<Response, WebError> {
    let draft = PostDraft::from(form);
    match state.post_service.create(&user, &draft).await {
        Ok(_) => Ok(redirect(&profile_url(&user.username))),
        Err(PostServiceError::ValidationError(errors)) => {
            render_post_form(&state, &page, &draft, &errors, None).await
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /posts/{id}/edit/ - other users are sent to the detail page
async fn edit_form(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    match state.post_service.get_editable(id, &user).await {
        Ok(post) => {
            let draft = PostDraft::from_post(&post.post);
            render_post_form(&state, &page, &draft, &FieldErrors::new(), Some(&post)).await
        }
        Err(PostServiceError::Forbidden(id)) => Ok(redirect(&post_detail_url(id))),
        Err(e) => Err(e.into()),
    }
}

/// POST /posts/{id}/edit/
async fn edit_post(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(form): CsrfForm<PostForm>,
) -> Result<Response, WebError> {
    let draft = PostDraft::from(form);
    match state.post_service.update(id, &user, &draft).await {
        Ok(()) => Ok(redirect(&post_detail_url(id))),
        Err(PostServiceError::Forbidden(id)) => Ok(redirect(&post_detail_url(id))),
        Err(PostServiceError::ValidationError(errors)) => {
            let post = state.post_service.get(id).await?;
            render_post_form(&state, &page, &draft, &errors, Some(&post)).await
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /posts/{id}/delete/ - confirmation showing the post
async fn delete_confirm(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let post = state.post_service.get_deletable(id, &user).await?;

    let mut context = TeraContext::new();
    context.insert("form", &PostDraft::from_post(&post.post));
    context.insert("errors", &FieldErrors::new());
    context.insert("post", &post);
    context.insert("deleting", &true);
    page.render(&state, "blog/create.html", &context)
}

/// POST /posts/{id}/delete/
async fn delete_post(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(_): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    state.post_service.delete(id, &user).await?;
    Ok(redirect("/"))
}
