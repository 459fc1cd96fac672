//! Administrative screens
//!
//! Staff-only list, search and edit screens for posts, categories and
//! locations. The router is wrapped in [`require_staff`], so handlers here
//! may assume the signed-in user is staff.
//!
//! - /admin/ - counts per entity
//! - /admin/posts/ - searchable, filterable list with inline is_published
//!   and category columns saved in one POST
//! - /admin/posts/add/, /admin/posts/{id}/, /admin/posts/{id}/delete/
//! - /admin/categories/..., /admin/locations/... - list, add, change (with
//!   the related posts and one blank post row), delete
//!
//! [`require_staff`]: crate::web::middleware::require_staff

use axum::{
    extract::{Query, State},
    middleware as axum_middleware,
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::models::{Category, CategoryInput, ListingChange, Location, LocationInput, PostInput, PostWithMeta, User};
use crate::services::validation::NON_FIELD;
use crate::services::{
    AdminPostQuery, CategoryServiceError, FieldErrors, LocationServiceError, PostDraft,
    PostServiceError,
};
use crate::web::common::{
    all_values, category_choices, first_value, location_choices, parse_page, redirect, Choice, CsrfForm,
    FormPairs, Page, Paginator, RequireUser, RoutePath,
};
use crate::web::error::WebError;
use crate::web::middleware::{self, AppState};

/// Field prefix of the blank post row on category and location screens
const INLINE_PREFIX: &str = "post-";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/", get(index))
        .route("/admin/posts/", get(post_list).post(post_list_save))
        .route("/admin/posts/add/", get(post_add_form).post(post_add))
        .route("/admin/posts/{id}/", get(post_change_form).post(post_change))
        .route("/admin/posts/{id}/delete/", get(post_delete_confirm).post(post_delete))
        .route("/admin/categories/", get(category_list))
        .route("/admin/categories/add/", get(category_add_form).post(category_add))
        .route("/admin/categories/{id}/", get(category_change_form).post(category_change))
        .route(
            "/admin/categories/{id}/delete/",
            get(category_delete_confirm).post(category_delete),
        )
        .route("/admin/locations/", get(location_list))
        .route("/admin/locations/add/", get(location_add_form).post(location_add))
        .route("/admin/locations/{id}/", get(location_change_form).post(location_change))
        .route(
            "/admin/locations/{id}/delete/",
            get(location_delete_confirm).post(location_delete),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_staff))
}

fn text(pairs: &FormPairs, key: &str) -> String {
    first_value(pairs, key).unwrap_or_default().to_string()
}

fn checked(pairs: &FormPairs, key: &str) -> bool {
    first_value(pairs, key).is_some()
}

// ============================================================================
// Index
// ============================================================================

/// GET /admin/
async fn index(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("post_count", &state.post_service.count_all().await?);
    context.insert("category_count", &state.category_service.count().await?);
    context.insert("location_count", &state.location_service.count().await?);
    context.insert("user_count", &state.user_service.count().await?);
    page.render(&state, "admin/index.html", &context)
}

// ============================================================================
// Posts
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AdminListQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
}

impl AdminListQuery {
    fn to_query(&self) -> AdminPostQuery {
        AdminPostQuery {
            q: self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()).map(String::from),
            category_id: self.category.as_deref().and_then(|c| c.trim().parse().ok()),
        }
    }

    /// Query string that brings the list back to the same view
    fn query_string(&self) -> String {
        let params = [
            ("q", self.q.as_deref().unwrap_or_default()),
            ("category", self.category.as_deref().unwrap_or_default()),
            ("page", self.page.as_deref().unwrap_or_default()),
        ];
        params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// A row of the admin post list with its own category select
#[derive(Debug, Serialize)]
struct PostRow {
    post: PostWithMeta,
    category_choices: Vec<Choice>,
    errors: Vec<String>,
}

async fn render_post_list(
    state: &AppState,
    page: &Page,
    query: &AdminListQuery,
    errors: &FieldErrors,
) -> Result<Response, WebError> {
    let admin_query = query.to_query();
    let result = state
        .post_service
        .admin_list(&admin_query, parse_page(query.page.as_deref())?)
        .await?;
    let categories = state.category_service.list().await?;

    let rows: Vec<PostRow> = result
        .items
        .iter()
        .map(|post| {
            let selected = post.post.category_id.map(|id| id.to_string()).unwrap_or_default();
            PostRow {
                category_choices: category_choices(&categories, &selected),
                errors: errors
                    .get(&format!("post-{}", post.post.id))
                    .map(<[String]>::to_vec)
                    .unwrap_or_default(),
                post: post.clone(),
            }
        })
        .collect();

    let paginator = Paginator::with_query(
        &result,
        &[
            ("q", query.q.as_deref().unwrap_or_default()),
            ("category", query.category.as_deref().unwrap_or_default()),
        ],
    );

    let mut context = TeraContext::new();
    context.insert("rows", &rows);
    context.insert("paginator", &paginator);
    context.insert("q", &query.q.clone().unwrap_or_default());
    context.insert("category_filter", &query.category.clone().unwrap_or_default());
    context.insert("categories", &categories);
    context.insert("filter_selected", &admin_query.category_id);
    context.insert("errors", errors);
    page.render(state, "admin/post_list.html", &context)
}

/// GET /admin/posts/
async fn post_list(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<AdminListQuery>,
) -> Result<Response, WebError> {
    render_post_list(&state, &page, &query, &FieldErrors::new()).await
}

/// Read the inline columns of every submitted row
fn listing_changes(pairs: &FormPairs) -> Result<Vec<ListingChange>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut changes = Vec::new();

    for raw_id in all_values(pairs, "post_id") {
        let Ok(post_id) = raw_id.trim().parse::<i64>() else {
            errors.add(NON_FIELD, format!("Invalid post ID: {}", raw_id));
            continue;
        };
        let category = text(pairs, &format!("category_{}", post_id));
        let category_id = if category.trim().is_empty() {
            None
        } else {
            match category.trim().parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add(
                        &format!("post-{}", post_id),
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    continue;
                }
            }
        };
        changes.push(ListingChange {
            post_id,
            is_published: checked(pairs, &format!("is_published_{}", post_id)),
            category_id,
        });
    }

    errors.into_result().map(|_| changes)
}

/// POST /admin/posts/ - save the inline columns
async fn post_list_save(
    State(state): State<AppState>,
    page: Page,
    CsrfForm(pairs): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    let query = AdminListQuery {
        q: first_value(&pairs, "q").map(String::from),
        category: first_value(&pairs, "category").map(String::from),
        page: first_value(&pairs, "page").map(String::from),
    };

    let result = match listing_changes(&pairs) {
        Ok(changes) => state.post_service.apply_listing_changes(&changes).await,
        Err(errors) => Err(PostServiceError::ValidationError(errors)),
    };

    match result {
        Ok(count) => {
            tracing::info!(count, "Admin post list saved");
            // the saved rows may have left the filter, shrinking the list
            let last_page = state.post_service.admin_last_page(&query.to_query()).await?;
            let page_no = parse_page(query.page.as_deref()).unwrap_or(1).min(last_page);
            let query = AdminListQuery {
                page: (page_no > 1).then(|| page_no.to_string()),
                ..query
            };
            let qs = query.query_string();
            if qs.is_empty() {
                Ok(redirect("/admin/posts/"))
            } else {
                Ok(redirect(&format!("/admin/posts/?{}", qs)))
            }
        }
        Err(PostServiceError::ValidationError(errors)) => {
            render_post_list(&state, &page, &query, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}

fn post_draft(pairs: &FormPairs) -> PostDraft {
    PostDraft {
        title: text(pairs, "title"),
        text: text(pairs, "text"),
        pub_date: text(pairs, "pub_date"),
        category_id: text(pairs, "category"),
        location_id: text(pairs, "location"),
        is_published: checked(pairs, "is_published"),
    }
}

async fn render_post_form(
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
    page.render(state, "admin/post_form.html", &context)
}

/// GET /admin/posts/add/
async fn post_add_form(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    render_post_form(&state, &page, &PostDraft::new_at(Utc::now()), &FieldErrors::new(), None).await
}

/// POST /admin/posts/add/ - the staff user becomes the author
async fn post_add(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    CsrfForm(pairs): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    let draft = post_draft(&pairs);
    match state.post_service.create(&user, &draft).await {
        Ok(_) => Ok(redirect("/admin/posts/")),
        Err(PostServiceError::ValidationError(errors)) => {
            render_post_form(&state, &page, &draft, &errors, None).await
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/posts/{id}/
async fn post_change_form(
    State(state): State<AppState>,
    page: Page,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let post = state.post_service.get(id).await?;
    render_post_form(&state, &page, &PostDraft::from_post(&post.post), &FieldErrors::new(), Some(&post)).await
}

/// POST /admin/posts/{id}/
async fn post_change(
    State(state): State<AppState>,
    page: Page,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(pairs): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    let draft = post_draft(&pairs);
    match state.post_service.admin_update(id, &draft).await {
        Ok(()) => Ok(redirect("/admin/posts/")),
        Err(PostServiceError::ValidationError(errors)) => {
            let post = state.post_service.get(id).await?;
            render_post_form(&state, &page, &draft, &errors, Some(&post)).await
        }
        Err(e) => Err(e.into()),
    }
}

fn render_confirm_delete(
    state: &AppState,
    page: &Page,
    kind: &str,
    name: &str,
    back_url: &str,
) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("kind", kind);
    context.insert("name", name);
    context.insert("back_url", back_url);
    page.render(state, "admin/confirm_delete.html", &context)
}

/// GET /admin/posts/{id}/delete/
async fn post_delete_confirm(
    State(state): State<AppState>,
    page: Page,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let post = state.post_service.get(id).await?;
    render_confirm_delete(&state, &page, "post", &post.post.title, &format!("/admin/posts/{}/", id))
}

/// POST /admin/posts/{id}/delete/
async fn post_delete(
    State(state): State<AppState>,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(_): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    state.post_service.admin_delete(id).await?;
    Ok(redirect("/admin/posts/"))
}

// ============================================================================
// Inline post row
// ============================================================================

/// Which parent the blank post row belongs to
#[derive(Debug, Clone, Copy)]
enum InlineParent {
    Category(i64),
    Location(i64),
}

/// The blank row, or `None` when it was left empty
fn inline_draft(pairs: &FormPairs, parent: InlineParent) -> Option<PostDraft> {
    let field = |name: &str| text(pairs, &format!("{}{}", INLINE_PREFIX, name));
    let (category_id, location_id) = match parent {
        InlineParent::Category(id) => (id.to_string(), field("location")),
        InlineParent::Location(id) => (field("category"), id.to_string()),
    };
    let draft = PostDraft {
        title: field("title"),
        text: field("text"),
        pub_date: field("pub_date"),
        category_id,
        location_id,
        is_published: checked(pairs, &format!("{}is_published", INLINE_PREFIX)),
    };
    (!draft.title.trim().is_empty() || !draft.text.trim().is_empty()).then_some(draft)
}

/// Validate the blank row before anything is saved. The parent and the row
/// are then written in one transaction.
async fn check_inline(
    state: &AppState,
    draft: Option<&PostDraft>,
) -> Result<Result<Option<PostInput>, FieldErrors>, WebError> {
    let Some(draft) = draft else {
        return Ok(Ok(None));
    };
    match state.post_service.prepare_draft(draft).await {
        Ok(input) => Ok(Ok(Some(input))),
        Err(PostServiceError::ValidationError(errors)) => Ok(Err(errors)),
        Err(e) => Err(e.into()),
    }
}

fn inline_post<'a>(author: &User, post: Option<&'a PostInput>) -> Option<(i64, &'a PostInput)> {
    post.map(|post| (author.id, post))
}

/// Context for the related posts and the blank row
async fn insert_inline(
    state: &AppState,
    context: &mut TeraContext,
    parent: InlineParent,
    draft: Option<&PostDraft>,
    errors: &FieldErrors,
) -> Result<(), WebError> {
    let blank = PostDraft::new_at(Utc::now());
    let draft = draft.unwrap_or(&blank);

    let related = match parent {
        InlineParent::Category(id) => state.post_service.all_in_category(id).await?,
        InlineParent::Location(id) => state.post_service.all_at_location(id).await?,
    };
    let choices = match parent {
        InlineParent::Category(_) => {
            location_choices(&state.location_service.list().await?, &draft.location_id)
        }
        InlineParent::Location(_) => {
            category_choices(&state.category_service.list().await?, &draft.category_id)
        }
    };

    context.insert("related_posts", &related);
    context.insert("inline", draft);
    context.insert("inline_errors", errors);
    context.insert("inline_choices", &choices);
    Ok(())
}

// ============================================================================
// Categories
// ============================================================================

/// GET /admin/categories/
async fn category_list(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("categories", &state.category_service.list().await?);
    page.render(&state, "admin/category_list.html", &context)
}

fn category_input(pairs: &FormPairs) -> CategoryInput {
    CategoryInput {
        title: text(pairs, "title"),
        description: text(pairs, "description"),
        slug: text(pairs, "slug"),
        is_published: checked(pairs, "is_published"),
    }
}

fn category_form_context(form: &CategoryInput, errors: &FieldErrors, category: Option<&Category>) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("category", &category);
    context
}

/// GET /admin/categories/add/
async fn category_add_form(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let blank = CategoryInput {
        title: String::new(),
        description: String::new(),
        slug: String::new(),
        is_published: true,
    };
    let context = category_form_context(&blank, &FieldErrors::new(), None);
    page.render(&state, "admin/category_form.html", &context)
}

/// POST /admin/categories/add/
async fn category_add(
    State(state): State<AppState>,
    page: Page,
    CsrfForm(pairs): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    let input = category_input(&pairs);
    match state.category_service.create(input.clone()).await {
        Ok(_) => Ok(redirect("/admin/categories/")),
        Err(CategoryServiceError::ValidationError(errors)) => {
            let context = category_form_context(&input, &errors, None);
            page.render(&state, "admin/category_form.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

async fn render_category_change(
    state: &AppState,
    page: &Page,
    category: &Category,
    form: &CategoryInput,
    errors: &FieldErrors,
    inline: Option<&PostDraft>,
    inline_errors: &FieldErrors,
) -> Result<Response, WebError> {
    let mut context = category_form_context(form, errors, Some(category));
    insert_inline(state, &mut context, InlineParent::Category(category.id), inline, inline_errors).await?;
    page.render(state, "admin/category_form.html", &context)
}

/// GET /admin/categories/{id}/
async fn category_change_form(
    State(state): State<AppState>,
    page: Page,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let category = state.category_service.get_by_id(id).await?;
    let form = CategoryInput {
        title: category.title.clone(),
        description: category.description.clone(),
        slug: category.slug.clone(),
        is_published: category.is_published,
    };
    render_category_change(&state, &page, &category, &form, &FieldErrors::new(), None, &FieldErrors::new()).await
}

/// POST /admin/categories/{id}/
async fn category_change(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(pairs): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    let category = state.category_service.get_by_id(id).await?;
    let input = category_input(&pairs);
    let inline = inline_draft(&pairs, InlineParent::Category(id));

    let post = match check_inline(&state, inline.as_ref()).await? {
        Ok(post) => post,
        Err(inline_errors) => {
            return render_category_change(&state, &page, &category, &input, &FieldErrors::new(), inline.as_ref(), &inline_errors)
                .await;
        }
    };

    match state
        .category_service
        .update_with_post(id, input.clone(), inline_post(&user, post.as_ref()))
        .await
    {
        Ok(_) => {
            if post.is_some() {
                tracing::info!(category_id = id, author_id = user.id, "Post added from category screen");
            }
            Ok(redirect("/admin/categories/"))
        }
        Err(CategoryServiceError::ValidationError(errors)) => {
            render_category_change(&state, &page, &category, &input, &errors, inline.as_ref(), &FieldErrors::new())
                .await
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/categories/{id}/delete/
async fn category_delete_confirm(
    State(state): State<AppState>,
    page: Page,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let category = state.category_service.get_by_id(id).await?;
    render_confirm_delete(&state, &page, "category", &category.title, &format!("/admin/categories/{}/", id))
}

/// POST /admin/categories/{id}/delete/
async fn category_delete(
    State(state): State<AppState>,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(_): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    state.category_service.delete(id).await?;
    Ok(redirect("/admin/categories/"))
}

// ============================================================================
// Locations
// ============================================================================

/// GET /admin/locations/
async fn location_list(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("locations", &state.location_service.list().await?);
    page.render(&state, "admin/location_list.html", &context)
}

fn location_input(pairs: &FormPairs) -> LocationInput {
    LocationInput {
        name: text(pairs, "name"),
        is_published: checked(pairs, "is_published"),
    }
}

fn location_form_context(form: &LocationInput, errors: &FieldErrors, location: Option<&Location>) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("location", &location);
    context
}

/// GET /admin/locations/add/
async fn location_add_form(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let blank = LocationInput {
        name: String::new(),
        is_published: true,
    };
    let context = location_form_context(&blank, &FieldErrors::new(), None);
    page.render(&state, "admin/location_form.html", &context)
}

/// POST /admin/locations/add/
async fn location_add(
    State(state): State<AppState>,
    page: Page,
    CsrfForm(pairs): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    let input = location_input(&pairs);
    match state.location_service.create(input.clone()).await {
        Ok(_) => Ok(redirect("/admin/locations/")),
        Err(LocationServiceError::ValidationError(errors)) => {
            let context = location_form_context(&input, &errors, None);
            page.render(&state, "admin/location_form.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

async fn render_location_change(
    state: &AppState,
    page: &Page,
    location: &Location,
    form: &LocationInput,
    errors: &FieldErrors,
    inline: Option<&PostDraft>,
    inline_errors: &FieldErrors,
) -> Result<Response, WebError> {
    let mut context = location_form_context(form, errors, Some(location));
    insert_inline(state, &mut context, InlineParent::Location(location.id), inline, inline_errors).await?;
    page.render(state, "admin/location_form.html", &context)
}

/// GET /admin/locations/{id}/
async fn location_change_form(
    State(state): State<AppState>,
    page: Page,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let location = state.location_service.get_by_id(id).await?;
    let form = LocationInput {
        name: location.name.clone(),
        is_published: location.is_published,
    };
    render_location_change(&state, &page, &location, &form, &FieldErrors::new(), None, &FieldErrors::new()).await
}

/// POST /admin/locations/{id}/
async fn location_change(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(pairs): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    let location = state.location_service.get_by_id(id).await?;
    let input = location_input(&pairs);
    let inline = inline_draft(&pairs, InlineParent::Location(id));

    let post = match check_inline(&state, inline.as_ref()).await? {
        Ok(post) => post,
        Err(inline_errors) => {
            return render_location_change(&state, &page, &location, &input, &FieldErrors::new(), inline.as_ref(), &inline_errors)
                .await;
        }
    };

    match state
        .location_service
        .update_with_post(id, input.clone(), inline_post(&user, post.as_ref()))
        .await
    {
        Ok(_) => {
            if post.is_some() {
                tracing::info!(location_id = id, author_id = user.id, "Post added from location screen");
            }
            Ok(redirect("/admin/locations/"))
        }
        Err(LocationServiceError::ValidationError(errors)) => {
            render_location_change(&state, &page, &location, &input, &errors, inline.as_ref(), &FieldErrors::new())
                .await
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/locations/{id}/delete/
async fn location_delete_confirm(
    State(state): State<AppState>,
    page: Page,
    RoutePath(id): RoutePath<i64>,
) -> Result<Response, WebError> {
    let location = state.location_service.get_by_id(id).await?;
    render_confirm_delete(&state, &page, "location", &location.name, &format!("/admin/locations/{}/", id))
}

/// POST /admin/locations/{id}/delete/
async fn location_delete(
    State(state): State<AppState>,
    RoutePath(id): RoutePath<i64>,
    CsrfForm(_): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    state.location_service.delete(id).await?;
    Ok(redirect("/admin/locations/"))
}
