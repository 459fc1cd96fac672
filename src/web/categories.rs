//! Public category page

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use tera::Context as TeraContext;

use crate::web::common::{Page, PageQuery, Paginator, RoutePath};
use crate::web::error::WebError;
use crate::web::middleware::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/category/{slug}/", get(category_posts))
}

/// GET /category/{slug}/ - hidden categories are not found
async fn category_posts(
    State(state): State<AppState>,
    page: Page,
    RoutePath(slug): RoutePath<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let category = state.category_service.get_published_by_slug(&slug).await?;
    let result = state
        .post_service
        .list_in_category(category.id, query.number()?)
        .await?;

    let mut context = TeraContext::new();
    context.insert("category", &category);
    context.insert("posts", &result.items);
    context.insert("paginator", &Paginator::new(&result));
    page.render(&state, "blog/category.html", &context)
}
