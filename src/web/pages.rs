//! Static pages

use axum::{extract::State, response::Response, routing::get, Router};
use tera::Context as TeraContext;

use crate::web::common::Page;
use crate::web::error::WebError;
use crate::web::middleware::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pages/about/", get(about))
        .route("/pages/rules/", get(rules))
}

async fn about(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    page.render(&state, "pages/about.html", &TeraContext::new())
}

async fn rules(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    page.render(&state, "pages/rules.html", &TeraContext::new())
}

/// Fallback for every unmatched route
pub async fn not_found() -> WebError {
    WebError::NotFound
}
