//! Web layer - HTTP handlers and routing
//!
//! Server-rendered pages:
//! - Public feed, post detail, category and profile pages
//! - Author forms for posts, comments and the profile
//! - Registration, login and logout
//! - Staff-only admin screens
//! - Static pages and theme assets

pub mod admin;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod error;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod profile;
pub mod static_files;

#[cfg(test)]
mod tests;

use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxLocationRepository, SqlxPostRepository,
    SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    CategoryService, CommentService, LocationService, LoginRateLimiter, PostService, UserService,
};
use crate::theme::ThemeEngine;

pub use error::{ErrorPage, WebError};
pub use middleware::AppState;

/// Wire repositories and services over one pool
pub fn build_state(config: Config, pool: DynDatabasePool, theme_engine: ThemeEngine) -> AppState {
    let users = SqlxUserRepository::boxed(pool.clone());
    let sessions = SqlxSessionRepository::boxed(pool.clone());
    let categories = SqlxCategoryRepository::boxed(pool.clone());
    let locations = SqlxLocationRepository::boxed(pool.clone());
    let posts = SqlxPostRepository::boxed(pool.clone());
    let comments = SqlxCommentRepository::boxed(pool.clone());

    let user_service = UserService::with_session_expiration(
        users,
        sessions,
        config.auth.session_expiration_days,
    );
    let post_service = PostService::new(
        posts.clone(),
        categories.clone(),
        locations.clone(),
        config.blog.posts_per_page,
    );

    AppState {
        pool,
        user_service: Arc::new(user_service),
        post_service: Arc::new(post_service),
        category_service: Arc::new(CategoryService::new(categories, Arc::new(MemoryCache::new()))),
        location_service: Arc::new(LocationService::new(locations)),
        comment_service: Arc::new(CommentService::new(comments, posts)),
        theme_engine: Arc::new(theme_engine),
        rate_limiter: Arc::new(LoginRateLimiter::new()),
        config: Arc::new(config),
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(posts::router())
        .merge(comments::router())
        .merge(categories::router())
        .merge(profile::router())
        .merge(auth::router())
        .merge(pages::router())
        .merge(admin::router())
        .merge(static_files::router())
        .fallback(pages::not_found)
        // innermost: a panicking handler still gets an error page
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::render_error_pages,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_current_user,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_cookie,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
