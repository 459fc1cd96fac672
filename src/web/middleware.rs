//! Request middleware
//!
//! Layered around every route, outermost first:
//! - CSRF cookie: make sure each visitor has a `csrftoken` cookie
//! - Current user: resolve the `session` cookie to a user
//! - Error pages: render the template for any [`ErrorPage`] marker
//! - Panic catcher: turn a panic into a 500 marker
//!
//! [`require_staff`] guards the admin routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Response},
};
use axum::middleware::Next;
use chrono::{Datelike, Utc};
use std::any::Any;
use std::sync::Arc;
use tera::Context as TeraContext;
use uuid::Uuid;

use crate::config::Config;
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    visibility,
    CategoryService, CommentService, LocationService, LoginRateLimiter, PostService, UserService,
};
use crate::theme::{CurrentUser, StandardTemplateVars, ThemeEngine};
use crate::web::error::{ErrorPage, WebError};

pub const SESSION_COOKIE: &str = "session";
pub const CSRF_COOKIE: &str = "csrftoken";
/// Form field carrying the CSRF token
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";

/// CSRF cookie lifetime, one year
const CSRF_COOKIE_MAX_AGE: i64 = 365 * 24 * 60 * 60;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub category_service: Arc<CategoryService>,
    pub location_service: Arc<LocationService>,
    pub comment_service: Arc<CommentService>,
    pub theme_engine: Arc<ThemeEngine>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

/// Signed-in user, present in request extensions when the session is live
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The visitor's CSRF token
#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub value: String,
    /// False when the token was minted for this request because the browser
    /// sent no cookie; a POST can never pass the check then
    pub from_cookie: bool,
}

/// Value of a cookie from the `Cookie` header
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a cookie readable only by the server
pub fn build_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that deletes a cookie
pub fn expire_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

fn is_token_shaped(token: &str) -> bool {
    (16..=64).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Attach the visitor's CSRF token, issuing a cookie when they have none
pub async fn csrf_cookie(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let existing = read_cookie(request.headers(), CSRF_COOKIE).filter(|t| is_token_shaped(t));

    let token = match existing {
        Some(value) => CsrfToken { value, from_cookie: true },
        None => CsrfToken {
            value: Uuid::new_v4().simple().to_string(),
            from_cookie: false,
        },
    };
    request.extensions_mut().insert(token.clone());

    let mut response = next.run(request).await;

    if !token.from_cookie {
        let cookie = build_cookie(
            CSRF_COOKIE,
            &token.value,
            CSRF_COOKIE_MAX_AGE,
            state.config.auth.secure_cookies,
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Resolve the session cookie into an [`AuthenticatedUser`]
pub async fn load_current_user(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = read_cookie(request.headers(), SESSION_COOKIE) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session validation failed: {}", e),
        }
    }
    next.run(request).await
}

/// Staff authorization middleware
///
/// Anonymous visitors go to the login page; signed-in non-staff users get
/// the access denied page.
pub async fn require_staff(request: Request, next: Next) -> Result<Response, WebError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| WebError::LoginRequired {
            next: request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/admin/".to_string()),
        })?;

    if !visibility::is_staff(&user.0) {
        tracing::debug!(user_id = user.0.id, "Non-staff user refused from admin");
        return Err(WebError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// Standard template variables for the request being served
pub fn standard_vars(
    config: &Config,
    path: &str,
    csrf: Option<&CsrfToken>,
    user: Option<&User>,
) -> StandardTemplateVars {
    StandardTemplateVars {
        site_name: config.blog.site_name.clone(),
        request_path: path.to_string(),
        year: Utc::now().year(),
        csrf_token: csrf.map(|t| t.value.clone()).unwrap_or_default(),
        current_user: user.map(|u| CurrentUser {
            id: u.id,
            username: u.username.clone(),
            is_staff: u.is_staff(),
        }),
    }
}

/// Replace the body of marked error responses with the error template
pub async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let csrf = request.extensions().get::<CsrfToken>().cloned();
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.clone());

    let response = next.run(request).await;

    let Some(page) = response.extensions().get::<ErrorPage>().copied() else {
        return response;
    };

    let vars = standard_vars(&state.config, &path, csrf.as_ref(), user.as_ref());
    let mut context = TeraContext::new();
    context.insert("site_name", &vars.site_name);
    context.insert("request_path", &vars.request_path);
    context.insert("year", &vars.year);
    context.insert("csrf_token", &vars.csrf_token);
    context.insert("current_user", &vars.current_user);
    context.insert("error_title", page.title());

    let html = state
        .theme_engine
        .render_with_fallback(page.template(), &context, page.title());

    let (mut parts, _) = response.into_parts();
    let mut rendered = (page.status(), Html(html)).into_response();
    // keep cookies set further in
    for cookie in parts.headers.get_all(header::SET_COOKIE) {
        rendered.headers_mut().append(header::SET_COOKIE, cookie.clone());
    }
    rendered.extensions_mut().extend(std::mem::take(&mut parts.extensions));
    rendered
}

/// `CatchPanicLayer` handler
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!("Handler panicked: {}", detail);
    ErrorPage::Internal.into_marker()
}
