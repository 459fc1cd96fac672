//! Shared handler utilities
//!
//! Request extractors for the signed-in user, CSRF-checked form bodies and
//! the page context every template receives, plus the view structs that
//! pagination and select boxes render from.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use tera::Context as TeraContext;

use crate::models::{Category, Location, PagedResult, User};
use crate::theme::StandardTemplateVars;
use crate::web::error::WebError;
use crate::web::middleware::{standard_vars, AppState, AuthenticatedUser, CsrfToken, CSRF_FIELD};

// ============================================================================
// User extractors
// ============================================================================

/// The signed-in user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// The signed-in user; anonymous visitors are sent to the login page
#[derive(Debug, Clone)]
pub struct RequireUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for RequireUser {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|u| RequireUser(u.0.clone()))
            .ok_or_else(|| WebError::LoginRequired {
                next: path_and_query(parts),
            })
    }
}

fn path_and_query(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Client address for rate limiting: proxy headers first, then the socket
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_ip = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse::<IpAddr>().ok())
        };

        let ip = header_ip("x-forwarded-for")
            .or_else(|| header_ip("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            });
        Ok(ClientIp(ip))
    }
}

/// Path parameters; anything that does not parse is not found
#[derive(Debug, Clone)]
pub struct RoutePath<T>(pub T);

impl<S, T> FromRequestParts<S> for RoutePath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| RoutePath(value))
            .map_err(|e| {
                tracing::debug!("Unmatched path parameters: {}", e);
                WebError::NotFound
            })
    }
}

// ============================================================================
// Forms
// ============================================================================

/// A URL-encoded form body whose CSRF token matches the visitor's cookie.
///
/// Must be the last extractor of a handler, so login checks run first.
#[derive(Debug, Clone)]
pub struct CsrfForm<T>(pub T);

/// Every submitted field in order, repeated keys included
pub type FormPairs = Vec<(String, String)>;

impl<S, T> FromRequest<S> for CsrfForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = WebError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let expected = req.extensions().get::<CsrfToken>().cloned();
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| WebError::BadRequest(format!("Failed to read form body: {}", e)))?;

        let pairs: FormPairs = serde_urlencoded::from_bytes(&body)
            .map_err(|e| WebError::BadRequest(format!("Malformed form body: {}", e)))?;
        let submitted = pairs
            .iter()
            .find(|(key, _)| key == CSRF_FIELD)
            .map(|(_, value)| value.as_str());

        match (expected, submitted) {
            (Some(token), Some(submitted)) if token.from_cookie && tokens_match(&token.value, submitted) => {}
            _ => return Err(WebError::CsrfFailure),
        }

        let value = serde_urlencoded::from_bytes(&body)
            .map_err(|e| WebError::BadRequest(format!("Invalid form: {}", e)))?;
        Ok(CsrfForm(value))
    }
}

/// Compare without stopping at the first differing byte
fn tokens_match(expected: &str, submitted: &str) -> bool {
    expected.len() == submitted.len()
        && expected
            .bytes()
            .zip(submitted.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// HTML checkboxes submit a value only when ticked
pub fn is_checked(value: &Option<String>) -> bool {
    value.is_some()
}

/// Form fields that repeat, like the row IDs of an inline list
pub fn all_values<'a>(pairs: &'a FormPairs, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    pairs
        .iter()
        .filter(move |(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn first_value<'a>(pairs: &'a FormPairs, key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

// ============================================================================
// Page context
// ============================================================================

/// Everything a full-page render needs besides the handler's own context
#[derive(Debug, Clone)]
pub struct Page {
    pub user: Option<User>,
    pub vars: StandardTemplateVars,
}

impl FromRequestParts<AppState> for Page {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone());
        let csrf = parts.extensions.get::<CsrfToken>();
        let vars = standard_vars(&state.config, parts.uri.path(), csrf, user.as_ref());
        Ok(Page { user, vars })
    }
}

impl Page {
    pub fn render(&self, state: &AppState, template: &str, context: &TeraContext) -> Result<Response, WebError> {
        self.render_status(state, StatusCode::OK, template, context)
    }

    pub fn render_status(
        &self,
        state: &AppState,
        status: StatusCode,
        template: &str,
        context: &TeraContext,
    ) -> Result<Response, WebError> {
        let html = state
            .theme_engine
            .render_with_standard_vars(template, context, &self.vars)?;
        Ok((status, Html(html)).into_response())
    }

    /// Same page with the signed-in user replaced, e.g. right after logout
    pub fn with_user(mut self, user: Option<&User>) -> Self {
        self.vars.current_user = user.map(|u| crate::theme::CurrentUser {
            id: u.id,
            username: u.username.clone(),
            is_staff: u.is_staff(),
        });
        self.user = user.cloned();
        self
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// `?page=` of every paginated listing
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// Page 1 when absent; anything that is not a positive number is not found
    pub fn number(&self) -> Result<u32, WebError> {
        parse_page(self.page.as_deref())
    }
}

pub fn parse_page(raw: Option<&str>) -> Result<u32, WebError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(1),
        Some(value) => value
            .parse::<u32>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or(WebError::NotFound),
    }
}

/// Page links as templates render them
#[derive(Debug, Clone, Serialize)]
pub struct Paginator {
    pub number: u32,
    pub num_pages: u32,
    pub total: i64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_page: u32,
    pub next_page: u32,
    /// Query string kept on page links, ending in `&` when not empty
    pub query: String,
}

impl Paginator {
    pub fn new<T>(result: &PagedResult<T>) -> Self {
        Self::with_query(result, &[])
    }

    /// Page links that keep other query parameters, like an admin search
    pub fn with_query<T>(result: &PagedResult<T>, params: &[(&str, &str)]) -> Self {
        let query = params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}={}&", key, urlencoding::encode(value)))
            .collect::<String>();

        Self {
            number: result.page,
            num_pages: result.total_pages().max(1),
            total: result.total,
            has_previous: result.has_prev(),
            has_next: result.has_next(),
            previous_page: result.page.saturating_sub(1).max(1),
            next_page: result.page + 1,
            query,
        }
    }
}

// ============================================================================
// Select boxes
// ============================================================================

/// One `<option>` of a select box
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Choice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

const EMPTY_LABEL: &str = "---------";

fn choices<I>(options: I, selected: &str) -> Vec<Choice>
where
    I: IntoIterator<Item = (String, String)>,
{
    let selected = selected.trim();
    std::iter::once((String::new(), EMPTY_LABEL.to_string()))
        .chain(options)
        .map(|(value, label)| Choice {
            selected: value == selected,
            value,
            label,
        })
        .collect()
}

pub fn category_choices(categories: &[Category], selected: &str) -> Vec<Choice> {
    choices(
        categories.iter().map(|c| (c.id.to_string(), c.title.clone())),
        selected,
    )
}

pub fn location_choices(locations: &[Location], selected: &str) -> Vec<Choice> {
    choices(
        locations.iter().map(|l| (l.id.to_string(), l.name.clone())),
        selected,
    )
}

// ============================================================================
// Redirects
// ============================================================================

/// A `next` target that stays on this site, else `/`
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

pub fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

pub fn post_detail_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}/", urlencoding::encode(username))
}
