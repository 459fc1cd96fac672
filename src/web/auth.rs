//! Registration and login
//!
//! - GET/POST /auth/registration/ - sign up, then go to the login page
//! - GET/POST /auth/login/ - sign in, honouring a local `next`
//! - POST /auth/logout/ - end the session
//!
//! Login attempts are rate limited per client IP and per account.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::models::CreateUserInput;
use crate::services::validation::NON_FIELD;
use crate::services::{FieldErrors, LoginInput, LoginKey, UserServiceError};
use crate::web::common::{redirect, safe_next, ClientIp, CsrfForm, FormPairs, Page};
use crate::web::error::WebError;
use crate::web::middleware::{build_cookie, expire_cookie, read_cookie, AppState, SESSION_COOKIE};

const TOO_MANY_ATTEMPTS: &str = "Too many login attempts. Please try again later.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/registration/", get(registration_form).post(register))
        .route("/auth/login/", get(login_form).post(login))
        .route("/auth/logout/", post(logout))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

fn render_registration(
    state: &AppState,
    page: &Page,
    username: &str,
    email: &str,
    errors: &FieldErrors,
) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("email", email);
    context.insert("errors", errors);
    page.render(state, "registration/registration_form.html", &context)
}

/// GET /auth/registration/
async fn registration_form(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    render_registration(&state, &page, "", "", &FieldErrors::new())
}

/// POST /auth/registration/
async fn register(
    State(state): State<AppState>,
    page: Page,
    CsrfForm(form): CsrfForm<RegistrationForm>,
) -> Result<Response, WebError> {
    let input = CreateUserInput {
        username: form.username.clone(),
        email: form.email.clone(),
        password: form.password1,
        password_confirm: form.password2,
    };

    match state.user_service.register(input).await {
        Ok(_) => Ok(redirect("/auth/login/")),
        Err(UserServiceError::ValidationError(errors)) => {
            render_registration(&state, &page, &form.username, &form.email, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

fn render_login(
    state: &AppState,
    page: &Page,
    status: StatusCode,
    username: &str,
    next: &str,
    errors: &FieldErrors,
) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("next", next);
    context.insert("errors", errors);
    page.render_status(state, status, "registration/login.html", &context)
}

/// GET /auth/login/
async fn login_form(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<NextQuery>,
) -> Result<Response, WebError> {
    let next = query.next.unwrap_or_default();
    render_login(&state, &page, StatusCode::OK, "", &next, &FieldErrors::new())
}

/// POST /auth/login/
async fn login(
    State(state): State<AppState>,
    page: Page,
    ClientIp(ip): ClientIp,
    CsrfForm(form): CsrfForm<LoginForm>,
) -> Result<Response, WebError> {
    let next = form.next.clone().unwrap_or_default();
    let limited = |state: &AppState, page: &Page| {
        render_login(
            state,
            page,
            StatusCode::TOO_MANY_REQUESTS,
            &form.username,
            &next,
            &FieldErrors::single(NON_FIELD, TOO_MANY_ATTEMPTS),
        )
    };

    // 10 requests per minute per address
    if let Some(ip) = ip {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Login rate limit exceeded for address");
            return limited(&state, &page);
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    // 5 failures per 15 minutes per account
    let key = match state.user_service.find_login_account(form.username.trim()).await? {
        Some(account) => LoginKey::Account(account.id),
        None => LoginKey::unknown(&form.username),
    };
    if state.rate_limiter.is_login_limited(&key).await {
        tracing::warn!(username = %form.username, "Login rate limit exceeded for account");
        return limited(&state, &page);
    }

    let input = LoginInput::new(form.username.clone(), form.password.clone());
    let (session, user) = match state.user_service.login(input).await {
        Ok(pair) => pair,
        Err(UserServiceError::AuthenticationError(message)) => {
            state.rate_limiter.record_failed_attempt(key).await;
            tracing::info!(username = %form.username, "Failed login");
            return render_login(
                &state,
                &page,
                StatusCode::OK,
                &form.username,
                &next,
                &FieldErrors::single(NON_FIELD, message),
            );
        }
        Err(e) => return Err(e.into()),
    };

    state.rate_limiter.clear_failed_attempts(&key).await;
    tracing::info!(user_id = user.id, "User logged in");

    let cookie = build_cookie(
        SESSION_COOKIE,
        &session.id,
        state.user_service.session_expiration_days() * 24 * 60 * 60,
        state.config.auth.secure_cookies,
    );
    let mut response = redirect(&safe_next(Some(&next)));
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| WebError::Internal(e.into()))?,
    );
    Ok(response)
}

/// POST /auth/logout/
async fn logout(
    State(state): State<AppState>,
    page: Page,
    request_headers: HeaderMap,
    CsrfForm(_): CsrfForm<FormPairs>,
) -> Result<Response, WebError> {
    if let Some(token) = read_cookie(&request_headers, SESSION_COOKIE) {
        state.user_service.logout(&token).await?;
    }

    let page = page.with_user(None);
    let mut response = page.render(&state, "registration/logged_out.html", &TeraContext::new())?;
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&expire_cookie(SESSION_COOKIE)).map_err(|e| WebError::Internal(e.into()))?,
    );
    Ok(response)
}
