//! Handler errors
//!
//! A [`WebError`] becomes a bare response carrying an [`ErrorPage`] marker.
//! The error page middleware turns the marker into a rendered template, so
//! handlers never need the theme engine to fail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};

use crate::services::{
    CategoryServiceError, CommentServiceError, LocationServiceError, PostServiceError,
    UserServiceError,
};

/// Which error template to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPage {
    NotFound,
    CsrfFailure,
    Forbidden,
    BadRequest,
    Internal,
}

impl ErrorPage {
    pub fn template(self) -> &'static str {
        match self {
            ErrorPage::NotFound => "pages/404.html",
            ErrorPage::CsrfFailure => "pages/403csrf.html",
            ErrorPage::Forbidden => "pages/403.html",
            ErrorPage::BadRequest => "pages/400.html",
            ErrorPage::Internal => "pages/500.html",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorPage::NotFound => StatusCode::NOT_FOUND,
            ErrorPage::CsrfFailure | ErrorPage::Forbidden => StatusCode::FORBIDDEN,
            ErrorPage::BadRequest => StatusCode::BAD_REQUEST,
            ErrorPage::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ErrorPage::NotFound => "Page not found",
            ErrorPage::CsrfFailure => "CSRF verification failed",
            ErrorPage::Forbidden => "Access denied",
            ErrorPage::BadRequest => "Bad request",
            ErrorPage::Internal => "Server error",
        }
    }

    /// Marker response the error page middleware picks up
    pub fn into_marker(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(self);
        response
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Not found")]
    NotFound,

    #[error("CSRF token missing or incorrect")]
    CsrfFailure,

    #[error("Forbidden")]
    Forbidden,

    /// Anonymous access to a page that needs a login
    #[error("Login required")]
    LoginRequired { next: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Where an anonymous visitor is sent to sign in
pub fn login_url(next: &str) -> String {
    format!("/auth/login/?next={}", urlencoding::encode(next))
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let page = match self {
            WebError::LoginRequired { next } => {
                return Redirect::to(&login_url(&next)).into_response();
            }
            WebError::NotFound => ErrorPage::NotFound,
            WebError::CsrfFailure => {
                tracing::warn!("Rejected POST with a missing or wrong CSRF token");
                ErrorPage::CsrfFailure
            }
            WebError::Forbidden => ErrorPage::Forbidden,
            WebError::BadRequest(reason) => {
                tracing::debug!("Bad request: {}", reason);
                ErrorPage::BadRequest
            }
            WebError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                ErrorPage::Internal
            }
        };
        page.into_marker()
    }
}

impl From<PostServiceError> for WebError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(_) => WebError::NotFound,
            PostServiceError::Forbidden(_) => WebError::Forbidden,
            PostServiceError::ValidationError(errors) => WebError::BadRequest(errors.to_string()),
            PostServiceError::InternalError(e) => WebError::Internal(e),
        }
    }
}

impl From<CommentServiceError> for WebError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::NotFound(_) => WebError::NotFound,
            CommentServiceError::ValidationError(errors) => WebError::BadRequest(errors.to_string()),
            CommentServiceError::InternalError(e) => WebError::Internal(e),
        }
    }
}

impl From<CategoryServiceError> for WebError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(_) => WebError::NotFound,
            CategoryServiceError::ValidationError(errors) => WebError::BadRequest(errors.to_string()),
            CategoryServiceError::InternalError(e) => WebError::Internal(e),
        }
    }
}

impl From<LocationServiceError> for WebError {
    fn from(e: LocationServiceError) -> Self {
        match e {
            LocationServiceError::NotFound(_) => WebError::NotFound,
            LocationServiceError::ValidationError(errors) => WebError::BadRequest(errors.to_string()),
            LocationServiceError::InternalError(e) => WebError::Internal(e),
        }
    }
}

impl From<UserServiceError> for WebError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound(_) => WebError::NotFound,
            UserServiceError::AuthenticationError(msg) => WebError::BadRequest(msg),
            UserServiceError::ValidationError(errors) => WebError::BadRequest(errors.to_string()),
            UserServiceError::InternalError(e) => WebError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_login_required_redirects_with_next() {
        let response = WebError::LoginRequired { next: "/posts/create/?a=1".into() }.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/auth/login/?next=%2Fposts%2Fcreate%2F%3Fa%3D1"
        );
    }

    #[test]
    fn test_errors_carry_page_marker() {
        let response = WebError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.extensions().get::<ErrorPage>(), Some(&ErrorPage::NotFound));

        let response = WebError::CsrfFailure.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.extensions().get::<ErrorPage>(), Some(&ErrorPage::CsrfFailure));
    }

    #[test]
    fn test_service_errors_map_to_pages() {
        let e: WebError = PostServiceError::NotFound("1".into()).into();
        assert!(matches!(e, WebError::NotFound));
        let e: WebError = CommentServiceError::InternalError(anyhow::anyhow!("boom")).into();
        assert!(matches!(e, WebError::Internal(_)));
    }
}
