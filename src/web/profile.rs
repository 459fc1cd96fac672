//! User profiles

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::models::UpdateProfileInput;
use crate::services::{FieldErrors, UserServiceError};
use crate::web::common::{profile_url, redirect, CsrfForm, MaybeUser, Page, PageQuery, Paginator, RequireUser, RoutePath};
use crate::web::error::WebError;
use crate::web::middleware::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile/{username}/", get(profile))
        .route("/edit_profile/", get(edit_profile_form).post(edit_profile))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl From<ProfileForm> for UpdateProfileInput {
    fn from(form: ProfileForm) -> Self {
        UpdateProfileInput {
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
        }
    }
}

/// GET /profile/{username}/ - the owner also sees unpublished posts
async fn profile(
    State(state): State<AppState>,
    page: Page,
    MaybeUser(viewer): MaybeUser,
    RoutePath(username): RoutePath<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let profile = state
        .user_service
        .get_by_username(&username)
        .await?
        .ok_or(WebError::NotFound)?;

    let result = state
        .post_service
        .list_for_profile(&profile, viewer.as_ref(), query.number()?)
        .await?;

    let mut context = TeraContext::new();
    context.insert("profile", &profile);
    context.insert("profile_name", &profile.display_name());
    context.insert("is_owner", &viewer.as_ref().is_some_and(|v| v.id == profile.id));
    context.insert("posts", &result.items);
    context.insert("paginator", &Paginator::new(&result));
    page.render(&state, "blog/profile.html", &context)
}

fn render_profile_form(
    state: &AppState,
    page: &Page,
    form: &UpdateProfileInput,
    errors: &FieldErrors,
) -> Result<Response, WebError> {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    page.render(state, "blog/user.html", &context)
}

/// GET /edit_profile/
async fn edit_profile_form(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
) -> Result<Response, WebError> {
    let form = UpdateProfileInput {
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        email: user.email.clone(),
    };
    render_profile_form(&state, &page, &form, &FieldErrors::new())
}

/// POST /edit_profile/
async fn edit_profile(
    State(state): State<AppState>,
    page: Page,
    RequireUser(user): RequireUser,
    CsrfForm(form): CsrfForm<ProfileForm>,
) -> Result<Response, WebError> {
    let input = UpdateProfileInput::from(form);
    match state.user_service.update_profile(user.id, input.clone()).await {
        Ok(updated) => Ok(redirect(&profile_url(&updated.username))),
        Err(UserServiceError::ValidationError(errors)) => {
            render_profile_form(&state, &page, &input, &errors)
        }
        Err(e) => Err(e.into()),
    }
}
