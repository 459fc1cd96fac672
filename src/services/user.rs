//! User service
//!
//! Registration, login, sessions and profile editing. The first account
//! registered on an empty database becomes staff; everyone after that is a
//! regular author.

use crate::db::repositories::{is_unique_violation, SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, UpdateProfileInput, User, UserRole};
use crate::services::password::{hash_password, password_problems, verify_password};
use crate::services::validation::{is_valid_email, is_valid_username, FieldErrors};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const NAME_MAX_LENGTH: usize = 150;

const USERNAME_TAKEN: &str = "A user with that username already exists.";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Wrong username or password
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for UserServiceError {
    fn from(errors: FieldErrors) -> Self {
        UserServiceError::ValidationError(errors)
    }
}

/// Login form contents
#[derive(Debug, Clone)]
pub struct LoginInput {
    /// Username, or the email address of the account
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Register a new account.
    ///
    /// Every field problem is reported at once through `ValidationError`,
    /// including a username or email that is already taken.
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        let mut errors = FieldErrors::new();

        if errors.require("username", &username) {
            errors.max_chars("username", &username, USERNAME_MAX_LENGTH);
            if !is_valid_username(&username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            } else if self
                .user_repo
                .get_by_username(&username)
                .await
                .context("Failed to check username")?
                .is_some()
            {
                errors.add("username", USERNAME_TAKEN);
            }
        }

        if !email.is_empty() {
            errors.max_chars("email", &email, EMAIL_MAX_LENGTH);
            if !is_valid_email(&email) {
                errors.add("email", "Enter a valid email address.");
            } else if self
                .user_repo
                .get_by_email(&email)
                .await
                .context("Failed to check email")?
                .is_some()
            {
                errors.add("email", "A user with that email already exists.");
            }
        }

        if errors.require("password1", &input.password) {
            for problem in password_problems(&input.password, &username) {
                errors.add("password1", problem);
            }
        }
        if input.password != input.password_confirm {
            errors.add("password2", "The two password fields didn't match.");
        }

        errors.into_result()?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(username, email, password_hash, UserRole::Author);

        // a concurrent sign-up can take the name after the check above
        let created = match self.user_repo.register(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(FieldErrors::single("username", USERNAME_TAKEN).into());
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = created.id, username = %created.username, role = %created.role, "User registered");
        Ok(created)
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError(
                "Please enter a correct username and password. Note that both fields may be case-sensitive."
                    .to_string(),
            )
        };

        let user = self
            .find_login_account(input.username.trim())
            .await?
            .ok_or_else(invalid)?;

        let valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(invalid());
        }

        let session = self.create_session(user.id).await?;
        tracing::debug!(user_id = user.id, "Session opened");
        Ok((session, user))
    }

    /// Delete the session; an unknown token is not an error
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a live session token.
    ///
    /// Expired sessions are deleted on sight and yield `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Change the owner-editable profile fields
    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let input = UpdateProfileInput {
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email: input.email.trim().to_string(),
        };

        let mut errors = FieldErrors::new();
        errors.max_chars("first_name", &input.first_name, NAME_MAX_LENGTH);
        errors.max_chars("last_name", &input.last_name, NAME_MAX_LENGTH);
        if !input.email.is_empty() {
            errors.max_chars("email", &input.email, EMAIL_MAX_LENGTH);
            if !is_valid_email(&input.email) {
                errors.add("email", "Enter a valid email address.");
            } else if let Some(other) = self
                .user_repo
                .get_by_email(&input.email)
                .await
                .context("Failed to check email")?
            {
                if other.id != user_id {
                    errors.add("email", "A user with that email already exists.");
                }
            }
        }
        errors.into_result()?;

        if self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .is_none()
        {
            return Err(UserServiceError::NotFound(user_id.to_string()));
        }

        let user = self
            .user_repo
            .update_profile(user_id, &input)
            .await
            .context("Failed to update profile")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?)
    }

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await.context("Failed to count users")?)
    }

    /// Delete all expired sessions, returning how many went
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    /// The account a login form names, by username or else by email
    pub async fn find_login_account(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        if !username_or_email.contains('@') {
            return Ok(None);
        }

        Ok(self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}
