//! Services layer - Business logic
//!
//! Services own validation and the error taxonomy of each entity. They sit
//! between the web handlers and the repositories; the visibility rules they
//! enforce live in [`visibility`].

pub mod category;
pub mod comment;
pub mod location;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod user;
pub mod validation;
pub mod visibility;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use location::{LocationService, LocationServiceError};
pub use password::{hash_password, verify_password};
pub use post::{AdminPostQuery, PostDraft, PostService, PostServiceError};
pub use rate_limiter::{LoginKey, LoginRateLimiter};
pub use user::{LoginInput, UserService, UserServiceError};
pub use validation::FieldErrors;
