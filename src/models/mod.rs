//! Data models
//!
//! Plain data structures shared by repositories, services and handlers:
//! database entities (User, Session, Category, Location, Post, Comment),
//! joined read models and the inputs services accept.

mod category;
mod comment;
mod post;
mod session;
mod user;

pub use category::{Category, CategoryInput, Location, LocationInput};
pub use comment::{Comment, CommentWithAuthor};
pub use post::{
    page_exists, CategoryRef, ListParams, ListingChange, LocationRef, PagedResult, Post, PostInput, PostWithMeta,
};
pub use session::Session;
pub use user::{CreateUserInput, UpdateProfileInput, User, UserRole};
