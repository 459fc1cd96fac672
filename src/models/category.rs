//! Category and Location models
//!
//! Both are staff-managed, hidden from readers through `is_published`
//! rather than deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Thematic category a post is filed under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// URL identifier: letters, digits, `-` and `_`
    pub slug: String,
    /// Unpublished categories hide all of their posts from public feeds
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating or replacing a category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryInput {
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
}

/// Geographic location a post may be tagged with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating or replacing a location
#[derive(Debug, Clone, Serialize)]
pub struct LocationInput {
    pub name: String,
    pub is_published: bool,
}
