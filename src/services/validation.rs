//! Form field validation shared by the services
//!
//! Services collect every problem with an input into [`FieldErrors`] so a
//! form can be re-rendered with all messages next to their fields.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Key for errors that belong to the form as a whole
pub const NON_FIELD: &str = "__all__";

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid regex"));
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Validation messages keyed by form field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single error for one field
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Require a non-blank value
    pub fn require(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.add(field, "This field is required.");
            false
        } else {
            true
        }
    }

    /// Limit a value to `max` characters
    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        let count = value.chars().count();
        if count > max {
            self.add(
                field,
                format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    max, count
                ),
            );
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Letters, digits, hyphens and underscores only
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_RE.is_match(slug)
}

/// Letters, digits and `@ . + - _` only
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_messages_per_field() {
        let mut errors = FieldErrors::new();
        assert!(!errors.require("title", "  "));
        errors.max_chars("title", "abcdef", 3);
        errors.add("text", "bad");

        assert_eq!(errors.get("title").unwrap().len(), 2);
        assert!(errors.has("text"));
        assert!(!errors.has("slug"));
        assert!(errors.clone().into_result().is_err());
        assert!(errors.to_string().contains("text: bad"));
    }

    #[test]
    fn test_empty_is_ok() {
        let mut errors = FieldErrors::new();
        assert!(errors.require("title", "Hello"));
        errors.max_chars("title", "Hello", 256);
        assert!(errors.into_result().is_ok());
    }

    #[test]
    fn test_max_chars_counts_characters_not_bytes() {
        let mut errors = FieldErrors::new();
        errors.max_chars("title", "привет", 6);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_slug_rules() {
        assert!(is_valid_slug("travel_2024-summer"));
        assert!(!is_valid_slug("with space"));
        assert!(!is_valid_slug("slash/no"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_username_rules() {
        assert!(is_valid_username("john.doe+blog@home-1"));
        assert!(!is_valid_username("john doe"));
        assert!(!is_valid_username("semi;colon"));
    }

    #[test]
    fn test_email_rules() {
        assert!(is_valid_email("a@example.com"));
        assert!(!is_valid_email("a@example"));
        assert!(!is_valid_email("no-at.example.com"));
    }

    #[test]
    fn test_serializes_as_map() {
        let errors = FieldErrors::single("slug", "taken");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["slug"][0], "taken");
    }
}
