//! Theme engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    /// Template parsing or rendering failed
    #[error("Template error: {0}")]
    TemplateError(String),
}
