//! Extraction error taxonomy.

use thiserror::Error;

/// Result type alias using [`ExtractError`].
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors produced while extracting values, labels or objects from a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The path compiled and ran, but selected nothing.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Malformed path syntax, malformed JSON, or an unparseable number.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The selected value has a type the requested extraction cannot use.
    #[error("Type error: {0}")]
    Type(String),
}

impl ExtractError {
    /// Create a path-not-found error for `path`.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a type error.
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Whether this is the benign "nothing matched" case.
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound(_))
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("invalid JSON: {}", err))
    }
}
