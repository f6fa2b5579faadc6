//! # Parse Errors
//!
//! Errors raised while turning caller-supplied text into common types.

use thiserror::Error;

/// Result alias for parsing helpers in this crate.
pub type ParseResult<T> = Result<T, ParseError>;

/// Failure to parse an endpoint, URL or encoding name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Host/port pair could not be parsed.
    #[error("invalid endpoint `{0}`")]
    Endpoint(String),
    /// Connection URL is malformed or uses an unsupported scheme.
    #[error("invalid connection url `{0}`")]
    Url(String),
    /// Encoding name is not one of the supported directives.
    #[error("unknown encoding `{0}`")]
    Encoding(String),
}
