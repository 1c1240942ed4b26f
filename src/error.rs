//! Error types for cursor, parse, and path operations
//!
//! Three independent families:
//! - `CursorError` covers everything the cursor/document API can reject
//! - `ParseError` is raised only by `Document::parse` and friends
//! - `PathError` is produced by the path engine and surfaces through
//!   `CursorError::Path` at the first call that needs selection results

use thiserror::Error;

/// Result type for cursor and document operations
pub type CursorResult<T> = Result<T, CursorError>;

/// Failure classes for cursor/document operations.
///
/// Every failure is synchronous and leaves the document unchanged; a
/// rejected mutation is never partially applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CursorError {
    /// Invalid parameter: cross-document cursor argument, malformed name,
    /// out-of-range selection index.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Operation not valid for the cursor's current token kind or position.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// The cursor was disposed; only `dispose` itself remains callable.
    #[error("cursor has been disposed")]
    Disposed,

    /// Structural edit rejected: cycle, wrong child kind for the parent, or
    /// a second document element outside fragment mode.
    #[error("hierarchy violation: {0}")]
    Hierarchy(&'static str),

    /// A value handle whose backing token was removed from the tree.
    #[error("value is disconnected from its document")]
    Disconnected,

    /// Deferred path failure: the expression given to `select_path` did not
    /// parse or evaluate, reported at the first call needing results.
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

impl CursorError {
    /// Shorthand for the cross-document argument rejection.
    pub(crate) fn cross_document() -> Self {
        CursorError::IllegalArgument("cursor belongs to a different document".to_string())
    }
}

/// Parse error with byte position into the input.
///
/// Deliberately not convertible to `CursorError`: malformed input is a
/// collaborator-boundary failure, not a cursor-contract failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error at byte {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

/// Path expression errors, surfaced lazily through `CursorError::Path`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("undeclared namespace prefix: {0}")]
    UnboundPrefix(String),
}

impl PathError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        PathError::Syntax {
            message: message.into(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_error_display() {
        let err = CursorError::IllegalState("cannot insert chars at an attribute");
        assert_eq!(
            err.to_string(),
            "illegal state: cannot insert chars at an attribute"
        );
        assert_eq!(CursorError::Disposed.to_string(), "cursor has been disposed");
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("unexpected end of input", 17);
        assert_eq!(err.to_string(), "parse error at byte 17: unexpected end of input");
    }

    #[test]
    fn test_path_error_converts_to_cursor_error() {
        let path_err = PathError::syntax("expected name test", 3);
        let cursor_err: CursorError = path_err.clone().into();
        assert_eq!(cursor_err, CursorError::Path(path_err));
    }
}
