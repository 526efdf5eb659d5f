//! Error types that callers need to branch on.
//!
//! Most of the crate returns [`anyhow::Result`]. The search path is the
//! exception: a rejected query is a normal, user-correctable outcome and must
//! never be confused with a storage failure, so it gets a typed error.

use thiserror::Error;

/// A query the user can fix. The `Display` form is the message shown in a UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Structural problem: unterminated quote, empty filter value, misplaced
    /// `OR`, unbalanced parentheses.
    #[error("{0}")]
    Syntax(String),

    /// A filter value that cannot be interpreted, e.g. `before:2024-13-01`.
    #[error("{0}")]
    Filter(String),
}

impl QueryError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        QueryError::Syntax(msg.into())
    }

    pub fn filter(msg: impl Into<String>) -> Self {
        QueryError::Filter(msg.into())
    }

    pub fn message(&self) -> &str {
        match self {
            QueryError::Syntax(m) | QueryError::Filter(m) => m,
        }
    }
}

/// Failure of a search call.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query was rejected before touching the index.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The store could not be read.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl SearchError {
    pub fn is_query_error(&self) -> bool {
        matches!(self, SearchError::Query(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_displays_message_verbatim() {
        let err = QueryError::syntax("Search cannot start with OR");
        assert_eq!(err.to_string(), "Search cannot start with OR");
        assert_eq!(err.message(), "Search cannot start with OR");
    }

    #[test]
    fn search_error_keeps_query_message() {
        let err: SearchError = QueryError::filter("Invalid date format for 'before:': x").into();
        assert!(err.is_query_error());
        assert_eq!(err.to_string(), "Invalid date format for 'before:': x");
    }
}
