//! # Query Compiler
//!
//! Turns the user-facing search language into a safe FTS5 expression plus a
//! list of structured column predicates.
//!
//! ```text
//! raw string ──► lexer ──► validator ──► translator ──► ParsedQuery
//!                  │           │              │
//!                  └───────────┴──────────────┴──► QueryError
//! ```
//!
//! All three stages are pure functions over owned data; there is no I/O and
//! no shared state, so [`parse_query`] can be called from anywhere.
//!
//! ## Language
//!
//! | Form | Meaning |
//! |------|---------|
//! | `word`, `"a phrase"` | full-text term |
//! | `-word`, `-"a phrase"` | exclude term |
//! | `a OR b`, `( ... )` | alternatives, grouping (`AND` is implicit) |
//! | `from:` / `to:` | exact address if the value has `@`, else name text |
//! | `subject:`, `attachment:` | column-scoped full-text term |
//! | `label:` | substring of the labels column |
//! | `before:` / `after:` | `YYYY-MM-DD` or `YYYYMMDD` date bound |
//! | `has:attachment` | attachments present |
//!
//! Any filter can be negated with a leading `-`.

pub mod lexer;
pub mod predicate;
pub mod translator;
pub mod validator;

use crate::error::QueryError;

pub use predicate::{DateOp, Predicate};
pub use translator::escape_term;

/// Output of a successful parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Expression for `documents_fts MATCH ?`. Empty when the query holds
    /// only structured filters.
    pub fts_expression: String,
    /// Conditions AND-ed onto the `documents` table, in query order.
    pub predicates: Vec<Predicate>,
}

impl ParsedQuery {
    pub fn has_fts(&self) -> bool {
        !self.fts_expression.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.fts_expression.is_empty() && self.predicates.is_empty()
    }
}

/// Lex, validate and translate `raw`.
///
/// A blank query parses to an empty [`ParsedQuery`], which the search layer
/// treats as "everything in scope".
pub fn parse_query(raw: &str) -> Result<ParsedQuery, QueryError> {
    if raw.trim().is_empty() {
        return Ok(ParsedQuery::default());
    }

    let tokens = lexer::tokenize(raw)?;
    validator::validate(&tokens)?;
    let parsed = translator::translate(&tokens)?;

    tracing::debug!(
        query = raw,
        fts = %parsed.fts_expression,
        predicates = parsed.predicates.len(),
        "parsed query"
    );
    Ok(parsed)
}
