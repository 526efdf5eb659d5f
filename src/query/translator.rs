//! Token → (full-text expression, structured predicates).
//!
//! The full-text expression is handed verbatim to FTS5 `MATCH`, so every term
//! that reaches it goes through [`escape_term`]. Structured filters become
//! [`Predicate`]s and never touch the full-text grammar.

use super::lexer::{Field, Token};
use super::predicate::{DateOp, Predicate};
use super::ParsedQuery;
use crate::error::QueryError;

/// FTS5 column names.
const SENDER_COLUMN: &str = "sender";
const RECIPIENTS_COLUMN: &str = "recipients";
const SUBJECT_COLUMN: &str = "subject";
const ATTACHMENTS_COLUMN: &str = "attachments";

/// Barewords FTS5 treats as operators.
const FTS_KEYWORDS: [&str; 4] = ["AND", "OR", "NOT", "NEAR"];

const OR_NEEDS_TERMS: &str = "OR needs a search term on both sides";
const OR_WITH_FILTER: &str =
    "OR can only join search terms; filters like label: or before: apply to every result";
const EXCLUSION_NEEDS_TERM: &str =
    "Excluded terms need a search term to exclude from, e.g. 'invoice -draft'";

/// One parenthesized level of the full-text expression.
#[derive(Default)]
struct Group {
    parts: Vec<String>,
    /// Exclusions seen before any term; FTS5 `NOT` needs a left operand.
    held_exclusions: Vec<String>,
    has_term: bool,
    pending_or: bool,
}

impl Group {
    fn push_term(&mut self, term: String) {
        if self.pending_or {
            self.parts.push("OR".to_string());
            self.pending_or = false;
        }
        self.parts.push(term);
        self.has_term = true;
        for excluded in self.held_exclusions.drain(..) {
            self.parts.push(format!("NOT {}", excluded));
        }
    }

    fn push_exclusion(&mut self, term: String) {
        if self.has_term && !self.pending_or {
            self.parts.push(format!("NOT {}", term));
        } else {
            self.held_exclusions.push(term);
        }
    }

    fn push_or(&mut self) -> Result<(), QueryError> {
        if !self.has_term {
            return Err(QueryError::syntax(OR_NEEDS_TERMS));
        }
        self.pending_or = true;
        Ok(())
    }

    /// Finish the group. `None` means it contributed no full-text terms.
    fn close(self) -> Result<Option<String>, QueryError> {
        if self.pending_or {
            return Err(QueryError::syntax(OR_NEEDS_TERMS));
        }
        if !self.held_exclusions.is_empty() {
            return Err(QueryError::syntax(EXCLUSION_NEEDS_TERM));
        }
        if !self.has_term {
            return Ok(None);
        }
        Ok(Some(join_parts(&self.parts)))
    }
}

/// Join group parts. FTS5 only infers AND between adjacent phrases: a
/// parenthesized operand needs an explicit one, and so does a term after
/// `NOT x`, which would otherwise be pulled into the excluded side.
fn join_parts(parts: &[String]) -> String {
    let mut out = String::new();
    let mut prev: Option<&str> = None;
    for part in parts {
        if let Some(before) = prev {
            let conjunctive = part != "OR" && before != "OR" && !part.starts_with("NOT ");
            let explicit = part.starts_with('(')
                || before.starts_with('(')
                || before.starts_with("NOT ");
            if conjunctive && explicit {
                out.push_str(" AND ");
            } else {
                out.push(' ');
            }
        }
        out.push_str(part);
        prev = Some(part);
    }
    out
}

/// Where a filter token ends up.
enum Routed {
    Term(String),
    Exclusion(String),
    Predicate(Predicate),
    Nothing,
}

/// Translate a validated token list.
pub fn translate(tokens: &[Token]) -> Result<ParsedQuery, QueryError> {
    let mut root = Group::default();
    let mut nested: Vec<Group> = Vec::new();
    let mut predicates = Vec::new();
    let mut last_was_predicate = false;

    for token in tokens {
        let mut is_predicate = false;

        match token {
            Token::LParen => nested.push(Group::default()),
            Token::RParen => {
                let Some(inner) = nested.pop() else {
                    return Err(QueryError::syntax("Unmatched closing parenthesis"));
                };
                if let Some(expr) = inner.close()? {
                    current(&mut root, &mut nested).push_term(format!("({})", expr));
                }
            }
            Token::Word(value) => {
                if let Some(term) = escape_term(value) {
                    current(&mut root, &mut nested).push_term(term);
                }
            }
            Token::Phrase(value) => {
                if let Some(term) = quote_phrase(value) {
                    current(&mut root, &mut nested).push_term(term);
                }
            }
            Token::Negation(value) => {
                if let Some(term) = escape_term(value) {
                    current(&mut root, &mut nested).push_exclusion(term);
                }
            }
            Token::Or => {
                if last_was_predicate {
                    return Err(QueryError::syntax(OR_WITH_FILTER));
                }
                current(&mut root, &mut nested).push_or()?;
            }
            Token::Filter {
                field,
                value,
                negated,
            } => {
                let group = current(&mut root, &mut nested);
                match route_filter(*field, value, *negated)? {
                    Routed::Term(term) => group.push_term(term),
                    Routed::Exclusion(term) => group.push_exclusion(term),
                    Routed::Predicate(predicate) => {
                        if group.pending_or {
                            return Err(QueryError::syntax(OR_WITH_FILTER));
                        }
                        predicates.push(predicate);
                        is_predicate = true;
                    }
                    Routed::Nothing => {}
                }
            }
        }

        last_was_predicate = is_predicate;
    }

    if !nested.is_empty() {
        return Err(QueryError::syntax("Unclosed parenthesis"));
    }

    Ok(ParsedQuery {
        fts_expression: root.close()?.unwrap_or_default(),
        predicates,
    })
}

fn current<'a>(root: &'a mut Group, nested: &'a mut [Group]) -> &'a mut Group {
    match nested.last_mut() {
        Some(group) => group,
        None => root,
    }
}

fn route_filter(field: Field, value: &str, negated: bool) -> Result<Routed, QueryError> {
    let column_term = |column: &str| match escape_term(value) {
        Some(term) => {
            let scoped = format!("{}:{}", column, term);
            if negated {
                Routed::Exclusion(scoped)
            } else {
                Routed::Term(scoped)
            }
        }
        None => Routed::Nothing,
    };

    let routed = match field {
        Field::From if value.contains('@') => Routed::Predicate(Predicate::SenderEmail {
            email: value.to_lowercase(),
            negated,
        }),
        Field::From => column_term(SENDER_COLUMN),
        Field::To if value.contains('@') => Routed::Predicate(Predicate::RecipientEmail {
            email: value.to_lowercase(),
            negated,
        }),
        Field::To => column_term(RECIPIENTS_COLUMN),
        Field::Subject => column_term(SUBJECT_COLUMN),
        Field::Attachment => column_term(ATTACHMENTS_COLUMN),
        Field::Label => Routed::Predicate(Predicate::Label {
            text: value.to_string(),
            negated,
        }),
        Field::Before | Field::After => {
            let date = normalize_date(value).ok_or_else(|| {
                QueryError::filter(format!(
                    "Invalid date format for '{}:': {}",
                    field.as_str(),
                    value
                ))
            })?;
            let op = if field == Field::Before {
                DateOp::Before
            } else {
                DateOp::OnOrAfter
            };
            let op = if negated { op.flipped() } else { op };
            Routed::Predicate(Predicate::EventDate { op, date })
        }
        Field::Has => {
            let wanted = value.to_ascii_lowercase();
            if wanted != "attachment" && wanted != "attachments" {
                return Err(QueryError::filter(format!(
                    "Unsupported value for 'has:': {} (try has:attachment)",
                    value
                )));
            }
            Routed::Predicate(Predicate::HasAttachments(!negated))
        }
    };

    Ok(routed)
}

fn is_bareword_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || (!c.is_ascii() && !c.is_whitespace())
}

fn needs_quoting(value: &str) -> bool {
    !value.chars().all(is_bareword_char) || FTS_KEYWORDS.contains(&value)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Make a user term safe for FTS5.
///
/// Anything outside the FTS5 bareword alphabet is wrapped in quotes with
/// inner quotes doubled. A single trailing `*` stays outside the quotes so
/// prefix search keeps working. Returns `None` when the term has nothing the
/// tokenizer could index.
pub fn escape_term(value: &str) -> Option<String> {
    let (body, prefix) = match value.strip_suffix('*') {
        Some(body) => (body, true),
        None => (value, false),
    };

    if !body.chars().any(char::is_alphanumeric) {
        return None;
    }

    let escaped = if needs_quoting(body) {
        quote(body)
    } else {
        body.to_string()
    };

    Some(if prefix {
        format!("{}*", escaped)
    } else {
        escaped
    })
}

/// Quote a phrase for FTS5. Empty phrases match nothing and are dropped.
pub fn quote_phrase(value: &str) -> Option<String> {
    if !value.chars().any(char::is_alphanumeric) {
        return None;
    }
    Some(quote(value))
}

/// Accepts `YYYY-MM-DD` or `YYYYMMDD` (each hyphen optional), month in
/// 1..=12 and day in 1..=31. No further calendar check. Returns `YYYY-MM-DD`.
pub fn normalize_date(value: &str) -> Option<String> {
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    let year = value.get(..4)?;
    let rest = value.get(4..)?;
    let rest = rest.strip_prefix('-').unwrap_or(rest);
    let month = rest.get(..2)?;
    let rest = rest.get(2..)?;
    let day = rest.strip_prefix('-').unwrap_or(rest);

    if !all_digits(year) || !all_digits(month) || day.len() != 2 || !all_digits(day) {
        return None;
    }

    let m: u32 = month.parse().ok()?;
    let d: u32 = day.parse().ok()?;
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }

    Some(format!("{}-{}-{}", year, month, day))
}
