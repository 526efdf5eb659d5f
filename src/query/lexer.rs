//! Query lexer.
//!
//! Splits a raw query into [`Token`]s by hand-scanning characters. Filter
//! field aliases are canonicalized here so later stages only ever see the
//! canonical [`Field`]. Unknown `name:value` segments stay plain words.

use crate::error::QueryError;

/// Filter fields understood by the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    From,
    To,
    Subject,
    Label,
    Before,
    After,
    Has,
    Attachment,
}

impl Field {
    /// Resolve a (lower-cased) field name, including aliases.
    pub fn from_name(name: &str) -> Option<Field> {
        match name {
            "from" | "sender" => Some(Field::From),
            "to" | "recipients" => Some(Field::To),
            "subject" => Some(Field::Subject),
            "label" | "tag" => Some(Field::Label),
            "before" => Some(Field::Before),
            "after" => Some(Field::After),
            "has" => Some(Field::Has),
            "attachment" | "attachments" => Some(Field::Attachment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::From => "from",
            Field::To => "to",
            Field::Subject => "subject",
            Field::Label => "label",
            Field::Before => "before",
            Field::After => "after",
            Field::Has => "has",
            Field::Attachment => "attachment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Phrase(String),
    Filter {
        field: Field,
        value: String,
        negated: bool,
    },
    /// `-term` or `-"some phrase"`.
    Negation(String),
    Or,
    LParen,
    RParen,
}

const EXCLUDED_GROUP: &str = "Cannot exclude a group; exclude terms individually";

/// How many characters of an unterminated quote to echo back.
const UNCLOSED_PREVIEW: usize = 20;

/// Tokenize a raw query string.
pub fn tokenize(query: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = query.trim().chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '"' => {
                let (phrase, next) = read_quoted(&chars, i + 1)?;
                tokens.push(Token::Phrase(phrase));
                i = next;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '-' if chars.get(i + 1).is_some_and(|n| !n.is_whitespace()) => {
                if chars[i + 1] == '(' {
                    return Err(QueryError::syntax(EXCLUDED_GROUP));
                }
                if chars[i + 1] == '"' {
                    let (phrase, next) = read_quoted(&chars, i + 2)?;
                    tokens.push(Token::Negation(phrase));
                    i = next;
                    continue;
                }

                let end = scan_until(&chars, i + 1, |ch| {
                    ch.is_whitespace() || ch == '(' || ch == ')'
                });
                let word: String = chars[i + 1..end].iter().collect();
                if !word.is_empty() {
                    match split_filter(&word, true)? {
                        Some(filter) => tokens.push(filter),
                        None => tokens.push(Token::Negation(word)),
                    }
                }
                i = end;
            }
            _ => {
                let end = scan_until(&chars, i, |ch| {
                    ch.is_whitespace() || matches!(ch, '(' | ')' | '"')
                });
                let segment: String = chars[i..end].iter().collect();
                i = end;

                if segment.eq_ignore_ascii_case("OR") {
                    tokens.push(Token::Or);
                } else if segment.eq_ignore_ascii_case("AND") {
                    // conjunction is implicit
                } else if let Some(filter) = split_filter(&segment, false)? {
                    tokens.push(filter);
                } else {
                    tokens.push(Token::Word(segment));
                }
            }
        }
    }

    Ok(tokens)
}

fn scan_until(chars: &[char], start: usize, stop: impl Fn(char) -> bool) -> usize {
    let mut j = start;
    while j < chars.len() && !stop(chars[j]) {
        j += 1;
    }
    j
}

/// Read a quoted span whose content starts at `start`. Returns the content
/// and the index just past the closing quote.
fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize), QueryError> {
    let start = start.min(chars.len());
    match chars[start..].iter().position(|&ch| ch == '"') {
        Some(offset) => {
            let end = start + offset;
            Ok((chars[start..end].iter().collect(), end + 1))
        }
        None => {
            let preview_end = (start + UNCLOSED_PREVIEW).min(chars.len());
            let mut partial: String = chars[start..preview_end].iter().collect();
            if chars.len() > start + UNCLOSED_PREVIEW {
                partial.push_str("...");
            }
            Err(QueryError::syntax(format!(
                "Unclosed quote after '{}'",
                partial
            )))
        }
    }
}

/// Interpret `segment` as `field:value` if the field is known.
fn split_filter(segment: &str, negated: bool) -> Result<Option<Token>, QueryError> {
    let colon = match segment.find(':') {
        Some(pos) if pos > 0 => pos,
        _ => return Ok(None),
    };

    let name = segment[..colon].to_lowercase();
    let value = &segment[colon + 1..];

    let Some(field) = Field::from_name(&name) else {
        return Ok(None);
    };

    if value.is_empty() {
        let prefix = if negated { "-" } else { "" };
        return Err(QueryError::syntax(format!(
            "Empty value for '{}{}:' filter",
            prefix, name
        )));
    }

    Ok(Some(Token::Filter {
        field,
        value: value.to_string(),
        negated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    fn filter(field: Field, value: &str, negated: bool) -> Token {
        Token::Filter {
            field,
            value: value.to_string(),
            negated,
        }
    }

    #[test]
    fn plain_words_and_phrases() {
        let tokens = tokenize(r#"invoice "quarterly report" 2024"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                word("invoice"),
                Token::Phrase("quarterly report".into()),
                word("2024")
            ]
        );
    }

    #[test]
    fn and_is_dropped_or_is_kept() {
        let tokens = tokenize("a AND b or c").unwrap();
        assert_eq!(tokens, vec![word("a"), word("b"), Token::Or, word("c")]);
    }

    #[test]
    fn field_aliases_are_canonicalized() {
        let tokens =
            tokenize("sender:alice recipients:bob tag:work attachments:pdf").unwrap();
        assert_eq!(
            tokens,
            vec![
                filter(Field::From, "alice", false),
                filter(Field::To, "bob", false),
                filter(Field::Label, "work", false),
                filter(Field::Attachment, "pdf", false),
            ]
        );
    }

    #[test]
    fn field_names_are_case_insensitive() {
        let tokens = tokenize("FROM:alice@example.com").unwrap();
        assert_eq!(tokens, vec![filter(Field::From, "alice@example.com", false)]);
    }

    #[test]
    fn unknown_field_is_a_plain_word() {
        let tokens = tokenize("http://example.com foo:bar").unwrap();
        assert_eq!(tokens, vec![word("http://example.com"), word("foo:bar")]);
    }

    #[test]
    fn leading_colon_is_not_a_filter() {
        let tokens = tokenize(":from").unwrap();
        assert_eq!(tokens, vec![word(":from")]);
    }

    #[test]
    fn negations() {
        let tokens = tokenize(r#"-draft -"out of office" -label:spam"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Negation("draft".into()),
                Token::Negation("out of office".into()),
                filter(Field::Label, "spam", true),
            ]
        );
    }

    #[test]
    fn dash_before_space_is_a_word() {
        let tokens = tokenize("a - b").unwrap();
        assert_eq!(tokens, vec![word("a"), word("-"), word("b")]);
    }

    #[test]
    fn parentheses_are_delimiters() {
        let tokens = tokenize("(a OR b)c").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                word("a"),
                Token::Or,
                word("b"),
                Token::RParen,
                word("c")
            ]
        );
    }

    #[test]
    fn negated_word_stops_at_paren() {
        let tokens = tokenize("(a -b)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                word("a"),
                Token::Negation("b".into()),
                Token::RParen
            ]
        );
    }

    #[test]
    fn excluding_a_group_is_rejected() {
        let err = tokenize("invoice -(draft memo)").unwrap_err();
        assert_eq!(err, QueryError::syntax(EXCLUDED_GROUP));
    }

    #[test]
    fn unclosed_quote_reports_preview() {
        let err = tokenize(r#"hello "world"#).unwrap_err();
        assert_eq!(err, QueryError::syntax("Unclosed quote after 'world'"));

        let err = tokenize(r#""abcdefghijklmnopqrstuvwxyz"#).unwrap_err();
        assert_eq!(
            err,
            QueryError::syntax("Unclosed quote after 'abcdefghijklmnopqrst...'")
        );
    }

    #[test]
    fn unclosed_negated_quote() {
        let err = tokenize(r#"-"draft"#).unwrap_err();
        assert_eq!(err, QueryError::syntax("Unclosed quote after 'draft'"));
    }

    #[test]
    fn empty_filter_value_is_an_error() {
        let err = tokenize("from:").unwrap_err();
        assert_eq!(err, QueryError::syntax("Empty value for 'from:' filter"));

        let err = tokenize("invoice -label:").unwrap_err();
        assert_eq!(err, QueryError::syntax("Empty value for '-label:' filter"));
    }

    #[test]
    fn unicode_is_preserved() {
        let tokens = tokenize("café \"naïve résumé\"").unwrap();
        assert_eq!(
            tokens,
            vec![word("café"), Token::Phrase("naïve résumé".into())]
        );
    }

    #[test]
    fn empty_query_has_no_tokens() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
