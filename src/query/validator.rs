//! Structural checks on a token sequence, run once before translation.

use super::lexer::Token;
use crate::error::QueryError;

pub fn validate(tokens: &[Token]) -> Result<(), QueryError> {
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return Ok(());
    };

    if *first == Token::Or {
        return Err(QueryError::syntax("Search cannot start with OR"));
    }
    if *last == Token::Or {
        return Err(QueryError::syntax("Search cannot end with OR"));
    }

    if tokens
        .windows(2)
        .any(|pair| pair[0] == Token::Or && pair[1] == Token::Or)
    {
        return Err(QueryError::syntax("Invalid: consecutive OR operators"));
    }

    let mut depth: i32 = 0;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(QueryError::syntax("Unmatched closing parenthesis"));
                }
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err(QueryError::syntax("Unclosed parenthesis"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::lexer::tokenize;

    fn check(q: &str) -> Result<(), QueryError> {
        validate(&tokenize(q).unwrap())
    }

    #[test]
    fn accepts_well_formed() {
        assert!(check("").is_ok());
        assert!(check("invoice").is_ok());
        assert!(check("invoice OR receipt").is_ok());
        assert!(check("(a OR b) (c OR (d e))").is_ok());
    }

    #[test]
    fn rejects_leading_or() {
        assert_eq!(
            check("OR invoice").unwrap_err(),
            QueryError::syntax("Search cannot start with OR")
        );
    }

    #[test]
    fn rejects_trailing_or() {
        assert_eq!(
            check("invoice OR").unwrap_err(),
            QueryError::syntax("Search cannot end with OR")
        );
    }

    #[test]
    fn rejects_consecutive_or() {
        assert_eq!(
            check("a OR or b").unwrap_err(),
            QueryError::syntax("Invalid: consecutive OR operators")
        );
    }

    #[test]
    fn rejects_unbalanced_parentheses() {
        assert_eq!(
            check("a) (b").unwrap_err(),
            QueryError::syntax("Unmatched closing parenthesis")
        );
        assert_eq!(
            check("((a) b").unwrap_err(),
            QueryError::syntax("Unclosed parenthesis")
        );
    }
}
