//! Glob patterns for key invalidation
//!
//! Supported syntax: `*` matches any run of characters (including none),
//! `?` matches exactly one character, `\` escapes the next character.
//! Character classes (`[...]`) are rejected so that the local scan and the
//! remote enumeration API interpret a pattern identically.

use super::error::{CacheError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
}

/// A validated, case-sensitive glob pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    source: String,
    tokens: Vec<Token>,
}

impl KeyPattern {
    /// Parse and validate a glob pattern
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(CacheError::invalid_pattern(pattern, "pattern is empty"));
        }

        let mut tokens = Vec::with_capacity(pattern.len());
        let mut chars = pattern.chars();

        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    // Collapse runs of '*'
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                }
                '?' => tokens.push(Token::AnyOne),
                '\\' => match chars.next() {
                    Some(escaped) => tokens.push(Token::Literal(escaped)),
                    None => {
                        return Err(CacheError::invalid_pattern(
                            pattern,
                            "trailing escape character",
                        ));
                    }
                },
                '[' | ']' => {
                    return Err(CacheError::invalid_pattern(
                        pattern,
                        "character classes are not supported",
                    ));
                }
                other => tokens.push(Token::Literal(other)),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    /// The pattern as supplied, valid for Redis `KEYS`/`SCAN MATCH`
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Literal characters before the first wildcard
    pub fn literal_prefix(&self) -> String {
        self.tokens
            .iter()
            .map_while(|token| match token {
                Token::Literal(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    /// Check whether `key` matches this pattern
    pub fn matches(&self, key: &str) -> bool {
        let text: Vec<char> = key.chars().collect();
        let mut t = 0;
        let mut p = 0;
        // Position after the most recent '*', and the text index it is currently absorbing up to
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::AnyRun) => {
                    backtrack = Some((p + 1, t));
                    p += 1;
                }
                Some(Token::AnyOne) => {
                    p += 1;
                    t += 1;
                }
                Some(Token::Literal(c)) if *c == text[t] => {
                    p += 1;
                    t += 1;
                }
                _ => match backtrack {
                    Some((star_p, star_t)) => {
                        p = star_p;
                        t = star_t + 1;
                        backtrack = Some((star_p, star_t + 1));
                    }
                    None => return false,
                },
            }
        }

        self.tokens[p..].iter().all(|token| *token == Token::AnyRun)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> KeyPattern {
        KeyPattern::parse(p).unwrap()
    }

    #[test]
    fn test_star_matches_any_run() {
        let p = pattern("user_*");
        assert!(p.matches("user_"));
        assert!(p.matches("user_42"));
        assert!(p.matches("user_42_profile"));
        assert!(!p.matches("user"));
        assert!(!p.matches("admin_user_1"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let p = pattern("session:??");
        assert!(p.matches("session:ab"));
        assert!(!p.matches("session:a"));
        assert!(!p.matches("session:abc"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let p = pattern("User*");
        assert!(p.matches("User1"));
        assert!(!p.matches("user1"));
    }

    #[test]
    fn test_star_in_the_middle_backtracks() {
        let p = pattern("a*b*c");
        assert!(p.matches("abc"));
        assert!(p.matches("axxbyyc"));
        assert!(p.matches("abbbc"));
        assert!(!p.matches("axxbyy"));
        assert!(!p.matches("acb"));
    }

    #[test]
    fn test_escaped_wildcards_are_literal() {
        let p = pattern(r"price\*");
        assert!(p.matches("price*"));
        assert!(!p.matches("price10"));
    }

    #[test]
    fn test_lone_star_matches_everything() {
        let p = pattern("*");
        assert!(p.matches(""));
        assert!(p.matches("anything:at:all"));
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(pattern("user_*").literal_prefix(), "user_");
        assert_eq!(pattern(r"a\*b?c").literal_prefix(), "a*b");
        assert_eq!(pattern("*tail").literal_prefix(), "");
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        assert!(matches!(
            KeyPattern::parse(""),
            Err(CacheError::InvalidPattern { .. })
        ));
        assert!(matches!(
            KeyPattern::parse("user_[0-9]"),
            Err(CacheError::InvalidPattern { .. })
        ));
        assert!(matches!(
            KeyPattern::parse("trailing\\"),
            Err(CacheError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_multibyte_keys() {
        let p = pattern("café_?");
        assert!(p.matches("café_1"));
        assert!(p.matches("café_é"));
        assert!(!p.matches("cafe_1"));
    }
}
