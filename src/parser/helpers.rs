use std::collections::HashMap;

use super::error::{ErrorKind, ParseError};
use super::Parser;
use crate::ast::{Autoescape, Expr};
use crate::lexer::{Token, TokenKind, lex_expr};

/// An attribute value with the position of its quoted string
#[derive(Debug, Clone)]
pub(super) struct Attribute {
    pub value: String,
    pub pos: usize,
}

pub(super) type Attributes = HashMap<String, Attribute>;

// Parser helper methods
impl<'a> Parser<'a> {
    /// Helper: Consume and return the next token
    ///
    /// Past the end this keeps returning the terminal token.
    pub(super) fn next(&mut self) -> Token {
        let token = self.tokens.get(self.current).clone();
        self.current = (self.current + 1).min(self.tokens.len());
        token
    }

    /// Helper: Back up one token
    pub(super) fn backup(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Helper: Back up the two most recently read tokens
    pub(super) fn backup2(&mut self) {
        self.current = self.current.saturating_sub(2);
    }

    /// Helper: peek current token
    pub(super) fn peek(&self) -> &Token {
        self.tokens.get(self.current)
    }

    pub(super) fn next_non_comment(&mut self) -> Token {
        loop {
            let token = self.next();
            if token.kind != TokenKind::Comment {
                return token;
            }
        }
    }

    /// Helper: Consume a specific token kind or error
    pub(super) fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, ParseError> {
        let token = self.next();
        if token.kind != kind {
            return Err(ParseError::unexpected_token(
                &token,
                &format!("{} (expected {})", context, kind),
            ));
        }
        Ok(token)
    }

    /// Build an error positioned at the most recently read token
    pub(super) fn error(&self, kind: ErrorKind, message: String) -> ParseError {
        let token = self.tokens.get(self.current.saturating_sub(1));
        ParseError::new(kind, message, token.pos)
    }

    // Helper: Check recursion depth limit
    pub(super) fn check_depth(&self, depth: usize) -> Result<(), ParseError> {
        if depth > self.limits.max_nesting_depth {
            return Err(self.error(
                ErrorKind::TooDeep,
                format!(
                    "nesting too deep: {} levels (max {})",
                    depth, self.limits.max_nesting_depth
                ),
            ));
        }
        Ok(())
    }

    /// Read `name="value"` pairs up to the closing delimiter
    ///
    /// The delimiter itself is left unread.
    pub(super) fn parse_attrs(&mut self, allowed: &[&str]) -> Result<Attributes, ParseError> {
        let mut attrs = Attributes::new();
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::Ident => {
                    if !allowed.contains(&token.text.as_str()) {
                        return Err(ParseError::unexpected_token(
                            &token,
                            &format!("attributes. allowed: {:?}", allowed),
                        ));
                    }
                    self.expect(TokenKind::Equals, "attribute")?;
                    let quoted = self.expect(TokenKind::String, "attribute")?;
                    let value = unquote(&quoted.text).map_err(|e| {
                        ParseError::new(ErrorKind::Syntax, e, quoted.pos)
                    })?;
                    attrs.insert(
                        token.text,
                        Attribute {
                            value,
                            pos: quoted.pos,
                        },
                    );
                }
                TokenKind::RightDelim | TokenKind::RightDelimEnd => {
                    self.backup();
                    return Ok(attrs);
                }
                _ => return Err(ParseError::unexpected_token(&token, "attributes")),
            }
        }
    }

    pub(super) fn bool_attr(
        &self,
        attrs: &Attributes,
        key: &str,
        default: bool,
    ) -> Result<bool, ParseError> {
        match attrs.get(key) {
            None => Ok(default),
            Some(attr) if attr.value == "true" => Ok(true),
            Some(attr) if attr.value == "false" => Ok(false),
            Some(attr) => Err(ParseError::new(
                ErrorKind::Semantic,
                format!("expected 'true' or 'false', got {:?}", attr.value),
                attr.pos,
            )),
        }
    }

    pub(super) fn parse_autoescape(&self, attrs: &Attributes) -> Result<Autoescape, ParseError> {
        let Some(attr) = attrs.get("autoescape") else {
            return Ok(Autoescape::Unspecified);
        };
        match attr.value.as_str() {
            "" => Ok(Autoescape::Unspecified),
            "contextual" => Ok(Autoescape::Contextual),
            "true" => Ok(Autoescape::On),
            "false" => Ok(Autoescape::Off),
            other => Err(ParseError::new(
                ErrorKind::Semantic,
                format!(
                    "expected \"true\", \"false\", or \"contextual\" for autoescape, got {:?}",
                    other
                ),
                attr.pos,
            )),
        }
    }

    /// Parse an expression held in an attribute string
    ///
    /// Runs in a fresh parser with no globals table. Errors are reported at
    /// `pos`, the attribute's position in the enclosing file.
    pub(super) fn parse_quoted_expr(
        &self,
        text: &str,
        pos: usize,
        depth: usize,
    ) -> Result<Expr, ParseError> {
        tracing::trace!(expr = text, "parsing quoted expression");
        let tokens = lex_expr(text, self.limits);
        Parser::new(tokens, None, self.limits)
            .parse_whole_expr(depth)
            .map_err(|e| e.reposition(pos))
    }
}

// Helper functions

pub(super) fn all_space(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

/// Normalize raw template text
///
/// Text on a single line is kept, except that whitespace next to a comment
/// is trimmed (`trim_before`, `trim_after`). Across line breaks each line is
/// trimmed, blank lines are dropped, and lines are joined with one space
/// unless the join touches an HTML tag boundary (`>` before or `<` after).
pub(super) fn rawtext(text: &str, trim_before: bool, trim_after: bool) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() == 1 {
        let mut line = text;
        if trim_before {
            line = line.trim_start();
        }
        if trim_after {
            line = line.trim_end();
        }
        return line.to_string();
    }

    let last = lines.len() - 1;
    let mut out = String::with_capacity(text.len());
    for (i, line) in lines.iter().enumerate() {
        let line = if i == 0 && !trim_before {
            line.trim_end()
        } else if i == last && !trim_after {
            line.trim_start()
        } else {
            line.trim()
        };
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() && !out.ends_with('>') && !line.starts_with('<') {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

/// Strip the quotes from a string literal and resolve its escapes
pub(crate) fn unquote(quoted: &str) -> Result<String, String> {
    let mut chars = quoted.chars();
    let quote = match (chars.next(), chars.next_back()) {
        (Some(open @ ('\'' | '"')), Some(close)) if open == close && quoted.len() >= 2 => open,
        _ => return Err(format!("invalid string literal {}", quoted)),
    };

    let mut out = String::with_capacity(quoted.len());
    while let Some(c) = chars.next() {
        if c == quote {
            return Err(format!("unescaped quote in string literal {}", quoted));
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('b') => '\u{8}',
            Some('f') => '\u{c}',
            Some(c @ ('\\' | '\'' | '"' | '/')) => c,
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid unicode escape \\u{} in {}", hex, quoted))?
            }
            Some(other) => {
                return Err(format!("unknown escape \\{} in {}", other, quoted));
            }
            None => return Err(format!("unterminated escape in {}", quoted)),
        };
        out.push(escaped);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::limits::ParserLimits;
    use rstest::rstest;

    #[rstest]
    #[case("hello", false, false, "hello")]
    #[case("  a b  ", false, false, "  a b  ")]
    #[case("  a b  ", true, true, "a b")]
    #[case("a\n  b", false, false, "a b")]
    #[case("<div>\n  <span>", false, false, "<div><span>")]
    #[case("x>\n  y", false, false, "x>y")]
    #[case("\n\n", false, false, "")]
    #[case("  a  \n  b  ", false, false, "  a b  ")]
    #[case("a\n\n\nb", false, false, "a b")]
    fn test_rawtext(
        #[case] text: &str,
        #[case] trim_before: bool,
        #[case] trim_after: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(rawtext(text, trim_before, trim_after), expected);
    }

    #[rstest]
    #[case("'abc'", "abc")]
    #[case("\"abc\"", "abc")]
    #[case(r"'it\'s'", "it's")]
    #[case(r"'a\nb'", "a\nb")]
    #[case(r"'é'", "é")]
    #[case(r#"'say \"hi\"'"#, "say \"hi\"")]
    #[case("''", "")]
    fn test_unquote(#[case] quoted: &str, #[case] expected: &str) {
        assert_eq!(unquote(quoted).unwrap(), expected);
    }

    #[test]
    fn test_unquote_rejects_malformed() {
        assert!(unquote("abc").is_err());
        assert!(unquote("'abc\"").is_err());
        assert!(unquote(r"'\q'").is_err());
        assert!(unquote(r"'\u12'").is_err());
        assert!(unquote("'").is_err());
    }

    #[test]
    fn test_all_space() {
        assert!(all_space(" \n\t"));
        assert!(all_space(""));
        assert!(!all_space(" x "));
    }

    #[test]
    fn test_cursor_backup() {
        let limits = ParserLimits::default();
        let mut parser = Parser::new(lex("{$a}", &limits), None, &limits);
        assert_eq!(parser.next().kind, TokenKind::LeftDelim);
        assert_eq!(parser.next().kind, TokenKind::DollarIdent);
        parser.backup2();
        assert_eq!(parser.peek().kind, TokenKind::LeftDelim);
        parser.next();
        parser.next();
        parser.next();
        assert_eq!(parser.next().kind, TokenKind::Eof);
        // reading past the end keeps yielding the terminal token
        assert_eq!(parser.next().kind, TokenKind::Eof);
        parser.backup();
        assert_eq!(parser.next().kind, TokenKind::Eof);
    }

    #[test]
    fn test_check_depth() {
        let limits = ParserLimits {
            max_nesting_depth: 3,
            ..ParserLimits::default()
        };
        let parser = Parser::new(lex("", &limits), None, &limits);
        assert!(parser.check_depth(3).is_ok());
        let err = parser.check_depth(4).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooDeep);
        assert!(err.message.starts_with("nesting too deep"));
    }
}
