use std::fmt;

use crate::lexer::{Token, TokenKind, line_col};

/// What class of rule a failed parse broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,  // surfaced from an Error token
    Syntax,   // unexpected token in a grammar context
    Semantic, // well-formed but violates a checked rule
    TooDeep,  // nesting exceeded the configured limit
}

/// Where a file-level error occurred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub name: String,
    pub line: usize,
    pub column: usize,
}

// Parse error
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: usize,
    pub location: Option<Location>, // None for standalone expressions
}

impl ParseError {
    pub(super) fn new(kind: ErrorKind, message: String, pos: usize) -> Self {
        Self {
            kind,
            message,
            pos,
            location: None,
        }
    }

    pub(super) fn unexpected_token(token: &Token, context: &str) -> Self {
        if token.kind == TokenKind::Error {
            return Self::new(
                ErrorKind::Lexical,
                format!("lexical error: {}", token),
                token.pos,
            );
        }
        Self::new(
            ErrorKind::Syntax,
            format!("unexpected {} in {}", token, context),
            token.pos,
        )
    }

    /// Attach a file name and resolve the byte offset against its source
    pub(super) fn locate(mut self, name: &str, source: &str) -> Self {
        let (line, column) = line_col(source, self.pos);
        self.location = Some(Location {
            name: name.to_string(),
            line,
            column,
        });
        self
    }

    /// Move an error raised inside a quoted attribute to the attribute itself
    pub(super) fn reposition(mut self, pos: usize) -> Self {
        self.pos = pos;
        self.location = None;
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "template {}:{}:{}: {}",
                loc.name, loc.line, loc.column, self.message
            ),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}
