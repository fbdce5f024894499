// Parser module - splits parser into logical components
mod error;
mod expressions;
mod helpers;
mod statements;

// Public exports
pub use error::{ErrorKind, Location, ParseError};

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Expr, SoyFile};
use crate::lexer::{Tokens, TokenKind, lex, lex_expr};
use crate::limits::ParserLimits;
use crate::value::Globals;

// Parser structure; one per file or standalone expression
pub struct Parser<'a> {
    tokens: Tokens,
    current: usize,
    namespace: String,                // set by the file's namespace declaration
    aliases: HashMap<String, String>, // last segment -> full path
    globals: Option<&'a Globals>,
    limits: &'a ParserLimits,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Tokens, globals: Option<&'a Globals>, limits: &'a ParserLimits) -> Self {
        Self {
            tokens,
            current: 0,
            namespace: String::new(),
            aliases: HashMap::new(),
            globals,
            limits,
        }
    }

    /// Parse a whole file into its top-level nodes
    pub fn parse(mut self) -> Result<Vec<crate::ast::Node>, ParseError> {
        let list = self.item_list(0, &[TokenKind::Eof])?;
        Ok(list.nodes)
    }

    /// Parse a single expression that must span all of the input
    pub fn parse_whole_expr(mut self, depth: usize) -> Result<Expr, ParseError> {
        let expr = self.parse_expr(depth, 0)?;
        let end = self.next();
        if end.kind != TokenKind::Eof {
            return Err(ParseError::unexpected_token(
                &end,
                "expression (expected end of input)",
            ));
        }
        Ok(expr)
    }
}

// Public API functions

/// Parse a template file with default limits
pub fn parse_file(name: &str, text: &str, globals: &Globals) -> Result<SoyFile, ParseError> {
    parse_file_with_limits(name, text, globals, &ParserLimits::default())
}

/// Parse a template file
///
/// Bare identifiers in expressions resolve against `globals`. Errors carry
/// the file name and the line and column of the offending token.
pub fn parse_file_with_limits(
    name: &str,
    text: &str,
    globals: &Globals,
    limits: &ParserLimits,
) -> Result<SoyFile, ParseError> {
    let tokens = lex(text, limits);
    let token_count = tokens.len();
    debug!(file = name, bytes = text.len(), tokens = token_count, "parsing template file");

    match Parser::new(tokens, Some(globals), limits).parse() {
        Ok(body) => {
            debug!(file = name, nodes = body.len(), "parsed template file");
            Ok(SoyFile {
                name: name.to_string(),
                text: text.to_string(),
                body,
            })
        }
        Err(err) => {
            let err = err.locate(name, text);
            debug!(file = name, error = %err, "template parse failed");
            Err(err)
        }
    }
}

/// Parse a standalone expression with default limits
pub fn parse_expr(text: &str) -> Result<Expr, ParseError> {
    parse_expr_with_limits(text, &ParserLimits::default())
}

/// Parse a standalone expression
///
/// No globals are available, and errors carry no location.
pub fn parse_expr_with_limits(text: &str, limits: &ParserLimits) -> Result<Expr, ParseError> {
    let tokens = lex_expr(text, limits);
    Parser::new(tokens, None, limits).parse_whole_expr(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Node, dump};
    use crate::value::Value;

    #[test]
    fn test_parse_file_keeps_name_and_text() {
        let text = "{namespace a}";
        let file = parse_file("a.soy", text, &Globals::new()).unwrap();
        assert_eq!(file.name, "a.soy");
        assert_eq!(file.text, text);
        assert_eq!(file.body.len(), 1);
    }

    #[test]
    fn test_empty_file() {
        let file = parse_file("empty.soy", "", &Globals::new()).unwrap();
        assert!(file.body.is_empty());
        let file = parse_file("blank.soy", "\n\n  \n", &Globals::new()).unwrap();
        assert!(file.body.is_empty());
    }

    #[test]
    fn test_error_location() {
        let err = parse_file("t.soy", "{namespace a}\n{template .t}\n  {$a +}\n{/template}", &Globals::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(
            err.location,
            Some(Location {
                name: "t.soy".to_string(),
                line: 3,
                column: 8,
            })
        );
        assert_eq!(err.to_string(), "template t.soy:3:8: unexpected \"}\" in soy expression");
    }

    #[test]
    fn test_globals_resolve_in_templates() {
        let mut globals = Globals::new();
        globals.insert("app.NAME".to_string(), Value::from("soy"));
        let file = parse_file("t", "{app.NAME}", &globals).unwrap();
        assert_eq!(dump(&file.body), "Print\n  Global app.NAME = 'soy'\n");

        let err = parse_file("t", "{UNDEFINED}", &globals).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert_eq!(err.to_string(), "template t:1:2: global \"UNDEFINED\" is undefined");
    }

    #[test]
    fn test_parser_state_is_per_file() {
        let first = parse_file("a", "{namespace a}{alias x.y}", &Globals::new()).unwrap();
        assert!(matches!(first.body[0], Node::Namespace(_)));
        // neither the namespace nor the alias carries over
        let second = parse_file("b", "{namespace b}{call y.t /}", &Globals::new()).unwrap();
        assert_eq!(dump(&second.body), "Namespace b\nCall y.t\n");
    }

    #[test]
    fn test_parse_expr() {
        let expr = parse_expr("$a ?: 'x'").unwrap();
        assert_eq!(expr.to_string(), "$a ?: 'x'");
        assert!(parse_expr("").is_err());
    }
}
