use indexmap::IndexMap;

use super::error::{ErrorKind, ParseError};
use super::helpers::unquote;
use super::Parser;
use crate::ast::{Access, BinaryOp, Expr, UNARY_PRECEDENCE};
use crate::lexer::{Token, TokenKind};

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Mul => BinaryOp::Mul,
        TokenKind::Div => BinaryOp::Div,
        TokenKind::Mod => BinaryOp::Mod,
        TokenKind::Add => BinaryOp::Add,
        TokenKind::Sub => BinaryOp::Sub,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Gte => BinaryOp::Gte,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Lte => BinaryOp::Lte,
        TokenKind::Or => BinaryOp::Or,
        TokenKind::And => BinaryOp::And,
        TokenKind::Elvis => BinaryOp::Elvis,
        _ => return None,
    };
    Some(op)
}

// Recursive expression parsing methods
impl<'a> Parser<'a> {
    /// Parse an expression with precedence climbing
    ///
    /// Binary operators binding at least as tightly as `min_precedence` are
    /// folded left to right. A `?` is only taken as a ternary at the
    /// outermost level.
    pub(super) fn parse_expr(&mut self, depth: usize, min_precedence: u8) -> Result<Expr, ParseError> {
        self.check_depth(depth)?;
        let mut left = self.parse_first_term(depth)?;

        let mut token;
        loop {
            token = self.next();
            let op = match binary_op(token.kind) {
                Some(op) if op.precedence() >= min_precedence => op,
                _ => break,
            };

            // Right side binds one level tighter for left-associativity
            let right = self.parse_expr(depth + 1, op.precedence() + 1)?;
            left = Expr::Binary {
                pos: token.pos,
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        if min_precedence == 0 && token.kind == TokenKind::TernIf {
            return self.parse_ternary(depth + 1, left);
        }
        self.backup();
        Ok(left)
    }

    /// Primary: "(" expr ")" | unary expr | value
    fn parse_first_term(&mut self, depth: usize) -> Result<Expr, ParseError> {
        let token = self.next();
        match token.kind {
            TokenKind::Not => {
                let arg = self.parse_expr(depth + 1, UNARY_PRECEDENCE)?;
                Ok(Expr::Not {
                    pos: token.pos,
                    arg: Box::new(arg),
                })
            }
            TokenKind::Negate => {
                let arg = self.parse_expr(depth + 1, UNARY_PRECEDENCE)?;
                Ok(Expr::Negate {
                    pos: token.pos,
                    arg: Box::new(arg),
                })
            }
            TokenKind::LeftParen => {
                let expr = self.parse_expr(depth + 1, 0)?;
                self.expect(TokenKind::RightParen, "soy expression")?;
                Ok(expr)
            }
            TokenKind::Null
            | TokenKind::Bool
            | TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::DollarIdent
            | TokenKind::Ident
            | TokenKind::LeftBracket => self.parse_value(depth + 1, token),
            _ => Err(ParseError::unexpected_token(&token, "soy expression")),
        }
    }

    fn parse_value(&mut self, depth: usize, token: Token) -> Result<Expr, ParseError> {
        let pos = token.pos;
        match token.kind {
            TokenKind::Null => Ok(Expr::Null { pos }),
            TokenKind::Bool => Ok(Expr::Bool {
                pos,
                value: token.text == "true",
            }),
            TokenKind::Integer => {
                let parsed = match token.text.strip_prefix("0x").or(token.text.strip_prefix("0X")) {
                    Some(hex) => i64::from_str_radix(hex, 16),
                    None => token.text.parse::<i64>(),
                };
                let value = parsed.map_err(|e| {
                    ParseError::new(
                        ErrorKind::Syntax,
                        format!("invalid integer {}: {}", token.text, e),
                        pos,
                    )
                })?;
                Ok(Expr::Int { pos, value })
            }
            TokenKind::Float => match token.text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Expr::Float { pos, value }),
                _ => Err(ParseError::new(
                    ErrorKind::Syntax,
                    format!("invalid float {}", token.text),
                    pos,
                )),
            },
            TokenKind::String => {
                let value = unquote(&token.text).map_err(|e| {
                    ParseError::new(
                        ErrorKind::Syntax,
                        format!("error unquoting {}: {}", token.text, e),
                        pos,
                    )
                })?;
                Ok(Expr::Str { pos, value })
            }
            TokenKind::LeftBracket => self.parse_list_or_map(depth + 1, pos),
            TokenKind::DollarIdent => self.parse_data_ref(depth + 1, token),
            _ => {
                let next = self.next();
                if next.kind == TokenKind::LeftParen {
                    self.parse_function(depth + 1, token)
                } else {
                    self.backup();
                    self.parse_global(token)
                }
            }
        }
    }

    /// $name followed by any chain of .key, ?.key, .N, ?.N, [expr], ?[expr]
    fn parse_data_ref(&mut self, depth: usize, token: Token) -> Result<Expr, ParseError> {
        let key = token.text[1..].to_string();
        let mut access = Vec::new();
        loop {
            let step = self.next();
            let null_safe = matches!(
                step.kind,
                TokenKind::QuestionDotIdent | TokenKind::QuestionDotIndex | TokenKind::QuestionKey
            );
            let prefix = if null_safe { 2 } else { 1 };
            match step.kind {
                TokenKind::DotIdent | TokenKind::QuestionDotIdent => access.push(Access::Key {
                    pos: step.pos,
                    null_safe,
                    key: step.text[prefix..].to_string(),
                }),
                TokenKind::DotIndex | TokenKind::QuestionDotIndex => {
                    let index = step.text[prefix..].parse::<usize>().map_err(|e| {
                        ParseError::new(
                            ErrorKind::Syntax,
                            format!("invalid index {}: {}", step.text, e),
                            step.pos,
                        )
                    })?;
                    access.push(Access::Index {
                        pos: step.pos,
                        null_safe,
                        index,
                    });
                }
                TokenKind::LeftBracket | TokenKind::QuestionKey => {
                    let expr = self.parse_expr(depth + 1, 0)?;
                    self.expect(TokenKind::RightBracket, "dataref")?;
                    access.push(Access::Expr {
                        pos: step.pos,
                        null_safe,
                        expr,
                    });
                }
                _ => {
                    self.backup();
                    return Ok(Expr::DataRef {
                        pos: token.pos,
                        key,
                        access,
                    });
                }
            }
        }
    }

    // "[" has just been read
    fn parse_list_or_map(&mut self, depth: usize, pos: usize) -> Result<Expr, ParseError> {
        self.check_depth(depth)?;
        match self.next().kind {
            TokenKind::Colon => {
                self.expect(TokenKind::RightBracket, "map literal")?;
                return Ok(Expr::Map {
                    pos,
                    entries: IndexMap::new(),
                });
            }
            TokenKind::RightBracket => {
                return Ok(Expr::List {
                    pos,
                    items: Vec::new(),
                });
            }
            _ => self.backup(),
        }

        let first = self.parse_expr(depth + 1, 0)?;
        let token = self.next();
        match token.kind {
            TokenKind::Colon => self.parse_map_literal(depth, pos, first),
            TokenKind::Comma => self.parse_list_literal(depth, pos, first),
            TokenKind::RightBracket => Ok(Expr::List {
                pos,
                items: vec![first],
            }),
            _ => Err(ParseError::unexpected_token(&token, "list/map literal")),
        }
    }

    // "[" expr "," has been read
    fn parse_list_literal(&mut self, depth: usize, pos: usize, first: Expr) -> Result<Expr, ParseError> {
        let mut items = vec![first];
        loop {
            if self.peek().kind == TokenKind::RightBracket {
                self.next();
                return Ok(Expr::List { pos, items });
            }
            items.push(self.parse_expr(depth + 1, 0)?);
            let next = self.next();
            match next.kind {
                TokenKind::RightBracket => return Ok(Expr::List { pos, items }),
                TokenKind::Comma => {}
                _ => return Err(ParseError::unexpected_token(&next, "parsing value list")),
            }
        }
    }

    // "[" key ":" has been read; later duplicate keys overwrite earlier ones
    fn parse_map_literal(&mut self, depth: usize, pos: usize, first_key: Expr) -> Result<Expr, ParseError> {
        let mut key = match first_key {
            Expr::Str { value, .. } => value,
            other => {
                return Err(ParseError::new(
                    ErrorKind::Semantic,
                    format!("expected a string as map key, got: {}", other.kind_name()),
                    other.pos(),
                ));
            }
        };

        let mut entries = IndexMap::new();
        loop {
            entries.insert(key, self.parse_expr(depth + 1, 0)?);
            let next = self.next();
            match next.kind {
                TokenKind::RightBracket => return Ok(Expr::Map { pos, entries }),
                TokenKind::Comma => {}
                _ => return Err(ParseError::unexpected_token(&next, "map literal")),
            }
            if self.peek().kind == TokenKind::RightBracket {
                self.next();
                return Ok(Expr::Map { pos, entries });
            }
            let quoted = self.expect(TokenKind::String, "map literal")?;
            key = unquote(&quoted.text)
                .map_err(|e| ParseError::new(ErrorKind::Syntax, e, quoted.pos))?;
            self.expect(TokenKind::Colon, "map literal")?;
        }
    }

    // "name(" has been read
    fn parse_function(&mut self, depth: usize, name: Token) -> Result<Expr, ParseError> {
        self.check_depth(depth)?;
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RightParen {
            self.next();
        } else {
            loop {
                args.push(self.parse_expr(depth + 1, 0)?);
                let token = self.next();
                match token.kind {
                    TokenKind::Comma => {}
                    TokenKind::RightParen => break,
                    TokenKind::Eof => {
                        return Err(ParseError::new(
                            ErrorKind::Syntax,
                            "unexpected eof reading function params".to_string(),
                            token.pos,
                        ));
                    }
                    _ => {
                        return Err(ParseError::unexpected_token(
                            &token,
                            "reading function params",
                        ));
                    }
                }
            }
        }
        Ok(Expr::Function {
            pos: name.pos,
            name: name.text,
            args,
        })
    }

    /// A bare, possibly dotted, identifier resolved against the globals table
    fn parse_global(&mut self, first: Token) -> Result<Expr, ParseError> {
        let mut name = first.text;
        loop {
            let part = self.next();
            if part.kind != TokenKind::DotIdent {
                self.backup();
                break;
            }
            name.push_str(&part.text);
        }

        let found = self.globals.and_then(|globals| globals.get(&name)).cloned();
        match found {
            Some(value) => Ok(Expr::Global {
                pos: first.pos,
                name,
                value,
            }),
            None => Err(ParseError::new(
                ErrorKind::Semantic,
                format!("global {:?} is undefined", name),
                first.pos,
            )),
        }
    }

    /// `?` has been read and `cond` is the condition
    ///
    /// A further `:` after the false branch makes the whole ternary the
    /// condition of another one: `a ? b : c : d` reads as `(a ? b : c) ? ...`
    /// and continues with one more branch pair.
    fn parse_ternary(&mut self, depth: usize, cond: Expr) -> Result<Expr, ParseError> {
        self.check_depth(depth)?;
        let if_true = self.parse_expr(depth + 1, 0)?;
        self.expect(TokenKind::Colon, "ternary")?;
        let if_false = self.parse_expr(depth + 1, 0)?;
        let result = Expr::Ternary {
            pos: cond.pos(),
            cond: Box::new(cond),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        };
        if self.peek().kind == TokenKind::Colon {
            self.next();
            return self.parse_ternary(depth + 1, result);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{parse_expr, parse_expr_with_limits};
    use super::*;
    use crate::ast::dump_expr;
    use crate::limits::ParserLimits;
    use crate::value::{Globals, Value};
    use rstest::rstest;

    fn to_tree(source: &str) -> String {
        dump_expr(&parse_expr(source).unwrap())
    }

    fn with_globals(source: &str, globals: &Globals) -> Result<Expr, ParseError> {
        let limits = ParserLimits::default();
        let tokens = crate::lexer::lex_expr(source, &limits);
        Parser::new(tokens, Some(globals), &limits).parse_whole_expr(0)
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        let expected = "\
Add
  Int 1
  Mul
    Int 2
    Int 3
";
        assert_eq!(to_tree("1 + 2 * 3"), expected);
    }

    #[test]
    fn test_negate_binds_tighter_than_multiplication() {
        let expected = "\
Mul
  Negate
    Int 1
  Int 2
";
        assert_eq!(to_tree("-1 * 2"), expected);
    }

    #[test]
    fn test_left_associativity() {
        let expected = "\
Sub
  Sub
    Int 1
    Int 2
  Int 3
";
        assert_eq!(to_tree("1 - 2 - 3"), expected);
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expected = "\
Mul
  Add
    Int 1
    Int 2
  Int 3
";
        assert_eq!(to_tree("(1 + 2) * 3"), expected);
    }

    #[rstest]
    #[case("$a or $b and $c", "Or")]
    #[case("$a and $b or $c", "Or")]
    #[case("$a ?: $b or $c", "Elvis")]
    #[case("$a == 1 and $b", "And")]
    #[case("$a + 1 > $b * 2", "Gt")]
    #[case("$a % 2 != 0", "NotEq")]
    #[case("not $a and $b", "And")]
    #[case("-$a + 1", "Add")]
    fn test_root_operator(#[case] source: &str, #[case] root: &str) {
        let tree = to_tree(source);
        assert_eq!(tree.lines().next(), Some(root), "tree:\n{}", tree);
    }

    #[test]
    fn test_repeated_unary_operators_nest() {
        let expected = "\
Not
  Not
    Bool true
";
        assert_eq!(to_tree("not not true"), expected);
        assert_eq!(to_tree("--1"), "Negate\n  Negate\n    Int 1\n");
    }

    #[test]
    fn test_literals() {
        assert_eq!(to_tree("null"), "Null\n");
        assert_eq!(to_tree("false"), "Bool false\n");
        assert_eq!(to_tree("0x1F"), "Int 31\n");
        assert_eq!(to_tree("2.5"), "Float 2.5\n");
        assert_eq!(to_tree("1e3"), "Float 1000.0\n");
        assert_eq!(to_tree(r"'a\'b'"), "Str \"a'b\"\n");
    }

    #[test]
    fn test_integer_overflow_is_error() {
        let err = parse_expr("99999999999999999999").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_null_safe_data_ref() {
        let expected = "\
DataRef $a
  Key ?.b
  Key ?.c
";
        assert_eq!(to_tree("$a?.b?.c"), expected);
    }

    #[test]
    fn test_data_ref_accessors() {
        let expected = "\
DataRef $a
  Key .b
  Index .0
  Index ?.1
  Expr []
    DataRef $i
  Expr ?[]
    Str \"k\"
";
        assert_eq!(to_tree("$a.b.0?.1[$i]?['k']"), expected);
    }

    #[test]
    fn test_function_calls() {
        assert_eq!(to_tree("length()"), "Function length\n");
        let expected = "\
Function range
  Int 1
  Add
    DataRef $n
    Int 1
";
        assert_eq!(to_tree("range(1, $n + 1)"), expected);
    }

    #[test]
    fn test_unterminated_function_args() {
        let err = parse_expr("f(1,").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        let err = parse_expr("f(1").unwrap_err();
        assert_eq!(err.message, "unexpected eof reading function params");
    }

    #[test]
    fn test_list_and_map_literals() {
        assert_eq!(to_tree("[]"), "List\n");
        assert_eq!(to_tree("[:]"), "Map\n");
        assert_eq!(to_tree("[1]"), "List\n  Int 1\n");
        assert_eq!(to_tree("[1, 2,]"), "List\n  Int 1\n  Int 2\n");
        let expected = "\
Map
  Entry \"a\"
    Int 1
  Entry \"b\"
    List
";
        assert_eq!(to_tree("['a': 1, 'b': []]"), expected);
        assert_eq!(to_tree("['a': 1, 'a': 2]"), "Map\n  Entry \"a\"\n    Int 2\n");
    }

    #[test]
    fn test_map_key_must_be_string() {
        let err = parse_expr("[1: 'a']").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert_eq!(err.message, "expected a string as map key, got: int");

        let err = parse_expr("['a': 1, $k: 2]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_ternary() {
        let expected = "\
Ternary
  DataRef $a
  Int 1
  Int 2
";
        assert_eq!(to_tree("$a ? 1 : 2"), expected);
    }

    #[test]
    fn test_chained_ternary_uses_previous_as_condition() {
        let expected = "\
Ternary
  Ternary
    DataRef $a
    Int 1
    Int 2
  Int 3
  Int 4
";
        assert_eq!(to_tree("$a ? 1 : 2 : 3 : 4"), expected);
    }

    #[test]
    fn test_ternary_in_false_branch() {
        let expected = "\
Ternary
  DataRef $a
  Int 1
  Ternary
    DataRef $b
    Int 2
    Int 3
";
        assert_eq!(to_tree("$a ? 1 : $b ? 2 : 3"), expected);
    }

    #[test]
    fn test_ternary_only_at_outer_level() {
        // the operand of '+' stops at '?', which then applies to the sum
        let tree = to_tree("$a + $b ? 1 : 2");
        assert!(tree.starts_with("Ternary\n  Add\n"), "tree:\n{}", tree);
    }

    #[test]
    fn test_globals() {
        let mut globals = Globals::new();
        globals.insert("app.MAX".to_string(), Value::Int(10));

        let expr = with_globals("app.MAX * 2", &globals).unwrap();
        assert_eq!(dump_expr(&expr), "Mul\n  Global app.MAX = 10\n  Int 2\n");

        let err = with_globals("app.MIN", &globals).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert_eq!(err.message, "global \"app.MIN\" is undefined");
    }

    #[test]
    fn test_standalone_expression_has_no_globals() {
        let err = parse_expr("FOO").unwrap_err();
        assert_eq!(err.message, "global \"FOO\" is undefined");
        assert!(err.location.is_none());
    }

    #[test]
    fn test_trailing_input_is_rejected() {
        let err = parse_expr("1 2").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.starts_with("unexpected \"2\""));
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse_expr("1 + )").unwrap_err();
        assert_eq!(err.message, "unexpected \")\" in soy expression");
    }

    #[test]
    fn test_nesting_limit() {
        let limits = ParserLimits {
            max_nesting_depth: 16,
            ..ParserLimits::default()
        };
        let deep = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        let err = parse_expr_with_limits(&deep, &limits).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooDeep);

        let shallow = format!("{}1{}", "(".repeat(3), ")".repeat(3));
        assert!(parse_expr_with_limits(&shallow, &limits).is_ok());
    }
}
