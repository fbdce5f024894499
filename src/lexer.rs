use std::fmt;

use crate::limits::ParserLimits;

// Token types

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Error, // text holds the message
    Text,
    Comment,

    // Delimiters
    LeftDelim,     // {
    RightDelim,    // }
    RightDelimEnd, // /}

    // SoyDoc
    SoyDocStart,         // /**
    SoyDocParam,         // @param
    SoyDocOptionalParam, // @param?
    SoyDocEnd,           // */

    // Commands (only recognized directly after '{')
    Namespace,
    Template,
    If,
    Elseif,
    Else,
    For,
    Foreach,
    Ifempty,
    Switch,
    Case,
    Default,
    Call,
    Param,
    Let,
    Msg,
    Css,
    Log,
    Debugger,
    Literal,
    Alias,
    Print,

    // Closing commands, {/name}
    TemplateEnd,
    IfEnd,
    ForEnd,
    ForeachEnd,
    SwitchEnd,
    CallEnd,
    ParamEnd,
    LetEnd,
    MsgEnd,
    LogEnd,
    LiteralEnd,

    // Special character commands
    Nil,            // {nil}
    Space,          // {sp}
    Tab,            // {\t}
    Newline,        // {\n}
    CarriageReturn, // {\r}
    LeftBrace,      // {lb}
    RightBrace,     // {rb}

    // Identifiers and literals
    Ident,            // foo
    DollarIdent,      // $foo
    DotIdent,         // .foo
    DotIndex,         // .0
    QuestionDotIdent, // ?.foo
    QuestionDotIndex, // ?.0
    QuestionKey,      // ?[
    Null,
    Bool,
    Integer,
    Float,
    String,

    // Punctuation
    LeftBracket,  // [
    RightBracket, // ]
    LeftParen,    // (
    RightParen,   // )
    Colon,        // :
    Comma,        // ,
    Equals,       // =
    Pipe,         // |

    // Operators
    Not,
    Negate,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Elvis,  // ?:
    TernIf, // ?
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TokenKind::Eof => "EOF",
            TokenKind::Error => "error",
            TokenKind::Text => "text",
            TokenKind::Comment => "comment",
            TokenKind::LeftDelim => "'{'",
            TokenKind::RightDelim => "'}'",
            TokenKind::RightDelimEnd => "'/}'",
            TokenKind::SoyDocStart => "'/**'",
            TokenKind::SoyDocParam => "'@param'",
            TokenKind::SoyDocOptionalParam => "'@param?'",
            TokenKind::SoyDocEnd => "'*/'",
            TokenKind::Namespace => "<namespace>",
            TokenKind::Template => "<template>",
            TokenKind::If => "<if>",
            TokenKind::Elseif => "<elseif>",
            TokenKind::Else => "<else>",
            TokenKind::For => "<for>",
            TokenKind::Foreach => "<foreach>",
            TokenKind::Ifempty => "<ifempty>",
            TokenKind::Switch => "<switch>",
            TokenKind::Case => "<case>",
            TokenKind::Default => "<default>",
            TokenKind::Call => "<call>",
            TokenKind::Param => "<param>",
            TokenKind::Let => "<let>",
            TokenKind::Msg => "<msg>",
            TokenKind::Css => "<css>",
            TokenKind::Log => "<log>",
            TokenKind::Debugger => "<debugger>",
            TokenKind::Literal => "<literal>",
            TokenKind::Alias => "<alias>",
            TokenKind::Print => "<print>",
            TokenKind::TemplateEnd => "</template>",
            TokenKind::IfEnd => "</if>",
            TokenKind::ForEnd => "</for>",
            TokenKind::ForeachEnd => "</foreach>",
            TokenKind::SwitchEnd => "</switch>",
            TokenKind::CallEnd => "</call>",
            TokenKind::ParamEnd => "</param>",
            TokenKind::LetEnd => "</let>",
            TokenKind::MsgEnd => "</msg>",
            TokenKind::LogEnd => "</log>",
            TokenKind::LiteralEnd => "</literal>",
            TokenKind::Nil => "<nil>",
            TokenKind::Space => "<sp>",
            TokenKind::Tab => "<\\t>",
            TokenKind::Newline => "<\\n>",
            TokenKind::CarriageReturn => "<\\r>",
            TokenKind::LeftBrace => "<lb>",
            TokenKind::RightBrace => "<rb>",
            TokenKind::Ident => "identifier",
            TokenKind::DollarIdent => "variable",
            TokenKind::DotIdent => "'.ident'",
            TokenKind::DotIndex => "'.index'",
            TokenKind::QuestionDotIdent => "'?.ident'",
            TokenKind::QuestionDotIndex => "'?.index'",
            TokenKind::QuestionKey => "'?['",
            TokenKind::Null => "null",
            TokenKind::Bool => "bool",
            TokenKind::Integer => "integer",
            TokenKind::Float => "float",
            TokenKind::String => "string",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::Equals => "'='",
            TokenKind::Pipe => "'|'",
            TokenKind::Not => "'not'",
            TokenKind::Negate => "unary '-'",
            TokenKind::Mul => "'*'",
            TokenKind::Div => "'/'",
            TokenKind::Mod => "'%'",
            TokenKind::Add => "'+'",
            TokenKind::Sub => "'-'",
            TokenKind::Eq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Gt => "'>'",
            TokenKind::Gte => "'>='",
            TokenKind::Lt => "'<'",
            TokenKind::Lte => "'<='",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Elvis => "'?:'",
            TokenKind::TernIf => "'?'",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,   // byte offset into the source
    pub text: String, // literal source text, or the message of an Error token
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Error => write!(f, "{}", self.text),
            _ if self.text.chars().count() > 12 => {
                let short: String = self.text.chars().take(10).collect();
                write!(f, "{:?}...", short)
            }
            _ => write!(f, "{:?}", self.text),
        }
    }
}

/// The complete token sequence of one source text
///
/// Always ends with exactly one Eof or Error token.
#[derive(Debug, Clone)]
pub struct Tokens {
    list: Vec<Token>,
}

impl Tokens {
    /// Wrap a token list, appending an Eof if it lacks a terminal token
    pub fn new(mut list: Vec<Token>) -> Self {
        let terminated = list
            .last()
            .is_some_and(|t| matches!(t.kind, TokenKind::Eof | TokenKind::Error));
        if !terminated {
            let pos = list.last().map_or(0, |t| t.pos + t.text.len());
            list.push(Token {
                kind: TokenKind::Eof,
                pos,
                text: String::new(),
            });
        }
        Self { list }
    }

    /// Get the token at index; past the end this is the terminal token
    pub fn get(&self, index: usize) -> &Token {
        &self.list[index.min(self.list.len() - 1)]
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// Resolve a byte offset into a 1-indexed (line, column) pair
pub fn line_col(source: &str, pos: usize) -> (usize, usize) {
    let before = source.get(..pos).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

// Lexer

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Text,
    Tag { after_delim: bool },
    SoyDoc,
    Done,
}

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    limits: &'a ParserLimits,
    mode: Mode,
    expr_only: bool, // a bare expression: no delimiters, EOF ends input
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, limits: &'a ParserLimits) -> Self {
        Self {
            source,
            pos: 0,
            limits,
            mode: Mode::Text,
            expr_only: false,
            tokens: Vec::new(),
        }
    }

    pub fn new_expr(source: &'a str, limits: &'a ParserLimits) -> Self {
        Self {
            mode: Mode::Tag { after_delim: false },
            expr_only: true,
            ..Self::new(source, limits)
        }
    }

    /// Run to completion; lexical errors become a terminal Error token
    pub fn tokenize(mut self) -> Tokens {
        if self.source.len() > self.limits.max_input_size {
            self.fail(format!(
                "input too large: {} bytes (max: {} bytes)",
                self.source.len(),
                self.limits.max_input_size
            ));
        }

        while self.mode != Mode::Done {
            if self.tokens.len() >= self.limits.max_token_count {
                self.fail(format!(
                    "token limit exceeded: {} tokens (max: {})",
                    self.tokens.len(),
                    self.limits.max_token_count
                ));
                break;
            }
            match self.mode {
                Mode::Text => self.lex_text(),
                Mode::Tag { after_delim } => self.lex_tag(after_delim),
                Mode::SoyDoc => self.lex_soydoc(),
                Mode::Done => {}
            }
        }

        Tokens::new(self.tokens)
    }

    // Character navigation methods

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_char2(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn prev_char(&self) -> Option<char> {
        self.source[..self.pos].chars().next_back()
    }

    fn consume_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn consume_while<F>(&mut self, predicate: F) -> bool
    where
        F: Fn(char) -> bool,
    {
        let mut consumed = false;
        while let Some(c) = self.peek_char() {
            if predicate(c) {
                self.consume_char();
                consumed = true;
            } else {
                break;
            }
        }
        consumed
    }

    fn skip_whitespace(&mut self) {
        self.consume_while(char::is_whitespace);
    }

    // Token emission

    fn emit(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            pos: start,
            text: self.source[start..self.pos].to_string(),
        });
    }

    fn emit_text(&mut self, start: usize) {
        if self.pos > start {
            self.emit(TokenKind::Text, start);
        }
    }

    fn fail(&mut self, message: String) {
        self.tokens.push(Token {
            kind: TokenKind::Error,
            pos: self.pos,
            text: message,
        });
        self.mode = Mode::Done;
    }

    fn last_kind(&self) -> Option<TokenKind> {
        self.tokens.last().map(|t| t.kind)
    }

    // Text mode

    fn lex_text(&mut self) {
        let start = self.pos;
        loop {
            match self.peek_char() {
                None => {
                    self.emit_text(start);
                    self.emit(TokenKind::Eof, self.pos);
                    self.mode = Mode::Done;
                    return;
                }
                Some('{') => {
                    self.emit_text(start);
                    let delim = self.pos;
                    self.consume_char();
                    self.emit(TokenKind::LeftDelim, delim);
                    self.mode = Mode::Tag { after_delim: true };
                    return;
                }
                Some('/') if self.at_comment_start() => {
                    self.emit_text(start);
                    self.lex_comment();
                    return;
                }
                Some(_) => {
                    self.consume_char();
                }
            }
        }
    }

    // "//" only starts a comment after whitespace, so URLs survive
    fn at_comment_start(&self) -> bool {
        let rest = self.rest();
        if rest.starts_with("/*") {
            return true;
        }
        rest.starts_with("//") && self.prev_char().is_none_or(char::is_whitespace)
    }

    fn lex_comment(&mut self) {
        let start = self.pos;
        let rest = self.rest();

        if rest.starts_with("/**") && rest[3..].starts_with(char::is_whitespace) {
            self.pos += 3;
            self.emit(TokenKind::SoyDocStart, start);
            self.mode = Mode::SoyDoc;
            return;
        }

        if rest.starts_with("/*") {
            match rest[2..].find("*/") {
                Some(end) => {
                    self.pos += 2 + end + 2;
                    self.emit(TokenKind::Comment, start);
                }
                None => self.fail("unclosed comment".to_string()),
            }
            return;
        }

        let end = rest.find('\n').unwrap_or(rest.len());
        self.pos += end;
        self.emit(TokenKind::Comment, start);
    }

    // SoyDoc mode

    fn lex_soydoc(&mut self) {
        let start = self.pos;
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                self.fail("unclosed soydoc comment".to_string());
                return;
            }

            if rest.starts_with("*/") {
                self.emit_text(start);
                let end = self.pos;
                self.pos += 2;
                self.emit(TokenKind::SoyDocEnd, end);
                self.mode = Mode::Text;
                return;
            }

            if rest.starts_with("@param") {
                let (kind, len) = if rest.starts_with("@param?") {
                    (TokenKind::SoyDocOptionalParam, 7)
                } else {
                    (TokenKind::SoyDocParam, 6)
                };
                if rest[len..].starts_with(char::is_whitespace) {
                    self.emit_text(start);
                    let marker = self.pos;
                    self.pos += len;
                    self.emit(kind, marker);
                    self.skip_whitespace();
                    match self.peek_char() {
                        Some(c) if is_ident_start(c) => self.lex_word(false),
                        _ => self.fail("expected parameter name after @param".to_string()),
                    }
                    return;
                }
            }

            self.consume_char();
        }
    }

    // Tag mode: one token per call

    fn lex_tag(&mut self, after_delim: bool) {
        self.skip_whitespace();
        self.mode = Mode::Tag { after_delim: false };
        let start = self.pos;

        let c = match self.peek_char() {
            Some(c) => c,
            None if self.expr_only => {
                self.emit(TokenKind::Eof, start);
                self.mode = Mode::Done;
                return;
            }
            None => {
                self.fail("unclosed tag".to_string());
                return;
            }
        };

        if after_delim {
            if c == '/' && self.peek_char2() != Some('}') {
                self.consume_char();
                self.lex_end_command(start);
                return;
            }
            if c == '\\' {
                self.consume_char();
                let kind = match self.consume_char() {
                    Some('n') => TokenKind::Newline,
                    Some('r') => TokenKind::CarriageReturn,
                    Some('t') => TokenKind::Tab,
                    _ => {
                        self.fail("unknown special character command".to_string());
                        return;
                    }
                };
                self.emit(kind, start);
                return;
            }
            if is_ident_start(c) {
                self.lex_word(true);
                return;
            }
        }

        match c {
            '}' => {
                if self.expr_only {
                    self.fail("unexpected '}' in expression".to_string());
                    return;
                }
                let closes_literal = self.last_kind() == Some(TokenKind::Literal);
                self.consume_char();
                self.emit(TokenKind::RightDelim, start);
                self.mode = Mode::Text;
                if closes_literal {
                    self.lex_literal_body();
                }
            }
            '/' if self.peek_char2() == Some('}') && !self.expr_only => {
                self.pos += 2;
                self.emit(TokenKind::RightDelimEnd, start);
                self.mode = Mode::Text;
            }
            '/' => self.single(TokenKind::Div, start),
            '$' => {
                self.consume_char();
                match self.peek_char() {
                    Some(c) if is_ident_start(c) => {
                        self.consume_while(is_ident_continue);
                        self.emit_checked_ident(TokenKind::DollarIdent, start);
                    }
                    _ => self.fail("expected identifier after '$'".to_string()),
                }
            }
            '.' => {
                self.consume_char();
                self.lex_dot_access(start, TokenKind::DotIndex, TokenKind::DotIdent);
            }
            '?' => {
                self.consume_char();
                match self.peek_char() {
                    Some('.') => {
                        self.consume_char();
                        self.lex_dot_access(
                            start,
                            TokenKind::QuestionDotIndex,
                            TokenKind::QuestionDotIdent,
                        );
                    }
                    Some('[') => self.single(TokenKind::QuestionKey, start),
                    Some(':') => self.single(TokenKind::Elvis, start),
                    _ => self.emit(TokenKind::TernIf, start),
                }
            }
            '[' => self.single(TokenKind::LeftBracket, start),
            ']' => self.single(TokenKind::RightBracket, start),
            '(' => self.single(TokenKind::LeftParen, start),
            ')' => self.single(TokenKind::RightParen, start),
            ':' => self.single(TokenKind::Colon, start),
            ',' => self.single(TokenKind::Comma, start),
            '|' => self.single(TokenKind::Pipe, start),
            '*' => self.single(TokenKind::Mul, start),
            '%' => self.single(TokenKind::Mod, start),
            '+' => self.single(TokenKind::Add, start),
            '-' => {
                let kind = if self.follows_value() {
                    TokenKind::Sub
                } else {
                    TokenKind::Negate
                };
                self.single(kind, start);
            }
            '=' => self.one_or_two('=', TokenKind::Equals, TokenKind::Eq, start),
            '>' => self.one_or_two('=', TokenKind::Gt, TokenKind::Gte, start),
            '<' => self.one_or_two('=', TokenKind::Lt, TokenKind::Lte, start),
            '!' if self.peek_char2() == Some('=') => {
                self.pos += 2;
                self.emit(TokenKind::NotEq, start);
            }
            '\'' | '"' => self.lex_string(),
            c if c.is_ascii_digit() => self.lex_number(),
            c if is_ident_start(c) => self.lex_word(false),
            '{' => self.fail("unexpected '{' inside tag".to_string()),
            c => self.fail(format!("unexpected character {:?} in tag", c)),
        }
    }

    fn single(&mut self, kind: TokenKind, start: usize) {
        self.consume_char();
        self.emit(kind, start);
    }

    fn one_or_two(&mut self, second: char, one: TokenKind, two: TokenKind, start: usize) {
        self.consume_char();
        if self.peek_char() == Some(second) {
            self.consume_char();
            self.emit(two, start);
        } else {
            self.emit(one, start);
        }
    }

    // A '-' after a value is subtraction, anywhere else it negates
    fn follows_value(&self) -> bool {
        matches!(
            self.last_kind(),
            Some(
                TokenKind::Ident
                    | TokenKind::DollarIdent
                    | TokenKind::DotIdent
                    | TokenKind::DotIndex
                    | TokenKind::QuestionDotIdent
                    | TokenKind::QuestionDotIndex
                    | TokenKind::Null
                    | TokenKind::Bool
                    | TokenKind::Integer
                    | TokenKind::Float
                    | TokenKind::String
                    | TokenKind::RightParen
                    | TokenKind::RightBracket
            )
        )
    }

    fn lex_dot_access(&mut self, start: usize, index: TokenKind, ident: TokenKind) {
        match self.peek_char() {
            Some(c) if c.is_ascii_digit() => {
                self.consume_while(|c| c.is_ascii_digit());
                self.emit(index, start);
            }
            Some(c) if is_ident_start(c) => {
                self.consume_while(is_ident_continue);
                self.emit_checked_ident(ident, start);
            }
            _ => self.fail("expected identifier or index after '.'".to_string()),
        }
    }

    fn emit_checked_ident(&mut self, kind: TokenKind, start: usize) {
        let len = self.pos - start;
        if len > self.limits.max_identifier_length {
            self.fail(format!(
                "identifier too long: {} bytes (max: {} bytes)",
                len, self.limits.max_identifier_length
            ));
            return;
        }
        self.emit(kind, start);
    }

    // Words: commands (directly after '{'), word operators, literals, identifiers
    fn lex_word(&mut self, after_delim: bool) {
        let source = self.source;
        let start = self.pos;
        self.consume_while(is_ident_continue);
        let word = &source[start..self.pos];

        if after_delim {
            if let Some(kind) = command_kind(word) {
                self.emit(kind, start);
                if kind == TokenKind::Css {
                    self.lex_css_body();
                }
                return;
            }
        }

        let kind = match word {
            "null" => TokenKind::Null,
            "true" | "false" => TokenKind::Bool,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => TokenKind::Ident,
        };
        self.emit_checked_ident(kind, start);
    }

    fn lex_end_command(&mut self, start: usize) {
        let source = self.source;
        let word_start = self.pos;
        self.consume_while(is_ident_continue);
        let kind = match &source[word_start..self.pos] {
            "template" => TokenKind::TemplateEnd,
            "if" => TokenKind::IfEnd,
            "for" => TokenKind::ForEnd,
            "foreach" => TokenKind::ForeachEnd,
            "switch" => TokenKind::SwitchEnd,
            "call" => TokenKind::CallEnd,
            "param" => TokenKind::ParamEnd,
            "let" => TokenKind::LetEnd,
            "msg" => TokenKind::MsgEnd,
            "log" => TokenKind::LogEnd,
            "literal" => TokenKind::LiteralEnd,
            other => {
                self.fail(format!("unknown closing tag {{/{}}}", other));
                return;
            }
        };
        self.emit(kind, start);
    }

    // {css ...}: everything up to '}' is one text token
    fn lex_css_body(&mut self) {
        match self.rest().find('}') {
            Some(end) => {
                let start = self.pos;
                self.pos += end;
                self.emit_text(start);
            }
            None => self.fail("unclosed css tag".to_string()),
        }
    }

    // {literal}...{/literal}: the body is one verbatim text token
    fn lex_literal_body(&mut self) {
        const CLOSE: &str = "{/literal}";
        match self.rest().find(CLOSE) {
            Some(end) => {
                let start = self.pos;
                self.pos += end;
                self.emit(TokenKind::Text, start);
                let delim = self.pos;
                self.consume_char();
                self.emit(TokenKind::LeftDelim, delim);
                self.mode = Mode::Tag { after_delim: true };
            }
            None => self.fail("unclosed {literal} block".to_string()),
        }
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let rest = self.rest();

        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.pos += 2;
            if !self.consume_while(|c| c.is_ascii_hexdigit()) {
                self.fail("hex number must have at least one digit".to_string());
                return;
            }
            self.emit(TokenKind::Integer, start);
            return;
        }

        self.consume_while(|c| c.is_ascii_digit());
        let mut kind = TokenKind::Integer;

        if self.peek_char() == Some('.') && self.peek_char2().is_some_and(|c| c.is_ascii_digit()) {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
            kind = TokenKind::Float;
        }

        if let Some('e' | 'E') = self.peek_char() {
            let mut lookahead = self.rest()[1..].chars();
            let mut next = lookahead.next();
            if let Some('+' | '-') = next {
                next = lookahead.next();
            }
            if next.is_some_and(|c| c.is_ascii_digit()) {
                self.consume_char();
                if let Some('+' | '-') = self.peek_char() {
                    self.consume_char();
                }
                self.consume_while(|c| c.is_ascii_digit());
                kind = TokenKind::Float;
            }
        }

        self.emit(kind, start);
    }

    // Strings keep their quotes; the parser unquotes them
    fn lex_string(&mut self) {
        let start = self.pos;
        let quote = match self.consume_char() {
            Some(q) => q,
            None => return,
        };

        loop {
            match self.peek_char() {
                None => {
                    self.fail("unterminated string literal".to_string());
                    return;
                }
                Some('\n') => {
                    self.fail("newline in string literal".to_string());
                    return;
                }
                Some('\\') => {
                    self.consume_char();
                    if self.consume_char().is_none() {
                        self.fail("unterminated escape sequence".to_string());
                        return;
                    }
                }
                Some(c) if c == quote => {
                    self.consume_char();
                    break;
                }
                Some(_) => {
                    self.consume_char();
                }
            }
        }

        let len = self.pos - start;
        if len > self.limits.max_string_length {
            self.fail(format!(
                "string literal too long: {} bytes (max: {} bytes)",
                len, self.limits.max_string_length
            ));
            return;
        }
        self.emit(TokenKind::String, start);
    }
}

// Helper functions

fn command_kind(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "namespace" => TokenKind::Namespace,
        "template" => TokenKind::Template,
        "if" => TokenKind::If,
        "elseif" => TokenKind::Elseif,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "foreach" => TokenKind::Foreach,
        "ifempty" => TokenKind::Ifempty,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "call" => TokenKind::Call,
        "param" => TokenKind::Param,
        "let" => TokenKind::Let,
        "msg" => TokenKind::Msg,
        "css" => TokenKind::Css,
        "log" => TokenKind::Log,
        "debugger" => TokenKind::Debugger,
        "literal" => TokenKind::Literal,
        "alias" => TokenKind::Alias,
        "print" => TokenKind::Print,
        "sp" => TokenKind::Space,
        "nil" => TokenKind::Nil,
        "lb" => TokenKind::LeftBrace,
        "rb" => TokenKind::RightBrace,
        _ => return None,
    };
    Some(kind)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// Public API

/// Tokenize a template file
pub fn lex(source: &str, limits: &ParserLimits) -> Tokens {
    Lexer::new(source, limits).tokenize()
}

/// Tokenize a bare expression, as found in quoted attribute values
pub fn lex_expr(source: &str, limits: &ParserLimits) -> Tokens {
    Lexer::new_expr(source, limits).tokenize()
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let limits = ParserLimits::default();
        lex(source, &limits).list.iter().map(|t| t.kind).collect()
    }

    fn expr_kinds(source: &str) -> Vec<TokenKind> {
        let limits = ParserLimits::default();
        lex_expr(source, &limits).list.iter().map(|t| t.kind).collect()
    }

    fn texts(source: &str) -> Vec<std::string::String> {
        let limits = ParserLimits::default();
        lex(source, &limits).list.into_iter().map(|t| t.text).collect()
    }

    use TokenKind::*;

    #[test]
    fn test_plain_text() {
        assert_eq!(kinds("hello world"), vec![Text, Eof]);
        assert_eq!(kinds(""), vec![Eof]);
    }

    #[test]
    fn test_commands_after_delimiter() {
        assert_eq!(
            kinds("{namespace a.b}"),
            vec![LeftDelim, Namespace, Ident, DotIdent, RightDelim, Eof]
        );
        assert_eq!(
            kinds("{template .foo}x{/template}"),
            vec![
                LeftDelim, Template, DotIdent, RightDelim, Text, LeftDelim, TemplateEnd,
                RightDelim, Eof
            ]
        );
    }

    #[test]
    fn test_command_words_are_identifiers_elsewhere() {
        // "if" after a value is just an identifier
        assert_eq!(kinds("{$a if}"), vec![LeftDelim, DollarIdent, Ident, RightDelim, Eof]);
        // outside tags it is text
        assert_eq!(kinds("else"), vec![Text, Eof]);
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(
            kinds("{sp}{nil}{\\n}{lb}{rb}"),
            vec![
                LeftDelim, Space, RightDelim, LeftDelim, Nil, RightDelim, LeftDelim, Newline,
                RightDelim, LeftDelim, LeftBrace, RightDelim, LeftDelim, RightBrace, RightDelim,
                Eof
            ]
        );
    }

    #[test]
    fn test_data_ref_accessors() {
        assert_eq!(
            expr_kinds("$a.b?.c.0?.1[$i]?['k']"),
            vec![
                DollarIdent,
                DotIdent,
                QuestionDotIdent,
                DotIndex,
                QuestionDotIndex,
                LeftBracket,
                DollarIdent,
                RightBracket,
                QuestionKey,
                String,
                RightBracket,
                Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            expr_kinds("1 * 2 / 3 % 4 + 5 - 6 == 7 != 8 > 9 >= 1 < 2 <= 3"),
            vec![
                Integer, Mul, Integer, Div, Integer, Mod, Integer, Add, Integer, Sub, Integer, Eq,
                Integer, NotEq, Integer, Gt, Integer, Gte, Integer, Lt, Integer, Lte, Integer, Eof
            ]
        );
        assert_eq!(
            expr_kinds("not $a and $b or $c ?: $d ? 1 : 2"),
            vec![
                Not, DollarIdent, And, DollarIdent, Or, DollarIdent, Elvis, DollarIdent, TernIf,
                Integer, Colon, Integer, Eof
            ]
        );
    }

    #[test]
    fn test_negate_versus_subtract() {
        assert_eq!(expr_kinds("-1"), vec![Negate, Integer, Eof]);
        assert_eq!(expr_kinds("$a -1"), vec![DollarIdent, Sub, Integer, Eof]);
        assert_eq!(expr_kinds("2 * -1"), vec![Integer, Mul, Negate, Integer, Eof]);
        assert_eq!(expr_kinds("(1) - -1"), vec![LeftParen, Integer, RightParen, Sub, Negate, Integer, Eof]);
        assert_eq!(kinds("{-$x}"), vec![LeftDelim, Negate, DollarIdent, RightDelim, Eof]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(expr_kinds("42"), vec![Integer, Eof]);
        assert_eq!(expr_kinds("0xFF"), vec![Integer, Eof]);
        assert_eq!(expr_kinds("3.14"), vec![Float, Eof]);
        assert_eq!(expr_kinds("1e10"), vec![Float, Eof]);
        assert_eq!(expr_kinds("2.5e-3"), vec![Float, Eof]);
        assert!(expr_kinds("0x").contains(&Error));
    }

    #[test]
    fn test_strings_keep_quotes() {
        let limits = ParserLimits::default();
        let tokens = lex_expr(r#"'it\'s' "x""#, &limits);
        assert_eq!(tokens.get(0).kind, String);
        assert_eq!(tokens.get(0).text, r"'it\'s'");
        assert_eq!(tokens.get(1).text, "\"x\"");
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let limits = ParserLimits::default();
        let tokens = lex_expr("'abc", &limits);
        assert_eq!(tokens.get(0).kind, Error);
        assert_eq!(tokens.get(0).text, "unterminated string literal");
    }

    #[test]
    fn test_self_closing_tag() {
        assert_eq!(
            kinds("{let $x: 1/}"),
            vec![LeftDelim, Let, DollarIdent, Colon, Integer, RightDelimEnd, Eof]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(kinds("a // note\nb"), vec![Text, Comment, Text, Eof]);
        assert_eq!(kinds("// note"), vec![Comment, Eof]);
        assert_eq!(kinds("a /* note */ b"), vec![Text, Comment, Text, Eof]);
        // not preceded by whitespace: part of the text
        assert_eq!(kinds("http://example.com"), vec![Text, Eof]);
    }

    #[test]
    fn test_unclosed_comment_is_error() {
        assert_eq!(kinds("/* open"), vec![Error]);
    }

    #[test]
    fn test_soydoc() {
        assert_eq!(
            kinds("/**\n * @param name The name.\n * @param? title\n */"),
            vec![
                SoyDocStart, Text, SoyDocParam, Ident, Text, SoyDocOptionalParam, Ident, Text,
                SoyDocEnd, Eof
            ]
        );
    }

    #[test]
    fn test_css_body_is_text() {
        assert_eq!(
            texts("{css $x, suffix}"),
            vec!["{", "css", " $x, suffix", "}", ""]
        );
    }

    #[test]
    fn test_literal_body_is_verbatim() {
        assert_eq!(
            kinds("{literal}{if}//x{/literal}"),
            vec![LeftDelim, Literal, RightDelim, Text, LeftDelim, LiteralEnd, RightDelim, Eof]
        );
        assert_eq!(texts("{literal}{if}{/literal}")[3], "{if}");
    }

    #[test]
    fn test_unknown_closing_tag() {
        let limits = ParserLimits::default();
        let tokens = lex("{/bogus}", &limits);
        let last = tokens.get(usize::MAX);
        assert_eq!(last.kind, Error);
        assert_eq!(last.text, "unknown closing tag {/bogus}");
    }

    #[test]
    fn test_unclosed_tag() {
        assert_eq!(kinds("{if $x"), vec![LeftDelim, If, DollarIdent, Error]);
    }

    #[test]
    fn test_token_limit() {
        let limits = ParserLimits {
            max_token_count: 3,
            ..ParserLimits::default()
        };
        let tokens = lex("{$a}{$b}", &limits);
        assert_eq!(tokens.get(usize::MAX).kind, Error);
        assert!(tokens.get(usize::MAX).text.starts_with("token limit exceeded"));
    }

    #[test]
    fn test_input_size_limit() {
        let limits = ParserLimits {
            max_input_size: 4,
            ..ParserLimits::default()
        };
        assert_eq!(lex("hello", &limits).list.len(), 1);
        assert_eq!(lex("hello", &limits).get(0).kind, Error);
    }

    #[test]
    fn test_tokens_always_end_in_a_terminal_token() {
        let empty = Tokens::new(Vec::new());
        assert_eq!(empty.len(), 1);
        assert_eq!(empty.get(0).kind, Eof);
        assert_eq!(empty.get(5).kind, Eof);

        let text = Token {
            kind: Text,
            pos: 0,
            text: "abc".to_string(),
        };
        let tokens = Tokens::new(vec![text]);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.get(1).kind, Eof);
        assert_eq!(tokens.get(1).pos, 3);

        // an already terminated list is left alone
        let limits = ParserLimits::default();
        assert_eq!(Tokens::new(lex("a", &limits).list).len(), 2);
    }

    #[test]
    fn test_positions() {
        let limits = ParserLimits::default();
        let tokens = lex("ab{$x}", &limits);
        assert_eq!(tokens.get(1).pos, 2);
        assert_eq!(tokens.get(2).pos, 3);
    }

    #[test]
    fn test_line_col() {
        let source = "ab\ncd\nef";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 1), (1, 2));
        assert_eq!(line_col(source, 3), (2, 1));
        assert_eq!(line_col(source, 7), (3, 2));
    }
}
