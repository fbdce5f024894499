use tracing::trace;

use super::error::{ErrorKind, ParseError};
use super::helpers::{all_space, rawtext};
use super::Parser;
use crate::ast::{
    CallNode, CallParam, CallParamContentNode, CallParamValueNode, CssNode, DebuggerNode, Expr,
    ForNode, IfCond, IfNode, LetContentNode, LetValueNode, ListNode, LogNode, LoopKind, MsgNode,
    NamespaceNode, Node, PrintDirective, PrintNode, RawTextNode, SoyDocNode, SoyDocParam,
    SwitchCase, SwitchNode, TemplateNode,
};
use crate::lexer::{Token, TokenKind};

/// Outcome of reading one item of a body
enum Item {
    Node(Node),
    Skip, // consumed something that produces no node (alias, blank text)
    Halt, // reached one of the terminators
}

fn special_char(kind: TokenKind) -> Option<&'static str> {
    let text = match kind {
        TokenKind::Nil => "",
        TokenKind::Space => " ",
        TokenKind::Tab => "\t",
        TokenKind::Newline => "\n",
        TokenKind::CarriageReturn => "\r",
        TokenKind::LeftBrace => "{",
        TokenKind::RightBrace => "}",
        _ => return None,
    };
    Some(text)
}

// Recursive statement parsing methods
impl<'a> Parser<'a> {
    /// Parse text and tags until one of `until` is reached
    ///
    /// A terminator matches either as a bare token (EOF) or as the command
    /// directly after a `{`, so `{else}` ends a body but the text "else"
    /// does not. The terminating command is left consumed.
    pub(super) fn item_list(&mut self, depth: usize, until: &[TokenKind]) -> Result<ListNode, ParseError> {
        self.check_depth(depth)?;
        let mut list = ListNode {
            pos: self.peek().pos,
            nodes: Vec::new(),
        };
        loop {
            let token = self.next();
            match self.text_or_tag(depth + 1, token, until)? {
                Item::Node(node) => list.nodes.push(node),
                Item::Skip => {}
                Item::Halt => return Ok(list),
            }
        }
    }

    fn text_or_tag(&mut self, depth: usize, mut token: Token, until: &[TokenKind]) -> Result<Item, ParseError> {
        let seen_comment = token.kind == TokenKind::Comment;
        while token.kind == TokenKind::Comment {
            token = self.next();
        }

        if until.contains(&token.kind) {
            return Ok(Item::Halt);
        }
        let token2 = self.next();
        if token.kind == TokenKind::LeftDelim && until.contains(&token2.kind) {
            return Ok(Item::Halt);
        }
        self.backup();

        match token.kind {
            TokenKind::Text => Ok(self.parse_text(token, seen_comment)),
            TokenKind::LeftDelim => self.begin_tag(depth + 1),
            TokenKind::SoyDocStart => Ok(Item::Node(self.parse_soydoc(token)?)),
            _ => Err(ParseError::unexpected_token(&token, "input")),
        }
    }

    /// Join a text run across interleaved comments, then normalize it
    ///
    /// Spaces and tabs on either side of a comment inside the run are
    /// dropped; line breaks stay so that `rawtext` can join the lines.
    fn parse_text(&mut self, first: Token, seen_comment: bool) -> Item {
        let mut text = first.text;
        let mut comment_after = false;
        loop {
            let next = self.next();
            match next.kind {
                TokenKind::Text => {
                    let chunk = if comment_after {
                        next.text.trim_start_matches([' ', '\t'])
                    } else {
                        next.text.as_str()
                    };
                    text.push_str(chunk);
                    comment_after = false;
                }
                TokenKind::Comment => {
                    text.truncate(text.trim_end_matches([' ', '\t']).len());
                    comment_after = true;
                }
                _ => {
                    self.backup();
                    break;
                }
            }
        }

        let value = rawtext(&text, seen_comment, comment_after);
        if value.is_empty() {
            return Item::Skip;
        }
        Item::Node(Node::RawText(RawTextNode {
            pos: first.pos,
            text: value,
        }))
    }

    /// Parse the contents of a tag; `{` has been read
    ///
    /// Each frame between two nested bodies costs one level, so a nested
    /// tag is charged about four: item list, text-or-tag, this dispatch and
    /// the tag's own procedure.
    fn begin_tag(&mut self, depth: usize) -> Result<Item, ParseError> {
        self.check_depth(depth)?;
        let depth = depth + 1;
        let token = self.next();
        let node = match token.kind {
            TokenKind::Namespace => self.parse_namespace(token)?,
            TokenKind::Template => self.parse_template(depth, token)?,
            TokenKind::If => self.parse_if(depth, token)?,
            TokenKind::Msg => self.parse_msg(depth, token)?,
            TokenKind::For | TokenKind::Foreach => self.parse_for(depth, token)?,
            TokenKind::Switch => self.parse_switch(depth, token)?,
            TokenKind::Call => self.parse_call(depth, token)?,
            TokenKind::Let => self.parse_let(depth, token)?,
            TokenKind::Css => self.parse_css(depth, token)?,
            TokenKind::Literal => {
                self.expect(TokenKind::RightDelim, "literal")?;
                let body = self.expect(TokenKind::Text, "literal")?;
                self.expect(TokenKind::LeftDelim, "literal")?;
                self.expect(TokenKind::LiteralEnd, "literal")?;
                self.expect(TokenKind::RightDelim, "literal")?;
                Node::RawText(RawTextNode {
                    pos: body.pos,
                    text: body.text,
                })
            }
            TokenKind::Log => {
                self.expect(TokenKind::RightDelim, "log")?;
                let body = self.item_list(depth + 1, &[TokenKind::LogEnd])?;
                self.expect(TokenKind::RightDelim, "log")?;
                Node::Log(LogNode {
                    pos: token.pos,
                    body,
                })
            }
            TokenKind::Debugger => {
                self.expect(TokenKind::RightDelim, "debugger")?;
                Node::Debugger(DebuggerNode { pos: token.pos })
            }
            TokenKind::Alias => {
                self.parse_alias()?;
                return Ok(Item::Skip);
            }
            TokenKind::Print => self.parse_print(depth, token)?,
            // print is implicit, so a tag may start with any value or unary operator
            TokenKind::Ident
            | TokenKind::DollarIdent
            | TokenKind::Null
            | TokenKind::Bool
            | TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::Negate
            | TokenKind::Not
            | TokenKind::LeftBracket
            | TokenKind::LeftParen => {
                self.backup();
                self.parse_print(depth, token)?
            }
            kind => match special_char(kind) {
                Some(text) => {
                    self.expect(TokenKind::RightDelim, "special char")?;
                    Node::RawText(RawTextNode {
                        pos: token.pos,
                        text: text.to_string(),
                    })
                }
                None => return Err(ParseError::unexpected_token(&token, "tag")),
            },
        };
        Ok(Item::Node(node))
    }

    // The print keyword has been read, or backed up over when implicit
    fn parse_print(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let arg = self.parse_expr(depth + 1, 0)?;
        let mut directives = Vec::new();
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::RightDelim => {
                    return Ok(Node::Print(PrintNode {
                        pos: token.pos,
                        arg,
                        directives,
                    }));
                }
                TokenKind::Pipe => {
                    let name = self.expect(TokenKind::Ident, "print directive")?;
                    // first argument follows ':', the rest follow ','
                    let mut args = Vec::new();
                    loop {
                        let next = self.next();
                        if !matches!(next.kind, TokenKind::Colon | TokenKind::Comma) {
                            self.backup();
                            break;
                        }
                        args.push(self.parse_expr(depth + 1, 0)?);
                    }
                    directives.push(PrintDirective {
                        pos: tok.pos,
                        name: name.text,
                        args,
                    });
                }
                _ => {
                    return Err(ParseError::unexpected_token(
                        &tok,
                        "print. (expected '|' or '}')",
                    ));
                }
            }
        }
    }

    /// Register an alias; it applies to calls parsed after it
    fn parse_alias(&mut self) -> Result<(), ParseError> {
        let first = self.expect(TokenKind::Ident, "alias")?;
        let mut last_segment = first.text.clone();
        let mut name = first.text;
        loop {
            let next = self.next();
            match next.kind {
                TokenKind::DotIdent => {
                    name.push_str(&next.text);
                    last_segment = next.text[1..].to_string();
                }
                TokenKind::RightDelim => {
                    trace!(alias = %last_segment, target = %name, "registered alias");
                    self.aliases.insert(last_segment, name);
                    return Ok(());
                }
                _ => return Err(ParseError::unexpected_token(&next, "alias. (expected '}')")),
            }
        }
    }

    fn parse_let(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let var = self.expect(TokenKind::DollarIdent, "let")?;
        let name = var.text[1..].to_string();
        let next = self.next();
        match next.kind {
            TokenKind::Colon => {
                let value = self.parse_expr(depth + 1, 0)?;
                self.expect(TokenKind::RightDelimEnd, "let")?;
                Ok(Node::LetValue(LetValueNode {
                    pos: token.pos,
                    name,
                    value,
                }))
            }
            TokenKind::RightDelim => {
                let body = self.item_list(depth + 1, &[TokenKind::LetEnd])?;
                self.expect(TokenKind::RightDelim, "let")?;
                Ok(Node::LetContent(LetContentNode {
                    pos: token.pos,
                    name,
                    body,
                }))
            }
            _ => Err(ParseError::unexpected_token(&next, "{let}")),
        }
    }

    // {css [expr,] suffix}; the expression ends at the last comma
    fn parse_css(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let command = self.expect(TokenKind::Text, "css")?;
        self.expect(TokenKind::RightDelim, "css")?;
        let (expr, suffix) = match command.text.rfind(',') {
            None => (None, command.text.trim()),
            Some(comma) => {
                let expr_text = command.text[..comma].trim();
                let expr = self.parse_quoted_expr(expr_text, command.pos, depth + 1)?;
                (Some(expr), command.text[comma + 1..].trim())
            }
        };
        Ok(Node::Css(CssNode {
            pos: token.pos,
            expr,
            suffix: suffix.to_string(),
        }))
    }

    fn parse_call(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        // the name is written as `.local`, `fully.qualified`, or a name="" attribute
        let mut name = String::new();
        let tok = self.next();
        match tok.kind {
            TokenKind::DotIdent => name = tok.text,
            TokenKind::Ident => {
                let tok2 = self.next();
                if tok2.kind == TokenKind::DotIdent {
                    name = tok.text + &tok2.text;
                    loop {
                        let part = self.next();
                        if part.kind != TokenKind::DotIdent {
                            self.backup();
                            break;
                        }
                        name.push_str(&part.text);
                    }
                } else {
                    self.backup2();
                }
            }
            _ => self.backup(),
        }

        let attrs = self.parse_attrs(&["name", "data"])?;
        if name.is_empty() {
            if let Some(attr) = attrs.get("name") {
                name = attr.value.clone();
            }
        }
        if name.is_empty() {
            return Err(self.error(
                ErrorKind::Semantic,
                "call: template name not found".to_string(),
            ));
        }
        let name = self.resolve_template_name(name);

        let mut all_data = false;
        let mut data = None;
        if let Some(attr) = attrs.get("data") {
            if attr.value == "all" {
                all_data = true;
            } else {
                data = Some(self.parse_quoted_expr(&attr.value, attr.pos, depth + 1)?);
            }
        }

        let tok = self.next();
        let params = match tok.kind {
            TokenKind::RightDelimEnd => Vec::new(),
            TokenKind::RightDelim => {
                let params = self.parse_call_params(depth + 1)?;
                self.expect(TokenKind::LeftDelim, "call")?;
                self.expect(TokenKind::CallEnd, "call")?;
                self.expect(TokenKind::RightDelim, "call")?;
                params
            }
            _ => return Err(ParseError::unexpected_token(&tok, "call")),
        };

        Ok(Node::Call(CallNode {
            pos: token.pos,
            name,
            all_data,
            data,
            params,
        }))
    }

    // `.name` is relative to the namespace; `alias.rest` expands the alias
    fn resolve_template_name(&self, name: String) -> String {
        if name.starts_with('.') {
            return format!("{}{}", self.namespace, name);
        }
        if let Some(dot) = name.find('.') {
            if let Some(target) = self.aliases.get(&name[..dot]) {
                return format!("{}{}", target, &name[dot..]);
            }
        }
        name
    }

    /// Collect params up to `{/call}`, which is left unread
    ///
    /// Accepted forms:
    ///   {param a: expr /}
    ///   {param a}content{/param}
    ///   {param key="a" value="expr" /}
    ///   {param key="a"}content{/param}
    fn parse_call_params(&mut self, depth: usize) -> Result<Vec<CallParam>, ParseError> {
        self.check_depth(depth)?;
        let mut params = Vec::new();
        loop {
            let mut initial = self.next_non_comment();
            while initial.kind == TokenKind::Text {
                // only whitespace may sit between params
                if !rawtext(&initial.text, true, true).is_empty() {
                    return Err(ParseError::unexpected_token(
                        &initial,
                        "{call}, in between {param}'s (orphan content)",
                    ));
                }
                initial = self.next_non_comment();
            }
            if initial.kind != TokenKind::LeftDelim {
                return Err(ParseError::unexpected_token(&initial, "param list (expected '{')"));
            }

            let cmd = self.next();
            if cmd.kind == TokenKind::CallEnd {
                self.backup2();
                return Ok(params);
            }
            if cmd.kind != TokenKind::Param {
                return Err(ParseError::unexpected_token(&cmd, "call (expected param declaration)"));
            }

            let first = self.expect(TokenKind::Ident, "param")?;
            let mut key = None;
            let tok = self.next();
            match tok.kind {
                TokenKind::Colon => {
                    let value = self.parse_expr(depth + 1, 0)?;
                    self.expect(TokenKind::RightDelimEnd, "param")?;
                    params.push(CallParam::Value(CallParamValueNode {
                        pos: initial.pos,
                        key: first.text,
                        value,
                    }));
                    continue;
                }
                TokenKind::RightDelim => {
                    let body = self.item_list(depth + 1, &[TokenKind::ParamEnd])?;
                    self.expect(TokenKind::RightDelim, "param")?;
                    params.push(CallParam::Content(CallParamContentNode {
                        pos: initial.pos,
                        key: first.text,
                        kind: None,
                        body,
                    }));
                    continue;
                }
                // {param a kind="..."}
                TokenKind::Ident => {
                    key = Some(first.text);
                    self.backup();
                }
                // {param key="a" ...}
                TokenKind::Equals => self.backup2(),
                _ => {
                    return Err(ParseError::unexpected_token(
                        &tok,
                        "param. (expected ':', '}', or '=')",
                    ));
                }
            }

            let attrs = self.parse_attrs(&["key", "value", "kind"])?;
            let key = match key.or_else(|| attrs.get("key").map(|a| a.value.clone())) {
                Some(key) => key,
                None => {
                    return Err(self.error(ErrorKind::Semantic, "param key not found".to_string()));
                }
            };
            match attrs.get("value") {
                None => {
                    self.expect(TokenKind::RightDelim, "param")?;
                    let body = self.item_list(depth + 1, &[TokenKind::ParamEnd])?;
                    self.expect(TokenKind::RightDelim, "param")?;
                    params.push(CallParam::Content(CallParamContentNode {
                        pos: initial.pos,
                        key,
                        kind: attrs.get("kind").map(|a| a.value.clone()),
                        body,
                    }));
                }
                Some(attr) => {
                    let value = self.parse_quoted_expr(&attr.value, attr.pos, depth + 1)?;
                    self.expect(TokenKind::RightDelimEnd, "param")?;
                    params.push(CallParam::Value(CallParamValueNode {
                        pos: initial.pos,
                        key,
                        value,
                    }));
                }
            }
        }
    }

    fn parse_switch(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let value = self.parse_expr(depth + 1, 0)?;
        self.expect(TokenKind::RightDelim, "switch")?;

        let mut cases = Vec::new();
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::LeftDelim | TokenKind::Comment => {}
                TokenKind::Text if all_space(&tok.text) => {}
                TokenKind::Case | TokenKind::Default => {
                    cases.push(self.parse_case(depth + 1, tok)?);
                }
                TokenKind::SwitchEnd => {
                    self.expect(TokenKind::RightDelim, "switch")?;
                    return Ok(Node::Switch(SwitchNode {
                        pos: token.pos,
                        value,
                        cases,
                    }));
                }
                _ => return Err(ParseError::unexpected_token(&tok, "between switch cases")),
            }
        }
    }

    // "case" or "default" has been read; the next clause's command is left unread
    fn parse_case(&mut self, depth: usize, token: Token) -> Result<SwitchCase, ParseError> {
        self.check_depth(depth)?;
        let mut values = Vec::new();
        if token.kind == TokenKind::Case {
            loop {
                values.push(self.parse_expr(depth + 1, 0)?);
                if self.peek().kind != TokenKind::Comma {
                    break;
                }
                self.next();
            }
        }
        self.expect(TokenKind::RightDelim, "switch case")?;

        let body = self.item_list(
            depth + 1,
            &[TokenKind::Case, TokenKind::Default, TokenKind::SwitchEnd],
        )?;
        self.backup();
        Ok(SwitchCase {
            pos: token.pos,
            values,
            body,
        })
    }

    // "for" or "foreach" has been read
    fn parse_for(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let (kind, closing) = match token.kind {
            TokenKind::For => (LoopKind::For, TokenKind::ForEnd),
            _ => (LoopKind::Foreach, TokenKind::ForeachEnd),
        };
        let ctx = token.text.as_str();

        let var = self.expect(TokenKind::DollarIdent, ctx)?;
        let in_token = self.expect(TokenKind::Ident, ctx)?;
        if in_token.text != "in" {
            return Err(ParseError::unexpected_token(&in_token, "for loop (expected 'in')"));
        }

        let collection = self.parse_expr(depth + 1, 0)?;
        self.expect(TokenKind::RightDelim, ctx)?;
        match kind {
            LoopKind::For => {
                if !matches!(&collection, Expr::Function { name, .. } if name == "range") {
                    return Err(ParseError::new(
                        ErrorKind::Semantic,
                        "for: expected to iterate through range()".to_string(),
                        collection.pos(),
                    ));
                }
            }
            LoopKind::Foreach => {
                if !matches!(collection, Expr::DataRef { .. }) {
                    return Err(ParseError::new(
                        ErrorKind::Semantic,
                        "foreach: expected to iterate through a variable".to_string(),
                        collection.pos(),
                    ));
                }
            }
        }

        let body = self.item_list(depth + 1, &[TokenKind::Ifempty, closing])?;
        self.backup();
        let mut ifempty = None;
        if self.next().kind == TokenKind::Ifempty {
            self.expect(TokenKind::RightDelim, "ifempty")?;
            ifempty = Some(self.item_list(depth + 1, &[closing])?);
        }
        self.expect(TokenKind::RightDelim, ctx)?;

        Ok(Node::For(ForNode {
            pos: token.pos,
            kind,
            var: var.text[1..].to_string(),
            collection,
            body,
            ifempty,
        }))
    }

    // Each arm records the position of its own keyword; only {/if} may follow {else}
    fn parse_if(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let if_pos = token.pos;
        let mut conds = Vec::new();
        let mut arm = token;
        loop {
            let is_else = arm.kind == TokenKind::Else;
            let cond = if is_else {
                None
            } else {
                Some(self.parse_expr(depth + 1, 0)?)
            };
            self.expect(TokenKind::RightDelim, "if")?;

            let until: &[TokenKind] = if is_else {
                &[TokenKind::IfEnd]
            } else {
                &[TokenKind::Elseif, TokenKind::Else, TokenKind::IfEnd]
            };
            let body = self.item_list(depth + 1, until)?;
            conds.push(IfCond {
                pos: arm.pos,
                cond,
                body,
            });

            self.backup();
            let next = self.next();
            if next.kind == TokenKind::IfEnd {
                self.expect(TokenKind::RightDelim, "/if")?;
                return Ok(Node::If(IfNode { pos: if_pos, conds }));
            }
            arm = next;
        }
    }

    // "/**" has been read
    fn parse_soydoc(&mut self, token: Token) -> Result<Node, ParseError> {
        let mut params = Vec::new();
        loop {
            let next = self.next();
            match next.kind {
                TokenKind::Text => {}
                TokenKind::SoyDocParam | TokenKind::SoyDocOptionalParam => {
                    let ident = self.expect(TokenKind::Ident, "soydoc param")?;
                    params.push(SoyDocParam {
                        pos: next.pos,
                        name: ident.text,
                        optional: next.kind == TokenKind::SoyDocOptionalParam,
                    });
                }
                TokenKind::SoyDocEnd => {
                    return Ok(Node::SoyDoc(SoyDocNode {
                        pos: token.pos,
                        params,
                    }));
                }
                _ => return Err(ParseError::unexpected_token(&next, "soydoc")),
            }
        }
    }

    fn parse_msg(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let attrs = self.parse_attrs(&["desc", "meaning", "hidden"])?;
        let Some(desc) = attrs.get("desc").map(|a| a.value.clone()) else {
            return Err(ParseError::new(
                ErrorKind::Semantic,
                "Tag 'msg' must have a 'desc' attribute".to_string(),
                token.pos,
            ));
        };
        let meaning = attrs.get("meaning").map(|a| a.value.clone());
        let hidden = self.bool_attr(&attrs, "hidden", false)?;

        self.expect(TokenKind::RightDelim, "msg")?;
        let body = self.item_list(depth + 1, &[TokenKind::MsgEnd])?;
        self.expect(TokenKind::RightDelim, "msg")?;
        Ok(Node::Msg(MsgNode {
            pos: token.pos,
            desc,
            meaning,
            hidden,
            body,
        }))
    }

    fn parse_namespace(&mut self, token: Token) -> Result<Node, ParseError> {
        if !self.namespace.is_empty() {
            return Err(ParseError::new(
                ErrorKind::Semantic,
                "file may have only one namespace declaration".to_string(),
                token.pos,
            ));
        }

        let mut name = self.expect(TokenKind::Ident, "namespace")?.text;
        loop {
            let part = self.next();
            if part.kind != TokenKind::DotIdent {
                self.backup();
                break;
            }
            name.push_str(&part.text);
        }
        let attrs = self.parse_attrs(&["autoescape"])?;
        let autoescape = self.parse_autoescape(&attrs)?;
        self.expect(TokenKind::RightDelim, "namespace")?;

        trace!(namespace = %name, "declared namespace");
        self.namespace = name.clone();
        Ok(Node::Namespace(NamespaceNode {
            pos: token.pos,
            name,
            autoescape,
        }))
    }

    fn parse_template(&mut self, depth: usize, token: Token) -> Result<Node, ParseError> {
        let id = self.expect(TokenKind::DotIdent, "template tag")?;
        let attrs = self.parse_attrs(&["autoescape", "private"])?;
        let autoescape = self.parse_autoescape(&attrs)?;
        let private = self.bool_attr(&attrs, "private", false)?;
        self.expect(TokenKind::RightDelim, "template tag")?;

        let name = format!("{}{}", self.namespace, id.text);
        let body = self.item_list(depth + 1, &[TokenKind::TemplateEnd])?;
        self.expect(TokenKind::RightDelim, "template tag")?;
        Ok(Node::Template(TemplateNode {
            pos: token.pos,
            name,
            body,
            autoescape,
            private,
        }))
    }
}
