use indexmap::IndexMap;
use std::fmt::{self, Write};

use crate::value::{Value, format_float};

/// Byte offset of the token a node was built from
pub type Pos = usize;

/// A parsed template file
#[derive(Debug, Clone, PartialEq)]
pub struct SoyFile {
    pub name: String, // name given for diagnostics
    pub text: String, // the full source
    pub body: Vec<Node>,
}

/// An ordered body of statement nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListNode {
    pub pos: Pos,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Autoescape {
    #[default]
    Unspecified,
    Contextual,
    On,
    Off,
}

impl Autoescape {
    fn attr(self) -> Option<&'static str> {
        match self {
            Autoescape::Unspecified => None,
            Autoescape::Contextual => Some("contextual"),
            Autoescape::On => Some("true"),
            Autoescape::Off => Some("false"),
        }
    }
}

// Statement nodes

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    RawText(RawTextNode),
    Namespace(NamespaceNode),
    Template(TemplateNode),
    SoyDoc(SoyDocNode),
    Print(PrintNode),
    If(IfNode),
    For(ForNode),
    Switch(SwitchNode),
    Call(CallNode),
    LetValue(LetValueNode),
    LetContent(LetContentNode),
    Msg(MsgNode),
    Css(CssNode),
    Log(LogNode),
    Debugger(DebuggerNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTextNode {
    pub pos: Pos,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceNode {
    pub pos: Pos,
    pub name: String,
    pub autoescape: Autoescape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub pos: Pos,
    pub name: String, // fully qualified
    pub body: ListNode,
    pub autoescape: Autoescape,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoyDocNode {
    pub pos: Pos,
    pub params: Vec<SoyDocParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoyDocParam {
    pub pos: Pos,
    pub name: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintNode {
    pub pos: Pos,
    pub arg: Expr,
    pub directives: Vec<PrintDirective>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintDirective {
    pub pos: Pos,
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub pos: Pos,
    pub conds: Vec<IfCond>,
}

/// One arm of an if chain; the else arm has no condition
#[derive(Debug, Clone, PartialEq)]
pub struct IfCond {
    pub pos: Pos,
    pub cond: Option<Expr>,
    pub body: ListNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    For,     // iterates range(...)
    Foreach, // iterates a data reference
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub pos: Pos,
    pub kind: LoopKind,
    pub var: String,
    pub collection: Expr,
    pub body: ListNode,
    pub ifempty: Option<ListNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchNode {
    pub pos: Pos,
    pub value: Expr,
    pub cases: Vec<SwitchCase>,
}

/// A case clause; no values means {default}
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub pos: Pos,
    pub values: Vec<Expr>,
    pub body: ListNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    pub pos: Pos,
    pub name: String, // fully qualified
    pub all_data: bool,
    pub data: Option<Expr>,
    pub params: Vec<CallParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallParam {
    Value(CallParamValueNode),
    Content(CallParamContentNode),
}

impl CallParam {
    pub fn key(&self) -> &str {
        match self {
            CallParam::Value(p) => &p.key,
            CallParam::Content(p) => &p.key,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallParamValueNode {
    pub pos: Pos,
    pub key: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallParamContentNode {
    pub pos: Pos,
    pub key: String,
    pub kind: Option<String>,
    pub body: ListNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetValueNode {
    pub pos: Pos,
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetContentNode {
    pub pos: Pos,
    pub name: String,
    pub body: ListNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MsgNode {
    pub pos: Pos,
    pub desc: String,
    pub meaning: Option<String>,
    pub hidden: bool,
    pub body: ListNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CssNode {
    pub pos: Pos,
    pub expr: Option<Expr>,
    pub suffix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogNode {
    pub pos: Pos,
    pub body: ListNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebuggerNode {
    pub pos: Pos,
}

impl Node {
    pub fn pos(&self) -> Pos {
        match self {
            Node::RawText(n) => n.pos,
            Node::Namespace(n) => n.pos,
            Node::Template(n) => n.pos,
            Node::SoyDoc(n) => n.pos,
            Node::Print(n) => n.pos,
            Node::If(n) => n.pos,
            Node::For(n) => n.pos,
            Node::Switch(n) => n.pos,
            Node::Call(n) => n.pos,
            Node::LetValue(n) => n.pos,
            Node::LetContent(n) => n.pos,
            Node::Msg(n) => n.pos,
            Node::Css(n) => n.pos,
            Node::Log(n) => n.pos,
            Node::Debugger(n) => n.pos,
        }
    }
}

// Expression nodes

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
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
    Or,
    And,
    Elvis,
}

/// Binding power of not/negate; above every binary operator
pub const UNARY_PRECEDENCE: u8 = 6;

impl BinaryOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 5,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Gt
            | BinaryOp::Gte
            | BinaryOp::Lt
            | BinaryOp::Lte => 3,
            BinaryOp::Or => 2,
            BinaryOp::And => 1,
            BinaryOp::Elvis => 0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Elvis => "?:",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null {
        pos: Pos,
    },
    Bool {
        pos: Pos,
        value: bool,
    },
    Int {
        pos: Pos,
        value: i64,
    },
    Float {
        pos: Pos,
        value: f64,
    },
    Str {
        pos: Pos,
        value: String,
    },
    List {
        pos: Pos,
        items: Vec<Expr>,
    },
    Map {
        pos: Pos,
        entries: IndexMap<String, Expr>,
    },
    DataRef {
        pos: Pos,
        key: String, // root variable, without '$'
        access: Vec<Access>,
    },
    Global {
        pos: Pos,
        name: String,
        value: Value,
    },
    Function {
        pos: Pos,
        name: String,
        args: Vec<Expr>,
    },
    Not {
        pos: Pos,
        arg: Box<Expr>,
    },
    Negate {
        pos: Pos,
        arg: Box<Expr>,
    },
    Binary {
        pos: Pos,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        pos: Pos,
        cond: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
}

/// One step of a data reference chain
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Key {
        pos: Pos,
        null_safe: bool,
        key: String,
    },
    Index {
        pos: Pos,
        null_safe: bool,
        index: usize,
    },
    Expr {
        pos: Pos,
        null_safe: bool,
        expr: Expr,
    },
}

impl Access {
    pub fn null_safe(&self) -> bool {
        match self {
            Access::Key { null_safe, .. }
            | Access::Index { null_safe, .. }
            | Access::Expr { null_safe, .. } => *null_safe,
        }
    }
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::Null { pos }
            | Expr::Bool { pos, .. }
            | Expr::Int { pos, .. }
            | Expr::Float { pos, .. }
            | Expr::Str { pos, .. }
            | Expr::List { pos, .. }
            | Expr::Map { pos, .. }
            | Expr::DataRef { pos, .. }
            | Expr::Global { pos, .. }
            | Expr::Function { pos, .. }
            | Expr::Not { pos, .. }
            | Expr::Negate { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Ternary { pos, .. } => *pos,
        }
    }

    /// Short description of the expression's shape, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Null { .. } => "null",
            Expr::Bool { .. } => "bool",
            Expr::Int { .. } => "int",
            Expr::Float { .. } => "float",
            Expr::Str { .. } => "string",
            Expr::List { .. } => "list literal",
            Expr::Map { .. } => "map literal",
            Expr::DataRef { .. } => "data reference",
            Expr::Global { .. } => "global",
            Expr::Function { .. } => "function call",
            Expr::Not { .. } | Expr::Negate { .. } => "unary operator",
            Expr::Binary { .. } => "binary operator",
            Expr::Ternary { .. } => "ternary",
        }
    }

    // Ternary binds loosest, primaries tightest
    fn binding(&self) -> i8 {
        match self {
            Expr::Ternary { .. } => -1,
            Expr::Binary { op, .. } => op.precedence() as i8,
            Expr::Not { .. } | Expr::Negate { .. } => UNARY_PRECEDENCE as i8,
            _ => UNARY_PRECEDENCE as i8 + 1,
        }
    }
}

// Source printing
//
// Display renders Soy source that parses back into the same tree.

/// Quote a string as a single-quoted Soy string literal
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

// Attribute values are double-quoted and unquoted once before use
fn quote_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_operand(f: &mut fmt::Formatter, expr: &Expr, needs_parens: bool) -> fmt::Result {
    if needs_parens {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn write_args(f: &mut fmt::Formatter, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Null { .. } => write!(f, "null"),
            Expr::Bool { value, .. } => write!(f, "{}", value),
            Expr::Int { value, .. } => write!(f, "{}", value),
            Expr::Float { value, .. } => write!(f, "{}", format_float(*value)),
            Expr::Str { value, .. } => write!(f, "{}", quote_string(value)),
            Expr::List { items, .. } => {
                write!(f, "[")?;
                write_args(f, items)?;
                write!(f, "]")
            }
            Expr::Map { entries, .. } => {
                if entries.is_empty() {
                    return write!(f, "[:]");
                }
                write!(f, "[")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", quote_string(k), v)?;
                }
                write!(f, "]")
            }
            Expr::DataRef { key, access, .. } => {
                write!(f, "${}", key)?;
                for step in access {
                    let q = if step.null_safe() { "?" } else { "" };
                    match step {
                        Access::Key { key, .. } => write!(f, "{}.{}", q, key)?,
                        Access::Index { index, .. } => write!(f, "{}.{}", q, index)?,
                        Access::Expr { expr, .. } => write!(f, "{}[{}]", q, expr)?,
                    }
                }
                Ok(())
            }
            Expr::Global { name, .. } => write!(f, "{}", name),
            Expr::Function { name, args, .. } => {
                write!(f, "{}(", name)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Not { arg, .. } => {
                write!(f, "not ")?;
                write_operand(f, arg, arg.binding() < UNARY_PRECEDENCE as i8)
            }
            Expr::Negate { arg, .. } => {
                write!(f, "-")?;
                write_operand(f, arg, arg.binding() < UNARY_PRECEDENCE as i8)
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let prec = op.precedence() as i8;
                write_operand(f, left, left.binding() < prec)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, right.binding() <= prec)
            }
            Expr::Ternary {
                cond,
                if_true,
                if_false,
                ..
            } => {
                write_operand(f, cond, cond.binding() < 0)?;
                write!(f, " ? ")?;
                write_operand(f, if_true, if_true.binding() < 0)?;
                write!(f, " : ")?;
                write_operand(f, if_false, if_false.binding() < 0)
            }
        }
    }
}

// Text that can be written as-is without the lexer or the whitespace
// normalization changing it
fn is_plain_text(text: &str) -> bool {
    !text.is_empty()
        && !text.contains(['{', '}', '\n', '\r'])
        && !text.contains("//")
        && !text.contains("/*")
}

fn write_raw_text(f: &mut fmt::Formatter, text: &str, after_text: bool) -> fmt::Result {
    match text {
        "" => return write!(f, "{{nil}}"),
        " " => return write!(f, "{{sp}}"),
        "\n" => return write!(f, "{{\\n}}"),
        "\r" => return write!(f, "{{\\r}}"),
        "\t" => return write!(f, "{{\\t}}"),
        "{" => return write!(f, "{{lb}}"),
        "}" => return write!(f, "{{rb}}"),
        _ => {}
    }
    if is_plain_text(text) && !after_text {
        write!(f, "{}", text)
    } else {
        write!(f, "{{literal}}{}{{/literal}}", text)
    }
}

fn write_body(f: &mut fmt::Formatter, body: &ListNode) -> fmt::Result {
    write_nodes(f, &body.nodes)
}

// Consecutive text nodes would merge when re-lexed, so every text node that
// follows another is fenced in {literal}
fn write_nodes(f: &mut fmt::Formatter, nodes: &[Node]) -> fmt::Result {
    let mut after_text = false;
    for node in nodes {
        match node {
            Node::RawText(n) => write_raw_text(f, &n.text, after_text)?,
            other => write!(f, "{}", other)?,
        }
        after_text = matches!(node, Node::RawText(_));
    }
    Ok(())
}

fn write_autoescape(f: &mut fmt::Formatter, autoescape: Autoescape) -> fmt::Result {
    match autoescape.attr() {
        Some(value) => write!(f, " autoescape=\"{}\"", value),
        None => Ok(()),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::RawText(n) => write_raw_text(f, &n.text, false),
            Node::Namespace(n) => {
                write!(f, "{{namespace {}", n.name)?;
                write_autoescape(f, n.autoescape)?;
                write!(f, "}}")
            }
            Node::Template(n) => {
                let local = match n.name.rfind('.') {
                    Some(dot) => &n.name[dot..],
                    None => n.name.as_str(),
                };
                write!(f, "{{template {}", local)?;
                write_autoescape(f, n.autoescape)?;
                if n.private {
                    write!(f, " private=\"true\"")?;
                }
                write!(f, "}}")?;
                write_body(f, &n.body)?;
                write!(f, "{{/template}}")
            }
            Node::SoyDoc(n) => {
                writeln!(f, "/**")?;
                for param in &n.params {
                    let marker = if param.optional { "@param?" } else { "@param" };
                    writeln!(f, " * {} {}", marker, param.name)?;
                }
                write!(f, " */")
            }
            Node::Print(n) => {
                // a leading identifier could be read back as a command
                let printed = n.arg.to_string();
                if printed.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    write!(f, "{{print {}", printed)?;
                } else {
                    write!(f, "{{{}", printed)?;
                }
                for directive in &n.directives {
                    write!(f, "|{}", directive.name)?;
                    for (i, arg) in directive.args.iter().enumerate() {
                        write!(f, "{}{}", if i == 0 { ":" } else { "," }, arg)?;
                    }
                }
                write!(f, "}}")
            }
            Node::If(n) => {
                for (i, cond) in n.conds.iter().enumerate() {
                    match (&cond.cond, i) {
                        (Some(expr), 0) => write!(f, "{{if {}}}", expr)?,
                        (Some(expr), _) => write!(f, "{{elseif {}}}", expr)?,
                        (None, _) => write!(f, "{{else}}")?,
                    }
                    write_body(f, &cond.body)?;
                }
                write!(f, "{{/if}}")
            }
            Node::For(n) => {
                let keyword = match n.kind {
                    LoopKind::For => "for",
                    LoopKind::Foreach => "foreach",
                };
                write!(f, "{{{} ${} in {}}}", keyword, n.var, n.collection)?;
                write_body(f, &n.body)?;
                if let Some(ifempty) = &n.ifempty {
                    write!(f, "{{ifempty}}")?;
                    write_body(f, ifempty)?;
                }
                write!(f, "{{/{}}}", keyword)
            }
            Node::Switch(n) => {
                write!(f, "{{switch {}}}", n.value)?;
                for case in &n.cases {
                    if case.values.is_empty() {
                        write!(f, "{{default}}")?;
                    } else {
                        write!(f, "{{case ")?;
                        write_args(f, &case.values)?;
                        write!(f, "}}")?;
                    }
                    write_body(f, &case.body)?;
                }
                write!(f, "{{/switch}}")
            }
            Node::Call(n) => {
                write!(f, "{{call {}", n.name)?;
                if n.all_data {
                    write!(f, " data=\"all\"")?;
                } else if let Some(data) = &n.data {
                    write!(f, " data={}", quote_attr(&data.to_string()))?;
                }
                if n.params.is_empty() {
                    return write!(f, " /}}");
                }
                write!(f, "}}")?;
                for param in &n.params {
                    write!(f, "{{param {}", param.key())?;
                    match param {
                        CallParam::Value(p) => write!(f, ": {} /}}", p.value)?,
                        CallParam::Content(p) => {
                            if let Some(kind) = &p.kind {
                                write!(f, " kind={}", quote_attr(kind))?;
                            }
                            write!(f, "}}")?;
                            write_body(f, &p.body)?;
                            write!(f, "{{/param}}")?;
                        }
                    }
                }
                write!(f, "{{/call}}")
            }
            Node::LetValue(n) => write!(f, "{{let ${}: {} /}}", n.name, n.value),
            Node::LetContent(n) => {
                write!(f, "{{let ${}}}", n.name)?;
                write_body(f, &n.body)?;
                write!(f, "{{/let}}")
            }
            Node::Msg(n) => {
                write!(f, "{{msg desc={}", quote_attr(&n.desc))?;
                if let Some(meaning) = &n.meaning {
                    write!(f, " meaning={}", quote_attr(meaning))?;
                }
                if n.hidden {
                    write!(f, " hidden=\"true\"")?;
                }
                write!(f, "}}")?;
                write_body(f, &n.body)?;
                write!(f, "{{/msg}}")
            }
            Node::Css(n) => match &n.expr {
                Some(expr) => write!(f, "{{css {}, {}}}", expr, n.suffix),
                None => write!(f, "{{css {}}}", n.suffix),
            },
            Node::Log(n) => {
                write!(f, "{{log}}")?;
                write_body(f, &n.body)?;
                write!(f, "{{/log}}")
            }
            Node::Debugger(_) => write!(f, "{{debugger}}"),
        }
    }
}

// Top-level nodes are written back to back; any separator would become part
// of neighbouring text and change how it is trimmed on reparse
impl fmt::Display for SoyFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_nodes(f, &self.body)
    }
}

// Tree dump
//
// One node per line, two spaces per level, positions omitted. Two trees are
// structurally identical exactly when their dumps are equal.

/// Render statement nodes as an indented tree
pub fn dump(nodes: &[Node]) -> String {
    let mut dumper = Dumper::default();
    dumper.nodes(nodes, 0);
    dumper.out
}

/// Render a single expression as an indented tree
pub fn dump_expr(expr: &Expr) -> String {
    let mut dumper = Dumper::default();
    dumper.expr(expr, 0);
    dumper.out
}

#[derive(Default)]
struct Dumper {
    out: String,
}

impl Dumper {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nodes(&mut self, nodes: &[Node], depth: usize) {
        for node in nodes {
            self.node(node, depth);
        }
    }

    fn node(&mut self, node: &Node, depth: usize) {
        match node {
            Node::RawText(n) => self.line(depth, &format!("RawText {:?}", n.text)),
            Node::Namespace(n) => {
                let mut header = format!("Namespace {}", n.name);
                if let Some(value) = n.autoescape.attr() {
                    let _ = write!(header, " autoescape={}", value);
                }
                self.line(depth, &header);
            }
            Node::Template(n) => {
                let mut header = format!("Template {}", n.name);
                if let Some(value) = n.autoescape.attr() {
                    let _ = write!(header, " autoescape={}", value);
                }
                if n.private {
                    header.push_str(" private");
                }
                self.line(depth, &header);
                self.nodes(&n.body.nodes, depth + 1);
            }
            Node::SoyDoc(n) => {
                self.line(depth, "SoyDoc");
                for param in &n.params {
                    let marker = if param.optional { "Param?" } else { "Param" };
                    self.line(depth + 1, &format!("{} {}", marker, param.name));
                }
            }
            Node::Print(n) => {
                self.line(depth, "Print");
                self.expr(&n.arg, depth + 1);
                for directive in &n.directives {
                    self.line(depth + 1, &format!("Directive |{}", directive.name));
                    for arg in &directive.args {
                        self.expr(arg, depth + 2);
                    }
                }
            }
            Node::If(n) => {
                self.line(depth, "If");
                for cond in &n.conds {
                    match &cond.cond {
                        Some(expr) => {
                            self.line(depth + 1, "Branch");
                            self.expr(expr, depth + 2);
                        }
                        None => self.line(depth + 1, "Else"),
                    }
                    self.nodes(&cond.body.nodes, depth + 2);
                }
            }
            Node::For(n) => {
                let keyword = match n.kind {
                    LoopKind::For => "For",
                    LoopKind::Foreach => "Foreach",
                };
                self.line(depth, &format!("{} ${}", keyword, n.var));
                self.expr(&n.collection, depth + 1);
                self.nodes(&n.body.nodes, depth + 1);
                if let Some(ifempty) = &n.ifempty {
                    self.line(depth + 1, "IfEmpty");
                    self.nodes(&ifempty.nodes, depth + 2);
                }
            }
            Node::Switch(n) => {
                self.line(depth, "Switch");
                self.expr(&n.value, depth + 1);
                for case in &n.cases {
                    if case.values.is_empty() {
                        self.line(depth + 1, "Default");
                    } else {
                        self.line(depth + 1, "Case");
                        for value in &case.values {
                            self.expr(value, depth + 2);
                        }
                    }
                    self.nodes(&case.body.nodes, depth + 2);
                }
            }
            Node::Call(n) => {
                let mut header = format!("Call {}", n.name);
                if n.all_data {
                    header.push_str(" data=all");
                }
                self.line(depth, &header);
                if let Some(data) = &n.data {
                    self.line(depth + 1, "Data");
                    self.expr(data, depth + 2);
                }
                for param in &n.params {
                    match param {
                        CallParam::Value(p) => {
                            self.line(depth + 1, &format!("Param {}", p.key));
                            self.expr(&p.value, depth + 2);
                        }
                        CallParam::Content(p) => {
                            let mut header = format!("ParamContent {}", p.key);
                            if let Some(kind) = &p.kind {
                                let _ = write!(header, " kind={}", kind);
                            }
                            self.line(depth + 1, &header);
                            self.nodes(&p.body.nodes, depth + 2);
                        }
                    }
                }
            }
            Node::LetValue(n) => {
                self.line(depth, &format!("LetValue ${}", n.name));
                self.expr(&n.value, depth + 1);
            }
            Node::LetContent(n) => {
                self.line(depth, &format!("LetContent ${}", n.name));
                self.nodes(&n.body.nodes, depth + 1);
            }
            Node::Msg(n) => {
                let mut header = format!("Msg desc={:?}", n.desc);
                if let Some(meaning) = &n.meaning {
                    let _ = write!(header, " meaning={:?}", meaning);
                }
                if n.hidden {
                    header.push_str(" hidden");
                }
                self.line(depth, &header);
                self.nodes(&n.body.nodes, depth + 1);
            }
            Node::Css(n) => {
                self.line(depth, &format!("Css {}", n.suffix));
                if let Some(expr) = &n.expr {
                    self.expr(expr, depth + 1);
                }
            }
            Node::Log(n) => {
                self.line(depth, "Log");
                self.nodes(&n.body.nodes, depth + 1);
            }
            Node::Debugger(_) => self.line(depth, "Debugger"),
        }
    }

    fn expr(&mut self, expr: &Expr, depth: usize) {
        match expr {
            Expr::Null { .. } => self.line(depth, "Null"),
            Expr::Bool { value, .. } => self.line(depth, &format!("Bool {}", value)),
            Expr::Int { value, .. } => self.line(depth, &format!("Int {}", value)),
            Expr::Float { value, .. } => {
                self.line(depth, &format!("Float {}", format_float(*value)))
            }
            Expr::Str { value, .. } => self.line(depth, &format!("Str {:?}", value)),
            Expr::List { items, .. } => {
                self.line(depth, "List");
                for item in items {
                    self.expr(item, depth + 1);
                }
            }
            Expr::Map { entries, .. } => {
                self.line(depth, "Map");
                for (key, value) in entries {
                    self.line(depth + 1, &format!("Entry {:?}", key));
                    self.expr(value, depth + 2);
                }
            }
            Expr::DataRef { key, access, .. } => {
                self.line(depth, &format!("DataRef ${}", key));
                for step in access {
                    let q = if step.null_safe() { "?" } else { "" };
                    match step {
                        Access::Key { key, .. } => {
                            self.line(depth + 1, &format!("Key {}.{}", q, key))
                        }
                        Access::Index { index, .. } => {
                            self.line(depth + 1, &format!("Index {}.{}", q, index))
                        }
                        Access::Expr { expr, .. } => {
                            self.line(depth + 1, &format!("Expr {}[]", q));
                            self.expr(expr, depth + 2);
                        }
                    }
                }
            }
            Expr::Global { name, value, .. } => {
                self.line(depth, &format!("Global {} = {}", name, value))
            }
            Expr::Function { name, args, .. } => {
                self.line(depth, &format!("Function {}", name));
                for arg in args {
                    self.expr(arg, depth + 1);
                }
            }
            Expr::Not { arg, .. } => {
                self.line(depth, "Not");
                self.expr(arg, depth + 1);
            }
            Expr::Negate { arg, .. } => {
                self.line(depth, "Negate");
                self.expr(arg, depth + 1);
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                self.line(depth, &format!("{:?}", op));
                self.expr(left, depth + 1);
                self.expr(right, depth + 1);
            }
            Expr::Ternary {
                cond,
                if_true,
                if_false,
                ..
            } => {
                self.line(depth, "Ternary");
                self.expr(cond, depth + 1);
                self.expr(if_true, depth + 1);
                self.expr(if_false, depth + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i64) -> Expr {
        Expr::Int { pos: 0, value }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            pos: 0,
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn test_precedence_table() {
        assert_eq!(BinaryOp::Mul.precedence(), 5);
        assert_eq!(BinaryOp::Add.precedence(), 4);
        assert_eq!(BinaryOp::Lte.precedence(), 3);
        assert_eq!(BinaryOp::Or.precedence(), 2);
        assert_eq!(BinaryOp::And.precedence(), 1);
        assert_eq!(BinaryOp::Elvis.precedence(), 0);
        assert!(UNARY_PRECEDENCE > BinaryOp::Mul.precedence());
    }

    #[test]
    fn test_binary_printing_adds_needed_parens() {
        let sum_then_mul = binary(BinaryOp::Mul, binary(BinaryOp::Add, int(1), int(2)), int(3));
        assert_eq!(sum_then_mul.to_string(), "(1 + 2) * 3");

        let mul_then_sum = binary(BinaryOp::Add, int(1), binary(BinaryOp::Mul, int(2), int(3)));
        assert_eq!(mul_then_sum.to_string(), "1 + 2 * 3");

        // right operand of equal precedence keeps its grouping
        let right_nested = binary(BinaryOp::Sub, int(1), binary(BinaryOp::Sub, int(2), int(3)));
        assert_eq!(right_nested.to_string(), "1 - (2 - 3)");
    }

    #[test]
    fn test_unary_printing() {
        let negated_sum = Expr::Negate {
            pos: 0,
            arg: Box::new(binary(BinaryOp::Add, int(1), int(2))),
        };
        assert_eq!(negated_sum.to_string(), "-(1 + 2)");

        let not_ref = Expr::Not {
            pos: 0,
            arg: Box::new(Expr::DataRef {
                pos: 0,
                key: "a".to_string(),
                access: vec![Access::Key {
                    pos: 0,
                    null_safe: true,
                    key: "b".to_string(),
                }],
            }),
        };
        assert_eq!(not_ref.to_string(), "not $a?.b");
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("plain"), "'plain'");
        assert_eq!(quote_string("it's"), r"'it\'s'");
        assert_eq!(quote_string("a\nb\\c"), r"'a\nb\\c'");
        assert_eq!(quote_string("say \"hi\""), r#"'say \"hi\"'"#);
    }

    #[test]
    fn test_raw_text_printing() {
        let text = |s: &str| {
            Node::RawText(RawTextNode {
                pos: 0,
                text: s.to_string(),
            })
        };
        assert_eq!(text("hello").to_string(), "hello");
        assert_eq!(text("").to_string(), "{nil}");
        assert_eq!(text("{").to_string(), "{lb}");
        assert_eq!(text("a{b").to_string(), "{literal}a{b{/literal}");
        assert_eq!(text("\n").to_string(), "{\\n}");
    }

    #[test]
    fn test_adjacent_text_is_fenced() {
        let body = ListNode {
            pos: 0,
            nodes: vec![
                Node::RawText(RawTextNode {
                    pos: 0,
                    text: "a".to_string(),
                }),
                Node::RawText(RawTextNode {
                    pos: 1,
                    text: "b".to_string(),
                }),
            ],
        };
        let log = Node::Log(LogNode { pos: 0, body });
        assert_eq!(log.to_string(), "{log}a{literal}b{/literal}{/log}");
    }

    #[test]
    fn test_dump_expr() {
        let expr = binary(BinaryOp::Add, int(1), binary(BinaryOp::Mul, int(2), int(3)));
        let expected = "\
Add
  Int 1
  Mul
    Int 2
    Int 3
";
        assert_eq!(dump_expr(&expr), expected);
    }

    #[test]
    fn test_dump_nodes() {
        let nodes = vec![
            Node::Namespace(NamespaceNode {
                pos: 0,
                name: "a.b".to_string(),
                autoescape: Autoescape::Unspecified,
            }),
            Node::Template(TemplateNode {
                pos: 16,
                name: "a.b.c".to_string(),
                body: ListNode {
                    pos: 30,
                    nodes: vec![Node::Debugger(DebuggerNode { pos: 30 })],
                },
                autoescape: Autoescape::Contextual,
                private: true,
            }),
        ];
        let expected = "\
Namespace a.b
Template a.b.c autoescape=contextual private
  Debugger
";
        assert_eq!(dump(&nodes), expected);
    }
}
