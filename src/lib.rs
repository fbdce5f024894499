//! Parser for Soy (Closure Templates) source files.
//!
//! [`parse_file`] turns template text into a tree of [`ast::Node`]s, resolving
//! namespaces, aliases and compile-time globals along the way. [`parse_expr`]
//! parses a single expression on its own.

pub mod ast;
pub mod cli;
pub mod globals;
pub mod lexer;
pub mod limits;
pub mod parser;
pub mod value;

pub use ast::{Expr, Node, SoyFile};
pub use limits::ParserLimits;
pub use parser::{ErrorKind, ParseError, parse_expr, parse_file, parse_file_with_limits};
pub use value::{Globals, Value};
