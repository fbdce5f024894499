// Compile-time globals files
//
// One definition per line:
//
//   app.MAX_ITEMS = 25
//   app.GREETING = 'hello'
//
// Blank lines and lines starting with "//" are skipped. Values are literal
// expressions: null, booleans, numbers, strings, and lists or maps of those.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::parser::parse_expr;
use crate::value::{Globals, Value};

/// Error type for loading and merging globals
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalsError {
    pub line: Option<usize>, // 1-based line within the globals file
    pub message: String,
}

impl GlobalsError {
    fn at_line(line: usize, message: String) -> Self {
        Self {
            line: Some(line),
            message,
        }
    }
}

impl fmt::Display for GlobalsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "globals line {}: {}", line, self.message),
            None => write!(f, "globals: {}", self.message),
        }
    }
}

impl std::error::Error for GlobalsError {}

/// Parse the text of a globals file
pub fn parse_globals(text: &str) -> Result<Globals, GlobalsError> {
    let mut globals = Globals::new();
    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        let Some((name, expr)) = line.split_once('=') else {
            return Err(GlobalsError::at_line(
                line_no,
                format!("expected NAME = VALUE, got {:?}", line),
            ));
        };
        let name = name.trim();
        if !is_global_name(name) {
            return Err(GlobalsError::at_line(
                line_no,
                format!("invalid global name {:?}", name),
            ));
        }

        let expr = parse_expr(expr.trim())
            .map_err(|e| GlobalsError::at_line(line_no, format!("{}: {}", name, e)))?;
        let Some(value) = Value::from_literal(&expr) else {
            return Err(GlobalsError::at_line(
                line_no,
                format!("{}: value must be a literal, got {}", name, expr.kind_name()),
            ));
        };

        if globals.insert(name.to_string(), value).is_some() {
            return Err(GlobalsError::at_line(
                line_no,
                format!("global {:?} is defined twice", name),
            ));
        }
    }

    tracing::debug!(count = globals.len(), "parsed globals");
    Ok(globals)
}

/// Read and parse a globals file
pub fn load_globals_file<P: AsRef<Path>>(path: P) -> Result<Globals, GlobalsError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| GlobalsError {
        line: None,
        message: format!("failed to read {}: {}", path.display(), e),
    })?;
    parse_globals(&text).map_err(|e| GlobalsError {
        message: format!("{}: {}", path.display(), e.message),
        ..e
    })
}

/// Add every entry of `other` to `into`; a name may only be defined once
pub fn merge_globals(into: &mut Globals, other: Globals) -> Result<(), GlobalsError> {
    for (name, value) in other {
        if let Some(existing) = into.get(&name) {
            return Err(GlobalsError {
                line: None,
                message: format!("global {:?} already defined as {}", name, existing),
            });
        }
        into.insert(name, value);
    }
    Ok(())
}

// Dotted identifiers, as they are written in expressions
fn is_global_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            segment.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
