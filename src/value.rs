use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

use crate::ast::{Expr, quote_string};

/// Compile-time global constants, keyed by fully-qualified dotted name
pub type Globals = HashMap<String, Value>;

/// A literal value, as supplied for globals and captured by global references
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Convert an expression made only of literals into a value
    ///
    /// Returns None for anything that needs evaluation (data references,
    /// function calls, operators). Globals are already values, so they convert.
    pub fn from_literal(expr: &Expr) -> Option<Value> {
        match expr {
            Expr::Null { .. } => Some(Value::Null),
            Expr::Bool { value, .. } => Some(Value::Bool(*value)),
            Expr::Int { value, .. } => Some(Value::Int(*value)),
            Expr::Float { value, .. } => Some(Value::Float(*value)),
            Expr::Str { value, .. } => Some(Value::String(value.clone())),
            Expr::Global { value, .. } => Some(value.clone()),
            Expr::List { items, .. } => items
                .iter()
                .map(Value::from_literal)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            Expr::Map { entries, .. } => entries
                .iter()
                .map(|(k, v)| Value::from_literal(v).map(|v| (k.clone(), v)))
                .collect::<Option<IndexMap<_, _>>>()
                .map(Value::Map),
            // Negative number literals arrive as Negate(literal)
            Expr::Negate { arg, .. } => match Value::from_literal(arg)? {
                Value::Int(i) => i.checked_neg().map(Value::Int),
                Value::Float(f) => Some(Value::Float(-f)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

// Soy literal syntax, so a value can be printed back into a template
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::String(s) => write!(f, "{}", quote_string(s)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
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
        }
    }
}

/// Format a float so that it lexes back as a float, never as an integer
pub(crate) fn format_float(x: f64) -> String {
    let s = format!("{:?}", x);
    if s.contains(['.', 'e', 'E']) || !x.is_finite() {
        s
    } else {
        format!("{}.0", s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(-3i64).to_string(), "-3");
        assert_eq!(Value::from(2.0).to_string(), "2.0");
        assert_eq!(Value::from(0.25).to_string(), "0.25");
        assert_eq!(Value::from("it's").to_string(), r"'it\'s'");
    }

    #[test]
    fn test_display_collections() {
        let list = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(list.to_string(), "[1, 'a']");

        let mut entries = IndexMap::new();
        entries.insert("k".to_string(), Value::Bool(false));
        assert_eq!(Value::Map(entries).to_string(), "['k': false]");
        assert_eq!(Value::Map(IndexMap::new()).to_string(), "[:]");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::List(vec![]).type_name(), "list");
    }
}
