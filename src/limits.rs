// Parser safety limits
//
// Guards the tokenizer and the recursive grammar against pathological input:
// oversized files, runaway token streams, and nesting deep enough to exhaust
// the call stack.
//
// Defaults are permissive and can be overridden from the [limits] table of a
// soy.toml file.

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Resource limits applied to a single parse
///
/// Deserializes from the `[limits]` table of a config file; keys left out
/// keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserLimits {
    // Lexer limits
    pub max_input_size: usize,        // Maximum source size in bytes
    pub max_token_count: usize,       // Maximum number of tokens per file
    pub max_identifier_length: usize, // Maximum identifier length in bytes
    pub max_string_length: usize,     // Maximum string literal length in bytes

    // Parser limits
    pub max_nesting_depth: usize, // Maximum recursion depth of tags and expressions
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_input_size: 10_000_000,    // 10 MB
            max_token_count: 1_000_000,    // 1M tokens
            max_identifier_length: 1_000,  // 1k bytes
            max_string_length: 10_000_000, // 10 MB
            max_nesting_depth: 128,
        }
    }
}

// Anything else in the file belongs to other tools
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    limits: ParserLimits,
}

const MAX_BYTES: usize = 100_000_000; // 100 MB

impl ParserLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load limits from a soy.toml file, falling back to defaults
    ///
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn from_config_toml<P: AsRef<Path>>(path: P) -> Result<Self, LimitError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using default limits");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| LimitError {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content).map_err(|e| LimitError {
            message: format!("Failed to parse {}: {}", path.display(), e.message),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, LimitError> {
        toml::from_str::<ConfigFile>(content)
            .map(|config| config.limits)
            .map_err(|e| LimitError {
                message: e.to_string(),
            })
    }

    /// Check every limit lies within 1..=its ceiling
    pub fn validate(&self) -> Result<(), LimitError> {
        let checks = [
            ("max_input_size", self.max_input_size, MAX_BYTES),
            ("max_token_count", self.max_token_count, usize::MAX),
            ("max_identifier_length", self.max_identifier_length, 100_000),
            ("max_string_length", self.max_string_length, MAX_BYTES),
            ("max_nesting_depth", self.max_nesting_depth, 10_000),
        ];
        for (name, value, ceiling) in checks {
            if value == 0 || value > ceiling {
                return Err(LimitError::invalid(name, value, ceiling));
            }
        }
        Ok(())
    }
}

/// Error type for limit validation and loading
#[derive(Debug, Clone)]
pub struct LimitError {
    pub message: String,
}

impl LimitError {
    fn invalid(name: &str, value: usize, ceiling: usize) -> Self {
        Self {
            message: format!("{} = {} is out of range (1..={})", name, value, ceiling),
        }
    }
}

impl std::fmt::Display for LimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "limits: {}", self.message)
    }
}

impl std::error::Error for LimitError {}
