//! Options for the compile and link stages.
//!
//! The binaries fill these from their command lines; library callers can
//! start from `Default` and change what they need.

use std::path::PathBuf;

/// Default nesting limit when function bodies are inlined into timelines.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10;

pub const DEFAULT_COMPILED_OUTPUT: &str = "doc.pdso";
pub const DEFAULT_LINKED_OUTPUT: &str = "doc.gout";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub output: PathBuf,
    /// `-D NAME=VALUE` definitions usable as `$NAME` in group positions.
    pub macros: Vec<(String, String)>,
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_COMPILED_OUTPUT),
            macros: Vec::new(),
            verbose: false,
            quiet: false,
        }
    }
}

impl CompileOptions {
    /// Add a macro from `NAME=VALUE` text. A definition without `=` gets an
    /// empty value.
    pub fn define(&mut self, definition: &str) {
        let (name, value) = definition.split_once('=').unwrap_or((definition, ""));
        self.macros.push((name.to_string(), value.to_string()));
    }

    pub fn macro_value(&self, name: &str) -> Option<&str> {
        self.macros
            .iter()
            .rev()
            .find(|(macro_name, _)| macro_name == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub output: PathBuf,
    pub max_call_depth: usize,
    pub verbose: bool,
    /// Keep diagnostics without printing them.
    pub quiet: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_LINKED_OUTPUT),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            verbose: false,
            quiet: false,
        }
    }
}
