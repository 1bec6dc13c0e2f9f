//! Warning sink shared by the compiler and the linker.
//!
//! Every non-fatal problem is reported through [`Diagnostics::raise`] (or
//! [`Diagnostics::raise_at`] when the problem belongs to an atom that came from
//! another source file). A raised diagnostic prints
//! `file:line: warning: <message> [parameter]`, is kept for inspection and
//! sets the sticky failure flag. Nothing is ever un-raised.

use crate::core::error::ErrorCode;
use std::fmt;
use std::rc::Rc;

/// Where an atom was written: the source file named in the compiled object and
/// the line in that file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub file: Rc<str>,
    pub line: u32,
}

impl SourceRef {
    pub fn new(file: Rc<str>, line: u32) -> Self {
        Self { file, line }
    }
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub file: Rc<str>,
    pub line: u32,
    pub parameter: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}: warning: {}", self.file, self.code)?;
        } else {
            write!(f, "{}:{}: warning: {}", self.file, self.line, self.code)?;
        }

        if let Some(parameter) = &self.parameter {
            write!(f, " {}", parameter)?;
        }

        Ok(())
    }
}

/// Collects warnings and tracks whether any were raised.
#[derive(Debug)]
pub struct Diagnostics {
    input_name: Rc<str>,
    raised: Vec<Diagnostic>,
    echo: bool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            input_name: Rc::from(""),
            raised: Vec::new(),
            echo: true,
        }
    }

    /// A sink that keeps diagnostics without printing them.
    pub fn silent() -> Self {
        Self {
            echo: false,
            ..Self::new()
        }
    }

    /// Name used for diagnostics raised without an explicit source reference.
    pub fn set_input_name(&mut self, name: &str) {
        self.input_name = Rc::from(name);
    }

    pub fn input_name(&self) -> Rc<str> {
        Rc::clone(&self.input_name)
    }

    /// Raise against the file currently being processed.
    pub fn raise(&mut self, line: u32, code: ErrorCode, parameter: Option<&str>) {
        let file = Rc::clone(&self.input_name);
        self.push(code, file, line, parameter);
    }

    /// Raise against the source location recorded on a model entity.
    pub fn raise_at(&mut self, source: Option<&SourceRef>, code: ErrorCode, parameter: Option<&str>) {
        match source {
            Some(source) => {
                let file = Rc::clone(&source.file);
                self.push(code, file, source.line, parameter);
            }
            None => self.raise(0, code, parameter),
        }
    }

    fn push(&mut self, code: ErrorCode, file: Rc<str>, line: u32, parameter: Option<&str>) {
        let diagnostic = Diagnostic {
            code,
            file,
            line,
            parameter: parameter.map(str::to_string),
        };

        if self.echo {
            println!("{}", diagnostic);
        }
        log::debug!("raised {:?}", code);

        self.raised.push(diagnostic);
    }

    /// True once anything has been raised.
    pub fn failed(&self) -> bool {
        !self.raised.is_empty()
    }

    pub fn raised(&self) -> &[Diagnostic] {
        &self.raised
    }

    /// Number of times `code` was raised.
    pub fn count(&self, code: ErrorCode) -> usize {
        self.raised.iter().filter(|d| d.code == code).count()
    }

    pub fn contains(&self, code: ErrorCode) -> bool {
        self.count(code) > 0
    }
}
