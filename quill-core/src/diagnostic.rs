//! Diagnostics reported by the compile step.
//!
//! Beyond producing them, the orchestrator only looks at two properties of
//! a diagnostic: its severity and the start of its span. Everything else is
//! carried through for rendering.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use crate::span::{Span, line_col};

/// Severity level of a diagnostic message.
///
/// Variants are declared in ascending order so that the derived `Ord`
/// ranks `Error` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a diagnostic points, in human terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Originating file, when the script came from one.
    pub path: Option<PathBuf>,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// A single diagnostic message produced by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub span: Span,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: &'static str,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Diagnostic {
            severity,
            code,
            message: message.into(),
            span,
            location: None,
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(Severity::Error, code, message, span)
    }

    pub fn warning(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(Severity::Warning, code, message, span)
    }

    pub fn info(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(Severity::Info, code, message, span)
    }

    /// Resolve the span against `text` and attach the originating path.
    pub fn locate(mut self, text: &str, path: Option<&PathBuf>) -> Self {
        let (line, column) = line_col(text, self.span.start);
        self.location = Some(Location {
            path: path.cloned(),
            line,
            column,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(Location {
                path: Some(path),
                line,
                column,
            }) => write!(f, "{}({line},{column}): ", path.display())?,
            Some(Location { line, column, .. }) => write!(f, "({line},{column}): ")?,
            None => {}
        }
        write!(f, "{} {}: {}", self.severity, self.code, self.message)
    }
}

/// Ordering used for reporting: most severe first, then earliest in the
/// file.
pub fn report_order(a: &Diagnostic, b: &Diagnostic) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| a.span.start.cmp(&b.span.start))
}

/// Sort diagnostics into report order. The sort is stable, so diagnostics
/// that compare equal keep the order the compiler produced them in.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(report_order);
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
