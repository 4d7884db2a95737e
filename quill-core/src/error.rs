use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostic::Diagnostic;

/// Summary carried by every [`CompilationError`].
pub const COMPILATION_FAILED: &str = "Script compilation failed due to one or more errors.";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("invalid script context: {0}")]
    Argument(String),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    #[error("script execution failed: {0}")]
    Runtime(String),
}

impl ScriptError {
    pub(crate) fn runtime(error: impl std::fmt::Display) -> Self {
        ScriptError::Runtime(error.to_string())
    }
}

/// The dependency manifest could not yield a dependency graph.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no dependency manifest was found at {0}")]
    MissingManifest(PathBuf),
    #[error("failed to read dependency manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dependency manifest {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("profile '{0}' is not defined in the dependency manifest")]
    UnknownProfile(String),
    #[error("package '{package}' referenced by '{referrer}' is not defined in the dependency manifest")]
    UnknownPackage { package: String, referrer: String },
    #[error("runtime asset {0} does not exist")]
    MissingAsset(PathBuf),
}

/// One or more error diagnostics were reported for the script.
///
/// `diagnostics` holds every diagnostic the compiler produced, errors and
/// otherwise, in report order.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompilationError {
    pub message: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilationError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        CompilationError {
            message: COMPILATION_FAILED.to_string(),
            diagnostics,
        }
    }

    /// The summary followed by one line per diagnostic.
    pub fn report(&self) -> String {
        let mut report = self.message.clone();
        for diagnostic in &self.diagnostics {
            report.push('\n');
            report.push_str(&diagnostic.to_string());
        }
        report
    }
}
