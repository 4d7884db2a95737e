//! Compilation configuration and the policy it is built from.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assets::normalize_path_lexically;
use crate::source::{ScriptContext, SourceEncoding};
use crate::stdlib::{CORE_LIBRARY, core_library};

/// A library the script is compiled against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataReference {
    /// A module image already held in memory, addressed by name.
    Image { name: String, bytes: Arc<[u8]> },
    /// A module on disk; its library name is the file stem.
    File(PathBuf),
}

impl MetadataReference {
    pub fn image(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        MetadataReference::Image {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        MetadataReference::File(normalize_path_lexically(path.as_ref()))
    }

    /// Namespace scripts use to call into this library.
    pub fn library_name(&self) -> String {
        match self {
            MetadataReference::Image { name, .. } => name.clone(),
            MetadataReference::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Module bytes, reading them from disk for file references.
    pub fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            MetadataReference::Image { bytes, .. } => Ok(Arc::clone(bytes)),
            MetadataReference::File(path) => fs::read(path).map(Arc::from),
        }
    }

    /// Whether both describe the same library: the same image name or the
    /// same file.
    pub fn same_as(&self, other: &MetadataReference) -> bool {
        use MetadataReference::{File, Image};
        match (self, other) {
            (Image { name: a, .. }, Image { name: b, .. }) => a == b,
            (File(a), File(b)) => a == b,
            _ => false,
        }
    }
}

/// How `#r` directives are resolved: relative paths are taken from the
/// base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    base_directory: PathBuf,
}

impl ResolutionPolicy {
    pub fn relative_to(base_directory: impl Into<PathBuf>) -> Self {
        ResolutionPolicy {
            base_directory: base_directory.into(),
        }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            normalize_path_lexically(path)
        } else {
            normalize_path_lexically(&self.base_directory.join(path))
        }
    }
}

/// Baseline every configuration starts from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilationPolicy {
    pub default_imports: Vec<String>,
    pub default_references: Vec<MetadataReference>,
}

impl CompilationPolicy {
    /// Imports `core` and references the built-in `core` library.
    pub fn standard() -> Self {
        CompilationPolicy {
            default_imports: vec![CORE_LIBRARY.to_string()],
            default_references: vec![MetadataReference::image(CORE_LIBRARY, core_library())],
        }
    }
}

/// Immutable options handed to the compile step. Every `with_*` method
/// consumes the value and returns the extended configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationConfiguration {
    imports: Vec<String>,
    references: Vec<MetadataReference>,
    emit_debug_information: bool,
    encoding: SourceEncoding,
    file_path: Option<PathBuf>,
    resolution: ResolutionPolicy,
}

impl CompilationConfiguration {
    pub fn new(resolution: ResolutionPolicy) -> Self {
        CompilationConfiguration {
            imports: Vec::new(),
            references: Vec::new(),
            emit_debug_information: false,
            encoding: SourceEncoding::default(),
            file_path: None,
            resolution,
        }
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for import in imports {
            let import = import.into();
            if !self.imports.contains(&import) {
                self.imports.push(import);
            }
        }
        self
    }

    /// Append references, skipping any that are already present.
    pub fn with_references(
        mut self,
        references: impl IntoIterator<Item = MetadataReference>,
    ) -> Self {
        for reference in references {
            if !self
                .references
                .iter()
                .any(|existing| existing.same_as(&reference))
            {
                self.references.push(reference);
            }
        }
        self
    }

    pub fn with_debug_information(mut self, emit: bool) -> Self {
        self.emit_debug_information = emit;
        self
    }

    pub fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_file_path(mut self, path: Option<PathBuf>) -> Self {
        self.file_path = path;
        self
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn references(&self) -> &[MetadataReference] {
        &self.references
    }

    pub fn emit_debug_information(&self) -> bool {
        self.emit_debug_information
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn resolution(&self) -> &ResolutionPolicy {
        &self.resolution
    }
}

/// Build the base configuration for a script.
pub fn build_configuration(
    context: &ScriptContext,
    policy: &CompilationPolicy,
) -> CompilationConfiguration {
    let source = context.source();
    CompilationConfiguration::new(ResolutionPolicy::relative_to(context.working_directory()))
        .with_imports(policy.default_imports.iter().cloned())
        .with_references(policy.default_references.iter().cloned())
        .with_debug_information(context.debug())
        .with_encoding(source.encoding())
        .with_file_path(source.path().map(Path::to_path_buf))
}
