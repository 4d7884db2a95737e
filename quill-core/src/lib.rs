//! Core of the quill script host.
//!
//! A request flows through the crate like this:
//!
//!   ScriptContext
//!     -> assets     (runtime assets from quill.deps.json for this platform)
//!     -> config     (compilation configuration from explicit policies)
//!     -> inherited  (references to modules the host already runs)
//!     -> engine     (quill source -> wasm, with diagnostics)
//!     -> triage     (ordered diagnostics, pass/fail)
//!     -> CompiledScript, run later by the session's ScriptLoader
//!
//! Tools (the `quill` CLI, embedding hosts) should depend on this crate
//! rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Script input and platform
// ---------------------------------------------------------------------

pub mod source;
pub mod runtime_id;

// ---------------------------------------------------------------------
// Asset resolution and configuration
// ---------------------------------------------------------------------

pub mod manifest;
pub mod assets;
pub mod config;
pub mod inherited;
pub mod stdlib;

// ---------------------------------------------------------------------
// Front-end and compile step
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;
pub mod engine;

// ---------------------------------------------------------------------
// Orchestration and execution
// ---------------------------------------------------------------------

pub mod loader;
pub mod script;
pub mod orchestrator;

pub use assets::{RuntimeAssetSet, resolve_runtime_assets};
pub use config::{
    CompilationConfiguration, CompilationPolicy, MetadataReference, ResolutionPolicy,
    build_configuration,
};
pub use diagnostic::{Diagnostic, Severity};
pub use engine::{CompileRequest, CompiledUnit, ScriptEngine, WasmEngine};
pub use error::{COMPILATION_FAILED, CompilationError, ResolutionError, ScriptError};
pub use inherited::{HostModuleRegistry, HostRuntime, InheritancePolicy, ModuleIdentity, augment};
pub use loader::{HostMember, ScriptHost, ScriptLoader, SessionSymbols};
pub use manifest::{DependencyGraph, DependencyNode, DependencyProvider, ManifestReader};
pub use orchestrator::{CompileRejection, ScriptCompiler};
pub use runtime_id::RuntimeId;
pub use script::{CompiledScript, ReturnKind, ReturnValue};
pub use source::{ScriptContext, ScriptSource, SourceEncoding};
