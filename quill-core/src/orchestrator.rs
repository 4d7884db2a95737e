//! The compilation orchestrator.
//!
//! One request runs straight through: validate the context, resolve the
//! platform's runtime assets, build and augment the configuration, run the
//! compile step, then triage its diagnostics into success or failure.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::assets::resolve_runtime_assets;
use crate::config::{CompilationPolicy, MetadataReference, build_configuration};
use crate::diagnostic::{Severity, has_errors, sort_diagnostics};
use crate::engine::{CompileRequest, CompiledUnit, ScriptEngine, WasmEngine};
use crate::error::{CompilationError, ScriptError};
use crate::inherited::{HostModuleRegistry, HostRuntime, InheritancePolicy, augment};
use crate::loader::{ScriptHost, ScriptLoader};
use crate::manifest::{DependencyProvider, ManifestReader};
use crate::runtime_id::RuntimeId;
use crate::script::{CompiledScript, ReturnValue};
use crate::source::ScriptContext;

/// A failed submission. The loader comes back untouched so the session can
/// continue.
pub struct CompileRejection<H: ScriptHost> {
    pub error: ScriptError,
    pub loader: ScriptLoader<H>,
}

impl<H: ScriptHost> fmt::Debug for CompileRejection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileRejection")
            .field("error", &self.error)
            .field("loader", &self.loader)
            .finish()
    }
}

impl<H: ScriptHost> fmt::Display for CompileRejection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<H: ScriptHost> std::error::Error for CompileRejection<H> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<H: ScriptHost> From<CompileRejection<H>> for ScriptError {
    fn from(rejection: CompileRejection<H>) -> Self {
        rejection.error
    }
}

/// Compiles scripts against a dependency manifest and the host's loaded
/// modules.
pub struct ScriptCompiler {
    engine: Box<dyn ScriptEngine>,
    dependencies: Box<dyn DependencyProvider>,
    host_runtime: Box<dyn HostRuntime>,
    policy: CompilationPolicy,
    inheritance: InheritancePolicy,
    runtime: RuntimeId,
}

impl Default for ScriptCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptCompiler {
    /// The quill engine, `quill.deps.json` manifests, the standard host
    /// registry and policies, and the platform this process runs on.
    pub fn new() -> Self {
        ScriptCompiler {
            engine: Box::new(WasmEngine::new()),
            dependencies: Box::new(ManifestReader),
            host_runtime: Box::new(HostModuleRegistry::standard()),
            policy: CompilationPolicy::standard(),
            inheritance: InheritancePolicy::standard(),
            runtime: RuntimeId::current(),
        }
    }

    pub fn with_engine(mut self, engine: impl ScriptEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn with_dependency_provider(mut self, provider: impl DependencyProvider + 'static) -> Self {
        self.dependencies = Box::new(provider);
        self
    }

    pub fn with_host_runtime(mut self, host_runtime: impl HostRuntime + 'static) -> Self {
        self.host_runtime = Box::new(host_runtime);
        self
    }

    pub fn with_policy(mut self, policy: CompilationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_inheritance(mut self, inheritance: InheritancePolicy) -> Self {
        self.inheritance = inheritance;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeId) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    /// Compile the first submission of a new session hosted by `host`.
    pub fn compile<R: ReturnValue, H: ScriptHost>(
        &self,
        context: &ScriptContext,
        host: H,
    ) -> Result<CompiledScript<R, H>, ScriptError> {
        let loader = ScriptLoader::new(host)?;
        self.compile_submission(context, loader)
            .map_err(ScriptError::from)
    }

    /// Compile the next submission of the session `loader` carries.
    pub fn compile_submission<R: ReturnValue, H: ScriptHost>(
        &self,
        context: &ScriptContext,
        loader: ScriptLoader<H>,
    ) -> Result<CompiledScript<R, H>, CompileRejection<H>> {
        match self.compile_unit::<R, H>(context, &loader) {
            Ok(unit) => Ok(CompiledScript::new(unit, context.source().clone(), loader)),
            Err(error) => Err(CompileRejection { error, loader }),
        }
    }

    fn compile_unit<R: ReturnValue, H: ScriptHost>(
        &self,
        context: &ScriptContext,
        loader: &ScriptLoader<H>,
    ) -> Result<CompiledUnit, ScriptError> {
        context.validate()?;

        let assets = resolve_runtime_assets(
            self.dependencies.as_ref(),
            context.working_directory(),
            context.profile(),
            self.runtime,
        )?;

        let configuration = build_configuration(context, &self.policy);
        let configuration = augment(
            configuration,
            self.host_runtime.as_ref(),
            &self.inheritance,
            self.runtime,
        )?;
        let references = assets.library_assets();
        if references.len() < assets.len() {
            debug!(
                skipped = assets.len() - references.len(),
                "default assets replaced by platform assets"
            );
        }
        let configuration = configuration.with_references(references.into_iter().map(|asset| {
            debug!(asset = %asset.display(), "adding runtime asset reference");
            MetadataReference::file(asset)
        }));

        let members = H::members();
        let unit = self.engine.compile(CompileRequest {
            source: context.source(),
            configuration: &configuration,
            host_members: &members,
            session: loader.symbols(),
            return_kind: R::KIND,
        });

        triage(unit).map_err(ScriptError::from)
    }
}

/// Put diagnostics in report order and decide the outcome.
///
/// Any error fails the compilation with the complete ordered list; each
/// diagnostic is logged at its own severity first.
pub fn triage(mut unit: CompiledUnit) -> Result<CompiledUnit, CompilationError> {
    sort_diagnostics(&mut unit.diagnostics);

    if has_errors(&unit.diagnostics) {
        for diagnostic in &unit.diagnostics {
            match diagnostic.severity {
                Severity::Error => error!(code = diagnostic.code, "{diagnostic}"),
                Severity::Warning => warn!(code = diagnostic.code, "{diagnostic}"),
                Severity::Info => info!(code = diagnostic.code, "{diagnostic}"),
            }
        }
        return Err(CompilationError::new(unit.diagnostics));
    }

    for diagnostic in &unit.diagnostics {
        debug!(code = diagnostic.code, severity = %diagnostic.severity, "{diagnostic}");
    }
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;
    use crate::span::Span;

    fn unit_with(diagnostics: Vec<Diagnostic>) -> CompiledUnit {
        CompiledUnit {
            diagnostics,
            ..CompiledUnit::default()
        }
    }

    #[test]
    fn errors_sort_before_earlier_warnings() {
        let unit = unit_with(vec![
            Diagnostic::warning("W1", "w", Span::new(50, 51)),
            Diagnostic::error("E1", "e", Span::new(10, 11)),
        ]);
        let error = triage(unit).expect_err("should fail");
        let codes: Vec<_> = error.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, ["E1", "W1"]);
        assert_eq!(error.message, crate::error::COMPILATION_FAILED);
    }

    #[test]
    fn warnings_alone_succeed_in_order() {
        let unit = unit_with(vec![
            Diagnostic::info("I1", "i", Span::new(0, 1)),
            Diagnostic::warning("W2", "w", Span::new(9, 10)),
            Diagnostic::warning("W1", "w", Span::new(3, 4)),
        ]);
        let unit = triage(unit).expect("should succeed");
        let codes: Vec<_> = unit.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, ["W1", "W2", "I1"]);
    }

    #[test]
    fn equal_keys_keep_engine_order() {
        let unit = unit_with(vec![
            Diagnostic::error("E2", "second", Span::new(4, 5)),
            Diagnostic::error("E1", "first", Span::new(4, 8)),
        ]);
        let error = triage(unit).expect_err("should fail");
        let codes: Vec<_> = error.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, ["E2", "E1"]);
    }
}
