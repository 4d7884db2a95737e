//! The compiled artifact handed back to the host.

use std::marker::PhantomData;

use wasmi::WasmResults;

use crate::diagnostic::Diagnostic;
use crate::engine::CompiledUnit;
use crate::error::ScriptError;
use crate::loader::{ScriptHost, ScriptLoader};
use crate::source::ScriptSource;

/// What a submission's entry point returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Nothing; a trailing value is evaluated and dropped.
    Unit,
    /// The trailing expression, which must be present.
    Int,
    /// The trailing expression when there is one.
    OptionalInt,
}

/// Result types a script can be compiled for.
pub trait ReturnValue: Sized {
    const KIND: ReturnKind;

    /// What the entry point returns at the wasm boundary.
    type Raw: WasmResults;

    fn from_raw(raw: Self::Raw) -> Self;
}

impl ReturnValue for () {
    const KIND: ReturnKind = ReturnKind::Unit;
    type Raw = ();

    fn from_raw(_raw: ()) -> Self {}
}

impl ReturnValue for i32 {
    const KIND: ReturnKind = ReturnKind::Int;
    type Raw = i32;

    fn from_raw(raw: i32) -> Self {
        raw
    }
}

/// `(present, value)` at the boundary.
impl ReturnValue for Option<i32> {
    const KIND: ReturnKind = ReturnKind::OptionalInt;
    type Raw = (i32, i32);

    fn from_raw((present, value): (i32, i32)) -> Self {
        (present != 0).then_some(value)
    }
}

/// A successfully compiled script together with the loader that will run
/// it.
///
/// Compiling never executes anything; [`run`](CompiledScript::run) does,
/// at most once. [`into_loader`](CompiledScript::into_loader) hands the
/// session on to the next submission.
pub struct CompiledScript<R, H: ScriptHost> {
    unit: CompiledUnit,
    source: ScriptSource,
    loader: ScriptLoader<H>,
    executed: bool,
    _result: PhantomData<fn() -> R>,
}

impl<R: ReturnValue, H: ScriptHost> CompiledScript<R, H> {
    pub(crate) fn new(unit: CompiledUnit, source: ScriptSource, loader: ScriptLoader<H>) -> Self {
        CompiledScript {
            unit,
            source,
            loader,
            executed: false,
            _result: PhantomData,
        }
    }

    pub fn run(&mut self) -> Result<R, ScriptError> {
        if self.executed {
            return Err(ScriptError::Runtime(
                "the script has already been run".to_string(),
            ));
        }
        self.executed = true;
        self.loader.execute::<R>(&self.unit)
    }

    /// The compiled module.
    pub fn wasm(&self) -> &[u8] {
        &self.unit.wasm
    }

    /// Warnings and informational diagnostics, in report order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.unit.diagnostics
    }

    pub fn declarations(&self) -> &[String] {
        &self.unit.declarations
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    pub fn loader(&self) -> &ScriptLoader<H> {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut ScriptLoader<H> {
        &mut self.loader
    }

    pub fn into_loader(self) -> ScriptLoader<H> {
        self.loader
    }
}
