//! Incremental loader: the long-lived state of a scripting session.
//!
//! Each successful submission is instantiated next to the ones before it.
//! Variables it declares are published under `submission#<n>` so later
//! submissions can import them, and each referenced library is instantiated
//! once per session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use wasmi::{Engine, Extern, Linker, Module, Store};

use crate::engine::{CompiledUnit, ENTRY_POINT, LibraryImage};
use crate::error::ScriptError;
use crate::script::ReturnValue;

/// Namespace host functions are linked under.
pub const HOST_MODULE: &str = "host";

/// A host function scripts may call. Every parameter and the result are
/// `int`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMember {
    pub name: String,
    pub arity: u32,
}

impl HostMember {
    pub fn new(name: impl Into<String>, arity: u32) -> Self {
        HostMember {
            name: name.into(),
            arity,
        }
    }
}

/// The object scripts run against.
///
/// `members` describes the functions `link` defines under [`HOST_MODULE`].
/// The host object is the store data, so linked functions reach it through
/// `Caller::data_mut`.
pub trait ScriptHost: Sized + 'static {
    fn members() -> Vec<HostMember>;

    fn link(linker: &mut Linker<Self>) -> Result<(), wasmi::Error>;
}

/// A host without members.
impl ScriptHost for () {
    fn members() -> Vec<HostMember> {
        Vec::new()
    }

    fn link(_linker: &mut Linker<Self>) -> Result<(), wasmi::Error> {
        Ok(())
    }
}

/// A variable published by an earlier submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVariable {
    pub name: String,
    /// Import module the variable is published under.
    pub module: String,
}

/// Variables declared by the session's executed submissions, and the
/// library modules bound so far.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionSymbols {
    submissions: u32,
    variables: Vec<SessionVariable>,
    libraries: BTreeMap<String, Arc<[u8]>>,
}

impl SessionSymbols {
    /// Number of submissions that ran to completion.
    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn variables(&self) -> &[SessionVariable] {
        &self.variables
    }

    /// The most recent declaration of `name`.
    pub fn lookup(&self, name: &str) -> Option<&SessionVariable> {
        self.variables
            .iter()
            .rev()
            .find(|variable| variable.name == name)
    }

    /// Module image bound to the library namespace `name`.
    pub fn library(&self, name: &str) -> Option<&[u8]> {
        self.libraries.get(name).map(|bytes| &bytes[..])
    }

    pub(crate) fn bind_library(&mut self, name: &str, bytes: Arc<[u8]>) {
        self.libraries.insert(name.to_string(), bytes);
    }

    fn next_module(&self) -> String {
        submission_module(self.submissions)
    }

    /// Publish the declarations of the next submission.
    pub(crate) fn record(&mut self, names: impl IntoIterator<Item = String>) {
        let module = self.next_module();
        self.variables
            .extend(names.into_iter().map(|name| SessionVariable {
                name,
                module: module.clone(),
            }));
        self.submissions += 1;
    }
}

pub fn submission_module(index: u32) -> String {
    format!("submission#{index}")
}

/// Owns the wasm engine, the store holding the host object, and the linker
/// every submission is instantiated with.
///
/// There is exactly one owner at a time: a loader moves into each
/// [`CompiledScript`](crate::CompiledScript) and back out of it.
pub struct ScriptLoader<H: ScriptHost> {
    engine: Engine,
    store: Store<H>,
    linker: Linker<H>,
    symbols: SessionSymbols,
}

impl<H: ScriptHost> ScriptLoader<H> {
    pub fn new(host: H) -> Result<Self, ScriptError> {
        let engine = Engine::default();
        let store = Store::new(&engine, host);
        let mut linker = Linker::new(&engine);
        H::link(&mut linker).map_err(ScriptError::runtime)?;
        Ok(ScriptLoader {
            engine,
            store,
            linker,
            symbols: SessionSymbols::default(),
        })
    }

    pub fn symbols(&self) -> &SessionSymbols {
        &self.symbols
    }

    /// Libraries instantiated so far.
    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.symbols.libraries.keys().map(String::as_str)
    }

    pub fn host(&self) -> &H {
        self.store.data()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.store.data_mut()
    }

    pub fn into_host(self) -> H {
        self.store.into_data()
    }

    pub(crate) fn execute<R: ReturnValue>(&mut self, unit: &CompiledUnit) -> Result<R, ScriptError> {
        for library in &unit.libraries {
            self.link_library(library)?;
        }

        let module = Module::new(&self.engine, &unit.wasm[..]).map_err(ScriptError::runtime)?;
        let instance = self
            .linker
            .instantiate_and_start(&mut self.store, &module)
            .map_err(ScriptError::runtime)?;
        let main = instance
            .get_typed_func::<(), R::Raw>(&self.store, ENTRY_POINT)
            .map_err(ScriptError::runtime)?;
        let raw = main.call(&mut self.store, ()).map_err(ScriptError::runtime)?;

        let module_name = self.symbols.next_module();
        for name in &unit.declarations {
            let global = instance.get_global(&self.store, name).ok_or_else(|| {
                ScriptError::Runtime(format!("declared variable '{name}' is not exported"))
            })?;
            self.linker
                .define(&module_name, name, global)
                .map_err(ScriptError::runtime)?;
        }
        self.symbols.record(unit.declarations.iter().cloned());
        debug!(
            module = %module_name,
            declarations = unit.declarations.len(),
            "submission executed"
        );

        Ok(R::from_raw(raw))
    }

    fn link_library(&mut self, library: &LibraryImage) -> Result<(), ScriptError> {
        match self.symbols.library(&library.name) {
            Some(bound) if bound == &library.bytes[..] => return Ok(()),
            Some(_) => {
                return Err(ScriptError::Runtime(format!(
                    "library '{}' is already bound to a different module",
                    library.name
                )));
            }
            None => {}
        }
        let module = Module::new(&self.engine, &library.bytes[..]).map_err(ScriptError::runtime)?;
        let instance = self
            .linker
            .instantiate_and_start(&mut self.store, &module)
            .map_err(ScriptError::runtime)?;
        let exports: Vec<(String, Extern)> = instance
            .exports(&self.store)
            .map(|export| (export.name().to_string(), export.into_extern()))
            .collect();
        for (name, item) in exports {
            self.linker
                .define(&library.name, &name, item)
                .map_err(ScriptError::runtime)?;
        }
        self.symbols
            .bind_library(&library.name, Arc::clone(&library.bytes));
        debug!(library = %library.name, "library instantiated");
        Ok(())
    }
}

impl fmt::Debug for SessionSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSymbols")
            .field("submissions", &self.submissions)
            .field("variables", &self.variables)
            .field("libraries", &self.libraries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<H: ScriptHost> fmt::Debug for ScriptLoader<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("symbols", &self.symbols)
            .finish_non_exhaustive()
    }
}
