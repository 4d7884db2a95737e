//! References inherited from modules the host has already loaded.
//!
//! A script must see exactly the runtime and toolchain modules the host
//! itself runs with. Those come from the host's registry of loaded modules,
//! never from the dependency manifest.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{CompilationConfiguration, MetadataReference};
use crate::error::ScriptError;
use crate::runtime_id::RuntimeId;
use crate::stdlib::{RUNTIME_LIBRARY, SCRIPTING_LIBRARY, runtime_library, scripting_library};

/// Identity of a module loaded into the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    pub name: String,
    pub version: String,
}

impl ModuleIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        ModuleIdentity {
            name: name.into(),
            version: version.into(),
        }
    }

    /// `"{name}, version={version}"`, the string allow-list prefixes are
    /// matched against.
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, version={}", self.name, self.version)
    }
}

/// The host process's view of the modules it has loaded.
pub trait HostRuntime {
    fn loaded_modules(&self) -> Vec<ModuleIdentity>;

    /// Load a module by identity as a compilation reference.
    fn load(&self, identity: &ModuleIdentity) -> Result<MetadataReference, ScriptError>;
}

/// In-memory registry of loaded modules.
#[derive(Debug, Clone, Default)]
pub struct HostModuleRegistry {
    modules: Vec<(ModuleIdentity, Arc<[u8]>)>,
}

impl HostModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of a standard quill host: the `runtime` and
    /// `quill.scripting` libraries at the toolchain's version.
    pub fn standard() -> Self {
        let version = env!("CARGO_PKG_VERSION");
        HostModuleRegistry::new()
            .with_module(ModuleIdentity::new(RUNTIME_LIBRARY, version), runtime_library())
            .with_module(ModuleIdentity::new(SCRIPTING_LIBRARY, version), scripting_library())
    }

    pub fn with_module(mut self, identity: ModuleIdentity, image: impl Into<Arc<[u8]>>) -> Self {
        self.register(identity, image);
        self
    }

    /// Record a loaded module, replacing an earlier module of the same
    /// identity.
    pub fn register(&mut self, identity: ModuleIdentity, image: impl Into<Arc<[u8]>>) {
        let image = image.into();
        match self.modules.iter_mut().find(|(known, _)| *known == identity) {
            Some(entry) => entry.1 = image,
            None => self.modules.push((identity, image)),
        }
    }
}

impl HostRuntime for HostModuleRegistry {
    fn loaded_modules(&self) -> Vec<ModuleIdentity> {
        self.modules
            .iter()
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    fn load(&self, identity: &ModuleIdentity) -> Result<MetadataReference, ScriptError> {
        self.modules
            .iter()
            .find(|(known, _)| known == identity)
            .map(|(known, image)| MetadataReference::image(known.name.clone(), Arc::clone(image)))
            .ok_or_else(|| ScriptError::runtime(format!("host module {identity} is not loaded")))
    }
}

/// Allow-list of module name prefixes that scripts inherit from the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InheritancePolicy {
    pub prefixes: Vec<String>,
}

impl InheritancePolicy {
    /// The core runtime family, the compiler-service family and the
    /// foundational runtime library.
    pub fn standard() -> Self {
        InheritancePolicy {
            prefixes: vec![
                "core.".to_string(),
                SCRIPTING_LIBRARY.to_string(),
                RUNTIME_LIBRARY.to_string(),
            ],
        }
    }

    /// ASCII case-insensitive prefix match on the identity's full name.
    pub fn allows(&self, identity: &ModuleIdentity) -> bool {
        let full_name = identity.full_name();
        self.prefixes.iter().any(|prefix| {
            full_name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }
}

/// Add every allow-listed host module as a reference.
pub fn augment(
    configuration: CompilationConfiguration,
    host: &dyn HostRuntime,
    policy: &InheritancePolicy,
    runtime: RuntimeId,
) -> Result<CompilationConfiguration, ScriptError> {
    let mut inherited = Vec::new();
    for identity in host.loaded_modules() {
        if !policy.allows(&identity) {
            continue;
        }
        debug!(module = %identity, runtime = %runtime, "inheriting host module");
        inherited.push(host.load(&identity)?);
    }
    Ok(configuration.with_references(inherited))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionPolicy;

    fn empty_configuration() -> CompilationConfiguration {
        CompilationConfiguration::new(ResolutionPolicy::relative_to("/work"))
    }

    #[test]
    fn prefixes_match_case_insensitively() {
        let policy = InheritancePolicy::standard();
        assert!(policy.allows(&ModuleIdentity::new("Core.Collections", "1.0")));
        assert!(policy.allows(&ModuleIdentity::new("QUILL.SCRIPTING", "0.1.0")));
        assert!(policy.allows(&ModuleIdentity::new("runtime", "0.1.0")));
        assert!(!policy.allows(&ModuleIdentity::new("core", "1.0")));
        assert!(!policy.allows(&ModuleIdentity::new("json", "1.0")));
    }

    #[test]
    fn multibyte_names_do_not_panic() {
        let policy = InheritancePolicy::standard();
        assert!(!policy.allows(&ModuleIdentity::new("ü", "1")));
    }

    #[test]
    fn adds_only_allow_listed_modules() {
        let registry = HostModuleRegistry::standard()
            .with_module(ModuleIdentity::new("telemetry", "2.0"), vec![0u8])
            .with_module(ModuleIdentity::new("core.text", "1.0"), vec![1u8]);

        let config = augment(
            empty_configuration(),
            &registry,
            &InheritancePolicy::standard(),
            RuntimeId::Linux,
        )
        .expect("augment");

        let names: Vec<_> = config
            .references()
            .iter()
            .map(MetadataReference::library_name)
            .collect();
        assert_eq!(names, ["runtime", "quill.scripting", "core.text"]);
    }

    #[test]
    fn empty_policy_inherits_nothing() {
        let config = augment(
            empty_configuration(),
            &HostModuleRegistry::standard(),
            &InheritancePolicy::default(),
            RuntimeId::Windows,
        )
        .expect("augment");
        assert!(config.references().is_empty());
    }

    #[test]
    fn registering_an_identity_twice_replaces_the_image() {
        let identity = ModuleIdentity::new("runtime", "1.0");
        let registry = HostModuleRegistry::new()
            .with_module(identity.clone(), vec![1u8])
            .with_module(identity.clone(), vec![2u8]);
        assert_eq!(registry.loaded_modules().len(), 1);
        let reference = registry.load(&identity).expect("load");
        assert_eq!(&*reference.read().expect("read"), &[2u8]);
    }
}
