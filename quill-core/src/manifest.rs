//! Dependency manifest reading.
//!
//! A working directory declares its dependencies in `quill.deps.json`:
//!
//! ```json
//! {
//!   "profiles": { "debug": { "dependencies": ["json"] } },
//!   "packages": {
//!     "json": {
//!       "version": "1.2.0",
//!       "path": "packages/json",
//!       "runtime": ["lib/json.wasm"],
//!       "runtimeTargets": [{ "runtime": "linux", "assets": ["native/linux/json.wasm"] }],
//!       "dependencies": ["text"]
//!     }
//!   }
//! }
//! ```
//!
//! The reader turns a profile into the transitive set of packages it
//! depends on. Asset paths stay unresolved here; the asset resolver joins
//! them onto each node's base directory.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ResolutionError;

/// File name looked up in the working directory.
pub const MANIFEST_FILE: &str = "quill.deps.json";

/// Yields the dependency graph of a working directory.
pub trait DependencyProvider {
    fn dependency_graph(
        &self,
        working_directory: &Path,
        profile: &str,
    ) -> Result<DependencyGraph, ResolutionError>;
}

/// Every package a profile needs, each exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    pub nodes: Vec<DependencyNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub name: String,
    pub version: String,
    /// Directory asset paths are relative to.
    pub base_directory: PathBuf,
    /// Assets used on every platform.
    pub runtime: Vec<String>,
    /// Assets used only on the tagged platform.
    pub runtime_targets: Vec<RuntimeTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuntimeTarget {
    pub runtime: String,
    #[serde(default)]
    pub assets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    profiles: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    packages: BTreeMap<String, PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct ProfileEntry {
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageEntry {
    #[serde(default)]
    version: String,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    runtime: Vec<String>,
    #[serde(default)]
    runtime_targets: Vec<RuntimeTarget>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Reads `quill.deps.json` from the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestReader;

impl DependencyProvider for ManifestReader {
    fn dependency_graph(
        &self,
        working_directory: &Path,
        profile: &str,
    ) -> Result<DependencyGraph, ResolutionError> {
        let path = working_directory.join(MANIFEST_FILE);
        let manifest = load_manifest(&path)?;
        let graph = flatten(&manifest, working_directory, profile)?;
        debug!(
            manifest = %path.display(),
            profile,
            packages = graph.nodes.len(),
            "loaded dependency manifest"
        );
        Ok(graph)
    }
}

fn load_manifest(path: &Path) -> Result<Manifest, ResolutionError> {
    if !path.is_file() {
        return Err(ResolutionError::MissingManifest(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| ResolutionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ResolutionError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Breadth-first walk from the profile's root dependencies.
fn flatten(
    manifest: &Manifest,
    root: &Path,
    profile: &str,
) -> Result<DependencyGraph, ResolutionError> {
    let entry = manifest
        .profiles
        .get(profile)
        .ok_or_else(|| ResolutionError::UnknownProfile(profile.to_string()))?;

    let mut queue: VecDeque<(&str, &str)> = entry
        .dependencies
        .iter()
        .map(|name| (name.as_str(), profile))
        .collect();
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();

    while let Some((name, referrer)) = queue.pop_front() {
        if !seen.insert(name) {
            continue;
        }
        let package =
            manifest
                .packages
                .get(name)
                .ok_or_else(|| ResolutionError::UnknownPackage {
                    package: name.to_string(),
                    referrer: referrer.to_string(),
                })?;
        for dependency in &package.dependencies {
            queue.push_back((dependency.as_str(), name));
        }
        let base_directory = match &package.path {
            Some(path) => root.join(path),
            None => root.to_path_buf(),
        };
        nodes.push(DependencyNode {
            name: name.to_string(),
            version: package.version.clone(),
            base_directory,
            runtime: package.runtime.clone(),
            runtime_targets: package.runtime_targets.clone(),
        });
    }

    Ok(DependencyGraph { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, json: &str) {
        fs::write(dir.join(MANIFEST_FILE), json).expect("write manifest");
    }

    #[test]
    fn walks_transitive_dependencies_once() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{
                "profiles": { "debug": { "dependencies": ["app", "text"] } },
                "packages": {
                    "app": { "version": "1.0.0", "path": "pkgs/app", "dependencies": ["text"] },
                    "text": { "version": "2.0.0", "runtime": ["text.wasm"] }
                }
            }"#,
        );

        let graph = ManifestReader
            .dependency_graph(dir.path(), "debug")
            .expect("graph");
        let names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["app", "text"]);
        assert_eq!(graph.nodes[0].base_directory, dir.path().join("pkgs/app"));
        assert_eq!(graph.nodes[1].base_directory, dir.path());
        assert_eq!(graph.nodes[1].runtime, ["text.wasm"]);
    }

    #[test]
    fn profile_without_dependencies_yields_empty_graph() {
        let dir = tempdir().expect("tempdir");
        write_manifest(dir.path(), r#"{ "profiles": { "release": {} } }"#);
        let graph = ManifestReader
            .dependency_graph(dir.path(), "release")
            .expect("graph");
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn reports_missing_manifest() {
        let dir = tempdir().expect("tempdir");
        let err = ManifestReader
            .dependency_graph(dir.path(), "debug")
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MissingManifest(_)));
    }

    #[test]
    fn reports_malformed_manifest() {
        let dir = tempdir().expect("tempdir");
        write_manifest(dir.path(), "{ \"profiles\": [");
        let err = ManifestReader
            .dependency_graph(dir.path(), "debug")
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Malformed { .. }));
    }

    #[test]
    fn reports_unknown_profile_and_package() {
        let dir = tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{ "profiles": { "debug": { "dependencies": ["ghost"] } } }"#,
        );
        let err = ManifestReader
            .dependency_graph(dir.path(), "release")
            .unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownProfile(p) if p == "release"));

        let err = ManifestReader
            .dependency_graph(dir.path(), "debug")
            .unwrap_err();
        assert!(
            matches!(err, ResolutionError::UnknownPackage { package, referrer } if package == "ghost" && referrer == "debug")
        );
    }
}
