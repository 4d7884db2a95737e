//! Runtime asset resolution.
//!
//! Turns the dependency graph of a working directory into the set of
//! library files a script needs on the current platform.

use std::collections::BTreeSet;
use std::collections::btree_set;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::ResolutionError;
use crate::manifest::{DependencyNode, DependencyProvider};
use crate::runtime_id::RuntimeId;

/// Extension of library files picked up from asset directories.
pub const LIBRARY_EXTENSION: &str = "wasm";

/// Unique, lexically normalized paths of runtime assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeAssetSet {
    paths: BTreeSet<PathBuf>,
    /// Paths contributed by a platform-specific group.
    platform: BTreeSet<PathBuf>,
}

impl RuntimeAssetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns false when it was already present.
    pub fn insert(&mut self, path: impl AsRef<Path>) -> bool {
        self.paths.insert(normalize_path_lexically(path.as_ref()))
    }

    /// Add a platform-specific path; returns false when it was already
    /// present.
    pub fn insert_platform(&mut self, path: impl AsRef<Path>) -> bool {
        let path = normalize_path_lexically(path.as_ref());
        self.platform.insert(path.clone());
        self.paths.insert(path)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.paths
            .contains(&normalize_path_lexically(path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// The assets to reference, one per library name. A platform asset
    /// replaces every default asset with the same file stem.
    pub fn library_assets(&self) -> Vec<&Path> {
        let overridden: BTreeSet<&OsStr> = self
            .platform
            .iter()
            .filter_map(|path| path.file_stem())
            .collect();
        self.paths
            .iter()
            .filter(|path| {
                self.platform.contains(*path)
                    || !path
                        .file_stem()
                        .is_some_and(|stem| overridden.contains(stem))
            })
            .map(PathBuf::as_path)
            .collect()
    }
}

impl IntoIterator for RuntimeAssetSet {
    type Item = PathBuf;
    type IntoIter = btree_set::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}

/// Resolve every runtime asset the profile needs on `runtime`.
///
/// Default assets of every node are added first, then each node's
/// platform-specific groups whose tag matches `runtime`. Both passes add to
/// the same set, so a node may contribute a default and a platform asset at
/// once, and a file reachable through several nodes appears once. When the
/// script is compiled, [`RuntimeAssetSet::library_assets`] lets a platform
/// asset stand in for a default asset of the same name.
pub fn resolve_runtime_assets(
    provider: &dyn DependencyProvider,
    working_directory: &Path,
    profile: &str,
    runtime: RuntimeId,
) -> Result<RuntimeAssetSet, ResolutionError> {
    let graph = provider.dependency_graph(working_directory, profile)?;
    let mut assets = RuntimeAssetSet::new();

    for node in &graph.nodes {
        for asset in &node.runtime {
            add_asset(&mut assets, node, asset, None)?;
        }
    }

    for node in &graph.nodes {
        for group in node
            .runtime_targets
            .iter()
            .filter(|group| runtime.matches(&group.runtime))
        {
            for asset in &group.assets {
                add_asset(&mut assets, node, asset, Some(runtime))?;
            }
        }
    }

    Ok(assets)
}

fn add_asset(
    assets: &mut RuntimeAssetSet,
    node: &DependencyNode,
    asset: &str,
    runtime: Option<RuntimeId>,
) -> Result<(), ResolutionError> {
    let path = node.base_directory.join(asset);
    let files = if asset.ends_with('/') || asset.ends_with('\\') {
        expand_directory(&path)?
    } else {
        vec![path]
    };
    for file in files {
        let added = match runtime {
            Some(_) => assets.insert_platform(&file),
            None => assets.insert(&file),
        };
        if added {
            debug!(
                package = %node.name,
                version = %node.version,
                runtime = runtime.map(RuntimeId::tag).unwrap_or("any"),
                path = %file.display(),
                "discovered runtime asset"
            );
        }
    }
    Ok(())
}

fn expand_directory(directory: &Path) -> Result<Vec<PathBuf>, ResolutionError> {
    if !directory.is_dir() {
        return Err(ResolutionError::MissingAsset(directory.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == LIBRARY_EXTENSION)
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Remove `.` and resolve `..` components without touching the file
/// system.
pub fn normalize_path_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
