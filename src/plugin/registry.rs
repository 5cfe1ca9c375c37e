//! Plugin resolution: stable plugin names to (host, bundle) pairs.
//!
//! The pipeline only needs `resolve(name)`. Where the bundles live (a fixed
//! table, a scanned directory, overrides from the config file) is decided by
//! the registry implementation handed to the renderer.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::defaults::plugin_names;

/// A resolved plugin: the host executable and the bundle it should load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginHandle {
    pub host: PathBuf,
    pub plugin: PathBuf,
}

impl PluginHandle {
    pub fn new(host: impl Into<PathBuf>, plugin: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            plugin: plugin.into(),
        }
    }

    pub fn host_exists(&self) -> bool {
        self.host.exists()
    }

    pub fn plugin_exists(&self) -> bool {
        self.plugin.exists()
    }

    /// Both the host and the bundle are present on disk.
    pub fn exists(&self) -> bool {
        self.host_exists() && self.plugin_exists()
    }

    /// Directory the host runs in: the bundle's parent, so plugins that load
    /// sibling resources by relative path find them.
    pub fn working_dir(&self) -> Option<&Path> {
        self.plugin.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

/// Looks up plugins by stable name.
pub trait PluginRegistry: Send + Sync {
    /// Plugin host executable shared by every handle.
    fn host(&self) -> &Path;

    /// Resolves `name` to a handle. The handle may still point at missing
    /// files; callers check `PluginHandle::exists` before invoking.
    fn resolve(&self, name: &str) -> Option<PluginHandle>;

    /// Names this registry knows about, for diagnostics.
    fn known_plugins(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<R: PluginRegistry + ?Sized> PluginRegistry for Box<R> {
    fn host(&self) -> &Path {
        (**self).host()
    }

    fn resolve(&self, name: &str) -> Option<PluginHandle> {
        (**self).resolve(name)
    }

    fn known_plugins(&self) -> Vec<String> {
        (**self).known_plugins()
    }
}

/// Canonical lookup key: lowercase with separators removed, so `EQ 1`,
/// `eq-1` and `eq_1` all map to `eq1`.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// First of `names` that resolves to an existing handle.
pub fn resolve_existing(registry: &dyn PluginRegistry, names: &[&str]) -> Option<PluginHandle> {
    names
        .iter()
        .filter_map(|name| registry.resolve(name))
        .find(PluginHandle::plugin_exists)
}

/// Which main chain a registry resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainVariant {
    Primary,
    Fallback,
}

impl MainVariant {
    pub fn plugin_name(self) -> &'static str {
        match self {
            Self::Primary => plugin_names::MAIN,
            Self::Fallback => plugin_names::MAIN_FALLBACK,
        }
    }
}

/// Resolves the main chain, preferring the primary plugin.
///
/// With `require_primary` the fallback is never used.
pub fn resolve_main(
    registry: &dyn PluginRegistry,
    require_primary: bool,
) -> Option<(PluginHandle, MainVariant)> {
    if let Some(handle) = resolve_existing(registry, &[plugin_names::MAIN]) {
        return Some((handle, MainVariant::Primary));
    }
    if require_primary {
        return None;
    }
    resolve_existing(registry, &[plugin_names::MAIN_FALLBACK])
        .map(|handle| (handle, MainVariant::Fallback))
}

/// Fixed name-to-bundle table.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    host: PathBuf,
    plugins: HashMap<String, PathBuf>,
}

impl StaticRegistry {
    pub fn new(host: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            plugins: HashMap::new(),
        }
    }

    pub fn with_plugin(mut self, name: &str, bundle: impl Into<PathBuf>) -> Self {
        self.insert(name, bundle);
        self
    }

    pub fn insert(&mut self, name: &str, bundle: impl Into<PathBuf>) {
        self.plugins.insert(normalize_name(name), bundle.into());
    }
}

impl PluginRegistry for StaticRegistry {
    fn host(&self) -> &Path {
        &self.host
    }

    fn resolve(&self, name: &str) -> Option<PluginHandle> {
        self.plugins
            .get(&normalize_name(name))
            .map(|bundle| PluginHandle::new(&self.host, bundle))
    }

    fn known_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Registry backed by a recursive scan of a plugin directory.
///
/// Lookup order: explicit overrides, exact (normalized) bundle stem, the
/// plugin-project layout `<base>/<Name>/Binaries/Compiled/VST3/<Name>.vst3`,
/// then the first indexed stem containing the name.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    host: PathBuf,
    base_dir: PathBuf,
    index: BTreeMap<String, PathBuf>,
    overrides: HashMap<String, PathBuf>,
}

const BUNDLE_EXTENSION: &str = "vst3";

fn is_bundle(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(BUNDLE_EXTENSION))
}

impl DirectoryRegistry {
    /// Scans `base_dir`. A missing or unreadable directory yields an empty index.
    pub fn scan(host: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let index = Self::build_index(&base_dir);
        debug!(
            base_dir = %base_dir.display(),
            plugins = index.len(),
            "indexed plugin directory"
        );
        Self {
            host: host.into(),
            base_dir,
            index,
            overrides: HashMap::new(),
        }
    }

    /// Adds explicit name-to-bundle overrides; they win over the scan.
    pub fn with_overrides<I, S, P>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: AsRef<str>,
        P: Into<PathBuf>,
    {
        for (name, path) in overrides {
            self.overrides.insert(normalize_name(name.as_ref()), path.into());
        }
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn build_index(base_dir: &Path) -> BTreeMap<String, PathBuf> {
        let mut index: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut walker = WalkDir::new(base_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if entry.depth() == 0 || !is_bundle(path) {
                continue;
            }
            let is_dir = entry.file_type().is_dir();
            if is_dir {
                // Inner binaries of a bundle share its stem.
                walker.skip_current_dir();
            }
            let Some(stem) = path.file_stem().map(|s| normalize_name(&s.to_string_lossy())) else {
                continue;
            };
            match index.get(&stem) {
                None => {
                    index.insert(stem, path.to_path_buf());
                }
                Some(existing) if is_dir && !existing.is_dir() => {
                    index.insert(stem, path.to_path_buf());
                }
                Some(_) => {}
            }
        }
        index
    }

    fn project_layout(&self, name: &str) -> Option<PathBuf> {
        let mut candidates = vec![name.to_string(), name.to_lowercase(), name.to_uppercase()];
        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            candidates.push(first.to_uppercase().chain(chars).collect());
        }
        candidates.into_iter().find_map(|candidate| {
            let path = self
                .base_dir
                .join(&candidate)
                .join("Binaries")
                .join("Compiled")
                .join("VST3")
                .join(format!("{candidate}.{BUNDLE_EXTENSION}"));
            path.exists().then_some(path)
        })
    }
}

impl PluginRegistry for DirectoryRegistry {
    fn host(&self) -> &Path {
        &self.host
    }

    fn resolve(&self, name: &str) -> Option<PluginHandle> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        let bundle = self
            .overrides
            .get(&key)
            .or_else(|| self.index.get(&key))
            .cloned()
            .or_else(|| self.project_layout(name))
            .or_else(|| {
                self.index
                    .iter()
                    .find(|(stem, _)| stem.contains(&key))
                    .map(|(_, path)| path.clone())
            })?;
        Some(PluginHandle::new(&self.host, bundle))
    }

    fn known_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .index
            .keys()
            .chain(self.overrides.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
