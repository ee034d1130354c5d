//! Honeyfile Registry
//!
//! Canonical path -> decoy id mapping plus the set of watched root directories.
//! All reads and writes go through one lock, so a rename is never observed
//! half-applied.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};

use parking_lot::RwLock;

use super::types::DecoyRecord;

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    paths: HashMap<PathBuf, String>,
    seeds: HashMap<String, BTreeSet<PathBuf>>,
    roots: BTreeSet<PathBuf>,
}

/// Copy of the registry at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub paths: HashMap<PathBuf, String>,
    pub watched_roots: BTreeSet<PathBuf>,
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Default)]
pub struct HoneyfileRegistry {
    state: RwLock<RegistryState>,
}

impl HoneyfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a honeyfile and its seed locations.
    ///
    /// Every existing file in a seed directory with the same file name as `path`
    /// is tracked under the same decoy id. Missing seed directories are skipped.
    pub fn register(&self, path: &Path, decoy_id: &str, seed_locations: &[PathBuf]) {
        let canonical = normalize_path(path);
        let basename = canonical.file_name().map(|n| n.to_os_string());

        // Filesystem work happens before taking the lock
        let mut roots = Vec::new();
        let mut copies = Vec::new();
        for seed in seed_locations {
            if !seed.is_dir() {
                log::debug!("Seed location {} does not exist yet, skipping", seed.display());
                continue;
            }
            let seed_dir = normalize_path(seed);

            if let Some(name) = &basename {
                match fs::read_dir(&seed_dir) {
                    Ok(entries) => {
                        for entry in entries.flatten() {
                            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                            if is_file && entry.file_name() == *name {
                                copies.push(normalize_path(&entry.path()));
                            }
                        }
                    }
                    Err(e) => log::warn!("Cannot list seed location {}: {}", seed_dir.display(), e),
                }
            }
            roots.push(seed_dir);
        }

        let mut state = self.state.write();
        state.paths.insert(canonical.clone(), decoy_id.to_string());
        for copy in copies {
            state.paths.insert(copy, decoy_id.to_string());
        }
        let seeds = state.seeds.entry(decoy_id.to_string()).or_default();
        seeds.extend(roots.iter().cloned());
        state.roots.extend(roots);

        log::info!("Registered honeyfile {} -> {}", canonical.display(), decoy_id);
    }

    /// Decoy id for `path`, if tracked
    pub fn lookup(&self, path: &Path) -> Option<String> {
        let canonical = normalize_path(path);
        self.state.read().paths.get(&canonical).cloned()
    }

    /// Lookup for a path that is already canonical (classifier hot path)
    pub fn lookup_canonical(&self, canonical: &Path) -> Option<String> {
        self.state.read().paths.get(canonical).cloned()
    }

    /// Move a tracked mapping from `old_path` to `new_path`.
    ///
    /// Returns the decoy id when `old_path` was tracked.
    pub fn rename(&self, old_path: &Path, new_path: &Path) -> Option<String> {
        let old = normalize_path(old_path);
        let new = normalize_path(new_path);
        self.rename_canonical(&old, &new)
    }

    pub(crate) fn rename_canonical(&self, old: &Path, new: &Path) -> Option<String> {
        let mut state = self.state.write();
        let decoy_id = state.paths.remove(old)?;
        state.paths.insert(new.to_path_buf(), decoy_id.clone());
        log::info!("Honeyfile {} moved: {} -> {}", decoy_id, old.display(), new.display());
        Some(decoy_id)
    }

    /// Add a directory to the watched roots (used by explicit start directories)
    pub fn add_watched_root(&self, dir: &Path) {
        let canonical = normalize_path(dir);
        self.state.write().roots.insert(canonical);
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.state.read().roots.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root_count(&self) -> usize {
        self.state.read().roots.len()
    }

    /// Copy of the mapping and watched roots
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read();
        RegistrySnapshot {
            paths: state.paths.clone(),
            watched_roots: state.roots.clone(),
        }
    }

    /// All tracked paths as records, sorted by path
    pub fn records(&self) -> Vec<DecoyRecord> {
        let state = self.state.read();
        let mut records: Vec<DecoyRecord> = state
            .paths
            .iter()
            .map(|(path, decoy_id)| DecoyRecord {
                decoy_id: decoy_id.clone(),
                canonical_path: path.clone(),
                seed_roots: state.seeds.get(decoy_id).cloned().unwrap_or_default(),
            })
            .collect();
        records.sort_by(|a, b| a.canonical_path.cmp(&b.canonical_path));
        records
    }

    /// Drop everything (engine teardown)
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.paths.clear();
        state.seeds.clear();
        state.roots.clear();
    }
}

// ============================================================================
// PATH NORMALIZATION
// ============================================================================

/// Absolute, symlink-resolved form of `path`.
///
/// Paths that no longer exist (e.g. the source of a rename) are cleaned
/// lexically and resolved through their parent directory when possible.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let cleaned = clean_lexically(&absolute);

    match (cleaned.parent(), cleaned.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| cleaned.clone()),
        _ => cleaned,
    }
}

fn clean_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
