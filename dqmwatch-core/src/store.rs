//! Persisted object stores used to read monitor elements and references.
//!
//! Stores are keyed by the object's full path, e.g. `/calo/energy`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dqmwatch_types::MonitorObject;
use tracing::{debug, warn};

use crate::error::{DqmError, Result};

/// Trait for anything that can hand out persisted objects.
///
/// # Example
///
/// ```rust
/// use dqmwatch_core::{MemoryStore, ObjectStore};
/// use dqmwatch_types::Scalar;
///
/// let mut store = MemoryStore::new();
/// store.insert("/run", Scalar::int("events", 1200).into());
///
/// assert!(store.get("/run/events").is_some());
/// assert!(store.get("/run/missing").is_none());
/// ```
pub trait ObjectStore: Send + Sync {
    /// Object stored under the full path `path`.
    fn get(&self, path: &str) -> Option<MonitorObject>;

    /// Human-readable description of the store.
    fn description(&self) -> &str;
}

/// Canonical full path of `name` in directory `dir`.
pub(crate) fn full_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else if dir.starts_with('/') {
        format!("{dir}/{name}")
    } else {
        format!("/{dir}/{name}")
    }
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: BTreeMap<String, MonitorObject>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `object` in directory `dir` under its own name.
    pub fn insert(&mut self, dir: &str, object: MonitorObject) -> Option<MonitorObject> {
        self.objects.insert(full_path(dir, object.name()), object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Stored full paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, path: &str) -> Option<MonitorObject> {
        self.objects.get(path).cloned()
    }

    fn description(&self) -> &str {
        "memory"
    }
}

impl FromIterator<(String, MonitorObject)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (String, MonitorObject)>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

/// A store read from a JSON file mapping full paths to objects.
///
/// The file is read once on creation and again on [`JsonFileStore::reload`].
/// Objects that fail their consistency check are skipped with a warning.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    description: String,
    objects: BTreeMap<String, MonitorObject>,
    last_error: Option<String>,
}

impl JsonFileStore {
    /// Open the store at `path`. Read errors are kept in
    /// [`JsonFileStore::last_error`] and leave the store empty.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        let mut store = Self {
            path,
            description,
            objects: BTreeMap::new(),
            last_error: None,
        };
        if let Err(err) = store.reload() {
            warn!("Failed to read object store {}: {}", store.path.display(), err);
        }
        store
    }

    /// Open the store at `path`, failing if it cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut store = Self::new(path);
        match store.last_error.take() {
            Some(err) => Err(DqmError::Failure(err)),
            None => Ok(store),
        }
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing the stored objects on success.
    pub fn reload(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            self.last_error = Some(format!("Read error: {e}"));
            DqmError::from(e)
        })?;
        let parsed: BTreeMap<String, MonitorObject> = serde_json::from_str(&content).map_err(|e| {
            self.last_error = Some(format!("Parse error: {e}"));
            DqmError::from(e)
        })?;

        self.objects = parsed
            .into_iter()
            .filter(|(key, object)| {
                let consistent = object.is_consistent();
                if !consistent {
                    warn!("Skipping inconsistent object '{}' in {}", key, self.description);
                }
                consistent
            })
            .collect();
        self.last_error = None;
        debug!("Loaded {} object(s) from {}", self.objects.len(), self.description);
        Ok(())
    }

    /// The last read or parse error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for JsonFileStore {
    fn get(&self, path: &str) -> Option<MonitorObject> {
        self.objects.get(path).cloned()
    }

    fn description(&self) -> &str {
        &self.description
    }
}
