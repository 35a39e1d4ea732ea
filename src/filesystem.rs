//! Data store backed directly by a local directory tree.

use crate::error::Result;
use crate::item::{join_logical, DataItem};
use crate::key::DataKey;
use crate::store::{parse_config, verify_digest, DataStore, FILE_SYSTEM_STORE};
use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Version-control and metadata directories pruned from scans.
const IGNORED_DIRS: &[&str] = &[".smt", ".hg", ".svn", ".git", ".bzr"];

/// Configuration mapping schema, used for both serialization and
/// (unknown-field-rejecting) deserialization.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSystemConfig {
    root: String,
}

/// A store whose items are plain files under a root directory.
///
/// Change detection is timestamp-based: [`find_new_data`] reports every
/// file modified at or after the given instant. This creates problems
/// when several experiments run at once, since files written by other
/// runs are mixed in with this one; concurrent runs must each use their
/// own store root.
///
/// [`find_new_data`]: DataStore::find_new_data
pub struct FileSystemDataStore {
    root: PathBuf,
}

impl FileSystemDataStore {
    /// Create a store rooted at `root`, which is resolved to an
    /// absolute path and created if missing. Creation failure is not
    /// fatal here; a root that never materializes surfaces as
    /// `NotFound` on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = absolutize(root.into());
        if let Err(e) = fs::create_dir_all(&root) {
            debug!(root = %root.display(), error = %e, "could not create store root");
        }
        FileSystemDataStore { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn from_config(config: &Value) -> Result<Self> {
        let config: FileSystemConfig = parse_config(config)?;
        Ok(Self::new(config.root))
    }

    /// Walk the tree and return the logical paths of all regular files
    /// modified at or after `since` (already rounded by the caller).
    pub(crate) fn scan_since(&self, since: DateTime<Local>) -> Vec<String> {
        let mut paths = Vec::new();
        let walker = WalkDir::new(&self.root).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| IGNORED_DIRS.contains(&name)))
        });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(root = %self.root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(mtime) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                debug!(path = %entry.path().display(), "skipping entry without mtime");
                continue;
            };
            let modified = DateTime::<Local>::from(mtime);
            if modified >= since {
                if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                    paths.push(logical_path(relative));
                }
            }
        }
        paths
    }
}

impl DataStore for FileSystemDataStore {
    fn store_type(&self) -> &'static str {
        FILE_SYSTEM_STORE
    }

    fn to_config(&self) -> Value {
        serde_json::to_value(FileSystemConfig {
            root: self.root.to_string_lossy().into_owned(),
        })
        .expect("config serializes to a plain mapping")
    }

    fn find_new_data(&self, since: DateTime<Local>) -> Result<HashSet<DataKey>> {
        let cutoff = round_to_second(since);
        let mut keys = HashSet::new();
        for path in self.scan_since(cutoff) {
            let item = DataItem::open(&self.root, &path)?;
            keys.insert(item.generate_key()?);
        }
        debug!(root = %self.root.display(), count = keys.len(), "scan complete");
        Ok(keys)
    }

    fn get_data_item(&self, key: &DataKey) -> Result<DataItem> {
        let item = DataItem::open(&self.root, &key.path)?;
        verify_digest(key, &item)?;
        Ok(item)
    }

    fn contains_path(&self, path: &str) -> bool {
        join_logical(&self.root, path).is_file()
    }
}

impl fmt::Display for FileSystemDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.display())
    }
}

/// Round a timestamp down to whole-second precision. File modification
/// times are only reliable to the second across platforms, so the scan
/// cutoff must not be finer than what it is compared against.
pub(crate) fn round_to_second(ts: DateTime<Local>) -> DateTime<Local> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Render a relative path as a forward-slash logical path.
fn logical_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("data");
        assert!(!root.exists());
        let _store = FileSystemDataStore::new(&root);
        assert!(root.exists());
    }

    #[test]
    fn test_display_renders_root() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemDataStore::new(dir.path());
        assert_eq!(store.to_string(), dir.path().display().to_string());
    }

    #[test]
    fn test_scan_prunes_vcs_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemDataStore::new(dir.path());
        let epoch = round_to_second(DateTime::from(std::time::UNIX_EPOCH));

        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("HEAD"), b"ref").unwrap();
        fs::write(dir.path().join("output.dat"), b"data").unwrap();

        assert_eq!(store.scan_since(epoch), vec!["output.dat".to_string()]);
    }

    #[test]
    fn test_round_to_second_drops_subsecond_part() {
        let now = Local::now();
        let rounded = round_to_second(now);
        assert_eq!(rounded.nanosecond(), 0);
        assert!(rounded <= now);
    }
}
