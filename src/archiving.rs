//! Store variant that bundles newly found files into compressed
//! archives and serves reads back out of them via lazy extraction.

use crate::error::{Result, StoreError};
use crate::filesystem::{round_to_second, FileSystemDataStore};
use crate::item::{join_logical, DataItem};
use crate::key::DataKey;
use crate::store::{parse_config, verify_digest, DataStore, ARCHIVING_FILE_SYSTEM_STORE};
use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

/// Format of the archive label derived from the scan timestamp.
const ARCHIVE_LABEL_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Configuration mapping schema, used for both serialization and
/// (unknown-field-rejecting) deserialization.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchivingConfig {
    root: String,
    archive: String,
}

/// A filesystem store that moves each scan's findings into a
/// timestamp-named `.tar.gz` bundle under a separate archive root,
/// keeping the working directory clean.
///
/// Keys returned by [`find_new_data`] are rewritten to
/// `<archive-label>/<original-relative-path>`; reads against such keys
/// extract the needed member into a process-local scratch directory on
/// first access.
///
/// [`find_new_data`]: DataStore::find_new_data
pub struct ArchivingFileSystemDataStore {
    store: FileSystemDataStore,
    archive_root: PathBuf,
    scratch: Mutex<Option<TempDir>>,
}

impl ArchivingFileSystemDataStore {
    /// Create a store with the given working root and archive root.
    /// Both directories are created best-effort, like
    /// [`FileSystemDataStore::new`].
    pub fn new(root: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        let store = FileSystemDataStore::new(root);
        let archive_root = archive.into();
        if let Err(e) = fs::create_dir_all(&archive_root) {
            debug!(archive = %archive_root.display(), error = %e, "could not create archive root");
        }
        ArchivingFileSystemDataStore {
            store,
            archive_root,
            scratch: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub(crate) fn from_config(config: &Value) -> Result<Self> {
        let config: ArchivingConfig = parse_config(config)?;
        Ok(Self::new(config.root, config.archive))
    }

    /// Bundle the given root-relative paths into
    /// `<archive_root>/<name>.tar.gz`, optionally removing the source
    /// files afterwards.
    ///
    /// The archive is written to a temporary file and only renamed to
    /// its final name once complete, so a failed write never leaves a
    /// partial archive visible; originals are removed strictly after
    /// the rename.
    pub fn archive(&self, name: &str, paths: &[String], delete_originals: bool) -> Result<PathBuf> {
        fs::create_dir_all(&self.archive_root)?;
        let archive_path = self.archive_root.join(format!("{name}.tar.gz"));

        let staging = NamedTempFile::new_in(&self.archive_root)?;
        let mut builder =
            tar::Builder::new(GzEncoder::new(staging.as_file(), Compression::default()));
        for path in paths {
            let full = join_logical(self.store.root(), path);
            builder.append_path_with_name(&full, Path::new(path))?;
        }
        builder.into_inner()?.finish()?;
        staging
            .persist(&archive_path)
            .map_err(|e| StoreError::Io(e.error))?;
        debug!(archive = %archive_path.display(), members = paths.len(), "archive written");

        if delete_originals {
            for path in paths {
                fs::remove_file(join_logical(self.store.root(), path))?;
            }
        }
        Ok(archive_path)
    }

    /// Resolve a `<label>/<member>` path against an existing archive,
    /// extracting the member to scratch space if this is its first
    /// access. Returns `Ok(None)` when the path does not name a known
    /// archive, so the caller can fall back to the plain filesystem
    /// lookup.
    fn archived_item(&self, path: &str) -> Result<Option<DataItem>> {
        let Some((label, member)) = path.split_once('/') else {
            return Ok(None);
        };
        let archive_path = self.archive_root.join(format!("{label}.tar.gz"));
        if !archive_path.is_file() {
            return Ok(None);
        }

        let scratch = self.scratch_dir()?;
        let target = join_logical(&scratch, path);
        if !target.is_file() {
            extract_member(&archive_path, member, &target)?;
        }
        DataItem::open(&scratch, path).map(Some)
    }

    /// Process-local scratch directory for extracted members, created
    /// on first use and removed when the store is dropped.
    fn scratch_dir(&self) -> Result<PathBuf> {
        let mut guard = self.scratch.lock();
        if let Some(dir) = guard.as_ref() {
            return Ok(dir.path().to_path_buf());
        }
        let dir = tempfile::tempdir()?;
        let path = dir.path().to_path_buf();
        *guard = Some(dir);
        Ok(path)
    }
}

impl DataStore for ArchivingFileSystemDataStore {
    fn store_type(&self) -> &'static str {
        ARCHIVING_FILE_SYSTEM_STORE
    }

    fn to_config(&self) -> Value {
        serde_json::to_value(ArchivingConfig {
            root: self.store.root().to_string_lossy().into_owned(),
            archive: self.archive_root.to_string_lossy().into_owned(),
        })
        .expect("config serializes to a plain mapping")
    }

    fn find_new_data(&self, since: DateTime<Local>) -> Result<HashSet<DataKey>> {
        let keys = self.store.find_new_data(since)?;
        if keys.is_empty() {
            return Ok(keys);
        }

        let label = round_to_second(since).format(ARCHIVE_LABEL_FORMAT).to_string();
        let paths: Vec<String> = keys.iter().map(|key| key.path.clone()).collect();
        self.archive(&label, &paths, true)?;

        Ok(keys
            .into_iter()
            .map(|key| DataKey {
                path: format!("{}/{}", label, key.path),
                digest: key.digest,
            })
            .collect())
    }

    fn get_data_item(&self, key: &DataKey) -> Result<DataItem> {
        if let Some(item) = self.archived_item(&key.path)? {
            verify_digest(key, &item)?;
            return Ok(item);
        }
        self.store.get_data_item(key)
    }

    fn contains_path(&self, path: &str) -> bool {
        self.store.contains_path(path)
    }
}

impl fmt::Display for ArchivingFileSystemDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.store)
    }
}

/// Extract a single member of a gzip-compressed tar archive to
/// `target`. A missing member, like an unreadable archive, is an
/// [`StoreError::ArchiveIntegrity`] failure.
fn extract_member(archive_path: &Path, member: &str, target: &Path) -> Result<()> {
    let corrupt = |e: std::io::Error| {
        StoreError::ArchiveIntegrity(format!("cannot read {}: {}", archive_path.display(), e))
    };

    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let matches = entry
            .path()
            .map(|p| &*p == Path::new(member))
            .unwrap_or(false);
        if matches {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(target).map_err(corrupt)?;
            debug!(member, archive = %archive_path.display(), "member extracted");
            return Ok(());
        }
    }
    Err(StoreError::ArchiveIntegrity(format!(
        "member {} missing from {}",
        member,
        archive_path.display()
    )))
}
