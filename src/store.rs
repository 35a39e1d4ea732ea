//! The store contract and the name-based store registry.
//!
//! Stores serialize to a plain JSON mapping so they can be persisted
//! alongside experiment records; [`get_data_store`] reconstructs the
//! right concrete type from a registered name plus such a mapping.

use crate::archiving::ArchivingFileSystemDataStore;
use crate::error::{Result, StoreError};
use crate::filesystem::FileSystemDataStore;
use crate::item::DataItem;
use crate::key::DataKey;
use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use tracing::warn;

/// Registered name of [`FileSystemDataStore`].
pub const FILE_SYSTEM_STORE: &str = "FileSystemDataStore";

/// Registered name of [`ArchivingFileSystemDataStore`].
pub const ARCHIVING_FILE_SYSTEM_STORE: &str = "ArchivingFileSystemDataStore";

/// Operations every concrete data store provides.
///
/// A store owns a root directory and tracks the files beneath it.
/// Concurrent runs must each use their own root; the store takes no
/// locks of its own.
pub trait DataStore {
    /// The name this store type is registered under.
    fn store_type(&self) -> &'static str;

    /// Serialize to the configuration mapping accepted by
    /// [`get_data_store`].
    fn to_config(&self) -> Value;

    /// Find files created or modified at or after `since`, which is
    /// rounded down to whole-second precision before comparison.
    /// Returns one key per qualifying file, deduplicated.
    fn find_new_data(&self, since: DateTime<Local>) -> Result<HashSet<DataKey>>;

    /// Resolve a key to its item. Fails with
    /// [`StoreError::NotFound`] if the path has no backing content and
    /// [`StoreError::DigestMismatch`] if the key carries a digest that
    /// no longer matches.
    fn get_data_item(&self, key: &DataKey) -> Result<DataItem>;

    /// Fetch raw content by key, optionally truncated to the first
    /// `max_length` bytes.
    fn get_content(&self, key: &DataKey, max_length: Option<u64>) -> Result<Vec<u8>> {
        self.get_data_item(key)?.content(max_length)
    }

    /// Remove the backing files for the given keys, best-effort: a key
    /// that cannot be resolved produces a warning and never aborts the
    /// rest of the batch.
    fn delete(&self, keys: &[DataKey]) {
        for key in keys {
            match self.get_data_item(key) {
                Ok(item) => {
                    if let Err(e) = fs::remove_file(item.full_path()) {
                        warn!(key = %key, error = %e, "failed to delete data item");
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "tried to delete data item that could not be resolved");
                }
            }
        }
    }

    /// Whether a regular file exists at `root/path`.
    fn contains_path(&self, path: &str) -> bool;
}

/// Construct a store from its registered name and configuration
/// mapping.
///
/// Fails with [`StoreError::UnknownStoreType`] for an unregistered name
/// and [`StoreError::InvalidConfiguration`] when the mapping's fields do
/// not match the target store's schema.
pub fn get_data_store(store_type: &str, config: &Value) -> Result<Box<dyn DataStore>> {
    match store_type {
        FILE_SYSTEM_STORE => Ok(Box::new(FileSystemDataStore::from_config(config)?)),
        ARCHIVING_FILE_SYSTEM_STORE => {
            Ok(Box::new(ArchivingFileSystemDataStore::from_config(config)?))
        }
        other => Err(StoreError::UnknownStoreType(other.to_string())),
    }
}

/// Deserialize a store configuration, rejecting unknown fields.
pub(crate) fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| StoreError::InvalidConfiguration(e.to_string()))
}

/// Check a key's digest (when present) against the resolved item's
/// current content.
pub(crate) fn verify_digest(key: &DataKey, item: &DataItem) -> Result<()> {
    if let Some(expected) = key.digest {
        let got = item.digest()?;
        if got != expected {
            return Err(StoreError::DigestMismatch {
                path: key.path.clone(),
                expected,
                got,
            });
        }
    }
    Ok(())
}
