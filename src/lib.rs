//! # Data Store
//!
//! A content-addressed, pluggable data store for tracking the output
//! files of computational experiments.
//!
//! ## Core Concepts
//!
//! - **Keys**: A logical path bound to a content digest (or left
//!   unverified) identifies each data item
//! - **Items**: Retrievable file-backed units of content, with a
//!   line-order-independent canonical form for equality testing
//! - **Stores**: A root directory plus scan / fetch / delete operations
//! - **Archiving**: A store variant that bundles each scan's findings
//!   into timestamped `.tar.gz` archives and reads them back via lazy
//!   extraction
//!
//! ## Example
//!
//! ```ignore
//! use datastore::{DataStore, FileSystemDataStore};
//!
//! let store = FileSystemDataStore::new("./Data");
//! let started = chrono::Local::now();
//!
//! // ... run the experiment ...
//!
//! for key in store.find_new_data(started)? {
//!     let item = store.get_data_item(&key)?;
//!     println!("{} ({} bytes)", key, item.size());
//! }
//! ```

pub mod archiving;
pub mod error;
pub mod filesystem;
pub mod item;
pub mod key;
pub mod store;

// Re-exports
pub use archiving::ArchivingFileSystemDataStore;
pub use error::{Result, StoreError};
pub use filesystem::FileSystemDataStore;
pub use item::DataItem;
pub use key::{ContentDigest, DataKey};
pub use store::{get_data_store, DataStore, ARCHIVING_FILE_SYSTEM_STORE, FILE_SYSTEM_STORE};
