//! Data items: individual retrievable files within a store.

use crate::error::{Result, StoreError};
use crate::key::{ContentDigest, DataKey};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to the backing file's name for the memoized
/// canonical-content sidecar.
const SORTED_SUFFIX: &str = ",sorted";

/// A single retrievable unit of content, backed by a real file.
///
/// `path` is the item's logical identity within its store;
/// `full_path` is where the bytes actually live, which may differ from a
/// naive root+path join when the store has remapped the item (for
/// example into an extraction scratch directory).
#[derive(Clone, Debug)]
pub struct DataItem {
    path: String,
    full_path: PathBuf,
    size: u64,
    name: String,
    extension: Option<String>,
    mimetype: Option<String>,
    encoding: Option<String>,
}

impl DataItem {
    /// Resolve a logical path against a base directory.
    ///
    /// Fails with [`StoreError::NotFound`] if no regular file exists
    /// there; size and content-type metadata are captured up front.
    pub fn open(base: &Path, path: &str) -> Result<Self> {
        let full_path = join_logical(base, path);
        let metadata = fs::metadata(&full_path)
            .map_err(|_| StoreError::NotFound(path.to_string()))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(path.to_string()));
        }

        let name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = full_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()));
        let (mimetype, encoding) = guess_type(&full_path);

        Ok(DataItem {
            path: path.to_string(),
            full_path,
            size: metadata.len(),
            name,
            extension,
            mimetype,
            encoding,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File extension including the leading dot, if any.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Guessed MIME type, e.g. `text/csv`.
    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    /// Guessed transfer encoding (`gzip`, `bzip2`, ...), if the file
    /// looks like a compressed single file.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Read the raw content, or only the first `max_length` bytes if
    /// given. Truncated reads never pull more than `max_length` bytes
    /// off disk.
    pub fn content(&self, max_length: Option<u64>) -> Result<Vec<u8>> {
        let mut file = File::open(&self.full_path)?;
        let mut buf = Vec::new();
        match max_length {
            Some(n) => {
                file.take(n).read_to_end(&mut buf)?;
            }
            None => {
                file.read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }

    /// Compute the digest of the full content by streaming it through
    /// the hasher.
    pub fn digest(&self) -> Result<ContentDigest> {
        let mut file = File::open(&self.full_path)?;
        Ok(ContentDigest::from_reader(&mut file)?)
    }

    /// Produce the key binding this item's logical path to its current
    /// content.
    pub fn generate_key(&self) -> Result<DataKey> {
        Ok(DataKey::new(self.path.clone(), self.digest()?))
    }

    /// Canonical line-order-independent form of the content, used for
    /// equality comparison only.
    ///
    /// The result is memoized in a `<full_path>,sorted` sidecar and
    /// reused as long as the sidecar is at least as new as the source;
    /// a source modified after the sidecar was written forces a
    /// recompute. The sidecar is a disposable cache, never part of the
    /// item's identity.
    pub fn sorted_content(&self) -> Result<Vec<u8>> {
        let sidecar = self.sorted_sidecar_path();
        if self.sidecar_is_fresh(&sidecar) {
            return Ok(fs::read(&sidecar)?);
        }

        let sorted = sort_lines(&self.content(None)?);
        if let Err(e) = fs::write(&sidecar, &sorted) {
            debug!(path = %self.path, error = %e, "could not write sorted-content sidecar");
        }
        Ok(sorted)
    }

    /// Whether two items hold the same data up to line order.
    pub fn same_data(&self, other: &DataItem) -> Result<bool> {
        Ok(self.sorted_content()? == other.sorted_content()?)
    }

    fn sorted_sidecar_path(&self) -> PathBuf {
        let mut os = OsString::from(self.full_path.as_os_str());
        os.push(SORTED_SUFFIX);
        PathBuf::from(os)
    }

    fn sidecar_is_fresh(&self, sidecar: &Path) -> bool {
        let newer_than_source = || -> Option<bool> {
            let sidecar_mtime = fs::metadata(sidecar).ok()?.modified().ok()?;
            let source_mtime = fs::metadata(&self.full_path).ok()?.modified().ok()?;
            Some(sidecar_mtime >= source_mtime)
        };
        newer_than_source().unwrap_or(false)
    }
}

/// Join a forward-slash logical path onto a base directory, component by
/// component so the result is portable.
pub(crate) fn join_logical(base: &Path, path: &str) -> PathBuf {
    let mut full = base.to_path_buf();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        full.push(component);
    }
    full
}

/// Split content into lines, sort them as raw byte sequences, and
/// rejoin, preserving the presence or absence of a trailing newline.
fn sort_lines(content: &[u8]) -> Vec<u8> {
    let trailing_newline = content.last() == Some(&b'\n');
    let mut lines: Vec<&[u8]> = content.split(|&b| b == b'\n').collect();
    if trailing_newline {
        // split leaves an empty slice after the final separator
        lines.pop();
    }
    lines.sort_unstable();
    let mut sorted = lines.join(&b"\n"[..]);
    if trailing_newline {
        sorted.push(b'\n');
    }
    sorted
}

/// Guess MIME type and transfer encoding from the file name, treating a
/// compression extension as an encoding wrapper around the inner type
/// (`results.csv.gz` is `text/csv` with `gzip` encoding).
fn guess_type(path: &Path) -> (Option<String>, Option<String>) {
    let encoding = match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Some("gzip"),
        Some("bz2") => Some("bzip2"),
        Some("xz") => Some("xz"),
        _ => None,
    };
    let inner = if encoding.is_some() {
        path.with_extension("")
    } else {
        path.to_path_buf()
    };
    let mimetype = mime_guess::from_path(&inner).first().map(|m| m.to_string());
    (mimetype, encoding.map(String::from))
}
