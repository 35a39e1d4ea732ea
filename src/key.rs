//! Keys identifying data items: a logical path plus a content digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};

/// Content digest for data items (SHA-256).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Compute the digest of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hasher.finalize().into())
    }

    /// Compute the digest of everything a reader yields, without
    /// buffering the whole content in memory.
    pub fn from_reader(reader: &mut impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(reader, &mut hasher)?;
        Ok(ContentDigest(hasher.finalize().into()))
    }

    /// Convert to lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(ContentDigest(arr))
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identifies one item in a store: a store-root-relative, forward-slash
/// separated logical path, plus the digest of the content the key was
/// generated from.
///
/// A key with `digest: None` matches whatever content currently lives at
/// the path; lookups skip the integrity check for such keys.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataKey {
    pub path: String,
    pub digest: Option<ContentDigest>,
}

impl DataKey {
    /// Key that binds a path to specific content.
    pub fn new(path: impl Into<String>, digest: ContentDigest) -> Self {
        DataKey {
            path: path.into(),
            digest: Some(digest),
        }
    }

    /// Key that matches any current content at the path.
    pub fn unverified(path: impl Into<String>) -> Self {
        DataKey {
            path: path.into(),
            digest: None,
        }
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.digest {
            Some(d) => write!(f, "DataKey({} @ {}...)", self.path, &d.to_hex()[..8]),
            None => write!(f, "DataKey({})", self.path),
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = ContentDigest::from_bytes(b"hello world");
        let parsed = ContentDigest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn test_digest_from_reader_matches_from_bytes() {
        let data = b"some experiment output\nwith two lines\n";
        let streamed = ContentDigest::from_reader(&mut &data[..]).unwrap();
        assert_eq!(streamed, ContentDigest::from_bytes(data));
    }

    #[test]
    fn test_keys_deduplicate_in_sets() {
        let digest = ContentDigest::from_bytes(b"content");
        let mut keys = HashSet::new();
        keys.insert(DataKey::new("results/a.dat", digest));
        keys.insert(DataKey::new("results/a.dat", digest));
        keys.insert(DataKey::new("results/b.dat", digest));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_display_renders_path() {
        let key = DataKey::unverified("test_dir/test_file3");
        assert_eq!(key.to_string(), "test_dir/test_file3");
    }
}
