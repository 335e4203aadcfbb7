//! Offset bookkeeping for the blob index
//!
//! The [`IndexBuilder`] owns the write cursor and hands out byte ranges;
//! [`BundleIndex`] is the serializable mapping it produces.

use std::ops::Range;
use std::path::{Path, PathBuf};

use blobpack_core::error::BlobpackError;
use blobpack_core::utils::path::{normalize_path, relative_key};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BundleResult;

/// Byte range of one resource inside the blob.
///
/// Serialized as a `[start, length]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct IndexEntry {
    /// Offset of the first byte
    pub start: u64,
    /// Number of bytes
    pub length: u64,
}

impl IndexEntry {
    /// Create a new entry
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Offset one past the last byte, `None` if it does not fit in a `u64`.
    ///
    /// Entries parsed from a container header are untrusted, so this is
    /// checked rather than assumed.
    pub fn end(&self) -> Option<u64> {
        self.start.checked_add(self.length)
    }

    /// Half-open range covered by this entry
    pub fn range(&self) -> Option<Range<u64>> {
        self.end().map(|end| self.start..end)
    }
}

impl From<[u64; 2]> for IndexEntry {
    fn from([start, length]: [u64; 2]) -> Self {
        Self { start, length }
    }
}

impl From<IndexEntry> for [u64; 2] {
    fn from(entry: IndexEntry) -> Self {
        [entry.start, entry.length]
    }
}

/// Mapping of relative key to byte range, in first-registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleIndex {
    entries: IndexMap<String, IndexEntry>,
}

impl BundleIndex {
    /// Look up the range for a key
    pub fn get(&self, key: &str) -> Option<IndexEntry> {
        self.entries.get(key).copied()
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over `(key, entry)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, IndexEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), *entry))
    }

    /// Get all keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Get entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to compact JSON (`{"./a.txt":[0,2]}`)
    pub fn to_json(&self) -> BundleResult<String> {
        serde_json::to_string(self)
            .map_err(|e| BlobpackError::json("Failed to serialize bundle index".to_string(), e))
    }

    /// Parse an index from JSON bytes
    pub fn from_json_slice(bytes: &[u8]) -> BundleResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| BlobpackError::json("Failed to parse bundle index".to_string(), e))
    }

    fn insert(&mut self, key: String, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(key, entry)
    }
}

/// Running write cursor plus the index it has produced so far.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    base_dir: PathBuf,
    blob_size: u64,
    index: BundleIndex,
}

impl IndexBuilder {
    /// Create an empty builder whose keys are relative to `base_dir`.
    ///
    /// A relative `base_dir` is resolved against the current directory so
    /// that absolute resource paths still diff against it.
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: absolute_base(base_dir.into()),
            blob_size: 0,
            index: BundleIndex::default(),
        }
    }

    /// Directory keys are made relative to
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Current cursor, i.e. the total blob length so far
    pub fn blob_size(&self) -> u64 {
        self.blob_size
    }

    /// Index key for an absolute resource path
    pub fn key_for(&self, path: &Path) -> String {
        relative_key(&self.base_dir, path)
    }

    /// Allocate `length` bytes at the cursor and record them under `key`.
    ///
    /// An existing entry for `key` is replaced; its old bytes stay in the blob.
    pub fn register<K: Into<String>>(&mut self, key: K, length: u64) -> IndexEntry {
        let key = key.into();
        let entry = IndexEntry::new(self.blob_size, length);
        self.blob_size += length;

        if let Some(previous) = self.index.insert(key.clone(), entry) {
            debug!(
                "Replaced index entry {} ({}+{} -> {}+{})",
                key, previous.start, previous.length, entry.start, entry.length
            );
        }

        entry
    }

    /// Immutable copy of the index as it stands now
    pub fn snapshot(&self) -> BundleIndex {
        self.index.clone()
    }
}

fn absolute_base(base_dir: PathBuf) -> PathBuf {
    if base_dir.is_absolute() {
        return base_dir;
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_path(&cwd.join(base_dir)),
        Err(e) => {
            debug!("Cannot resolve {} against cwd: {}", base_dir.display(), e);
            base_dir
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_advances_cursor() {
        let mut builder = IndexBuilder::new("/proj");
        let a = builder.register("./a.txt", 2);
        let b = builder.register("./sub/b.txt", 5);
        let empty = builder.register("./empty", 0);

        assert_eq!(a, IndexEntry::new(0, 2));
        assert_eq!(b, IndexEntry::new(2, 5));
        assert_eq!(empty, IndexEntry::new(7, 0));
        assert_eq!(builder.blob_size(), 7);
    }

    #[test]
    fn test_reregister_does_not_reclaim_space() {
        let mut builder = IndexBuilder::new("/proj");
        builder.register("./a.txt", 4);
        builder.register("./b.txt", 3);
        let again = builder.register("./a.txt", 6);

        let index = builder.snapshot();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("./a.txt"), Some(IndexEntry::new(7, 6)));
        assert_eq!(builder.blob_size(), 13);
        assert_eq!(again.end(), Some(builder.blob_size()));

        // overwritten key keeps its original position
        let keys: Vec<&str> = index.keys().collect();
        assert_eq!(keys, vec!["./a.txt", "./b.txt"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut builder = IndexBuilder::new("/proj");
        builder.register("./a.txt", 1);
        let before = builder.snapshot();
        builder.register("./b.txt", 1);

        assert_eq!(before.len(), 1);
        assert!(!before.contains_key("./b.txt"));
        assert_eq!(builder.snapshot().len(), 2);
    }

    #[test]
    fn test_key_for_uses_base_dir() {
        let builder = IndexBuilder::new("/proj");
        assert_eq!(builder.key_for(Path::new("/proj/sub/b.txt")), "./sub/b.txt");
    }

    #[test]
    fn test_relative_base_is_anchored_at_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let builder = IndexBuilder::new(".");
        assert!(builder.base_dir().is_absolute());
        assert_eq!(builder.key_for(&cwd.join("x/a.txt")), "./x/a.txt");

        // absolute paths elsewhere keep their `..` hops instead of losing the root
        let outside = cwd.ancestors().last().unwrap().join("elsewhere-a.txt");
        assert!(builder.key_for(&outside).starts_with("./.."));
    }

    #[test]
    fn test_index_json_shape() {
        let mut builder = IndexBuilder::new("/proj");
        builder.register("./a.txt", 2);
        builder.register("./sub/b.txt", 5);

        let json = builder.snapshot().to_json().unwrap();
        assert_eq!(json, r#"{"./a.txt":[0,2],"./sub/b.txt":[2,5]}"#);

        let parsed = BundleIndex::from_json_slice(json.as_bytes()).unwrap();
        assert_eq!(parsed, builder.snapshot());
        assert_eq!(parsed.get("./sub/b.txt").unwrap().range(), Some(2..7));
    }

    #[test]
    fn test_malformed_index_json() {
        let err = BundleIndex::from_json_slice(br#"{"./a.txt":[0]}"#).unwrap_err();
        assert!(matches!(err, BlobpackError::Json { .. }));
    }
}
