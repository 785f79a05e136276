//! Stage input fingerprints
//!
//! A fingerprint is the SHA-256 of labelled input components: pinned source
//! revisions, literal compiler flags, and size/mtime of input files. Each
//! component is length-prefixed so that adjacent values can't run together.

use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Incremental fingerprint over labelled components
#[derive(Clone)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Start a fingerprint for inputs of `kind` (usually the stage id)
    pub fn new(kind: &str) -> Self {
        let mut fp = Self {
            hasher: Sha256::new(),
        };
        fp.component(kind.as_bytes());
        fp
    }

    /// Add a labelled string value
    pub fn field(mut self, label: &str, value: impl AsRef<str>) -> Self {
        self.component(label.as_bytes());
        self.component(value.as_ref().as_bytes());
        self
    }

    /// Add a file's size and modification time, or a marker when absent
    pub fn file(mut self, label: &str, path: &Path) -> Self {
        self.component(label.as_bytes());
        let value = match std::fs::metadata(path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                format!("{}:{}", meta.len(), mtime)
            }
            Err(_) => "missing".to_string(),
        };
        self.component(value.as_bytes());
        self
    }

    /// Hex-encoded digest
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    fn component(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}
