//! Streamed content hashing for copy verification.

use std::fmt;
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::Path;

use blake3::Hasher;
use notetree_core::{Result, TreeError};

use crate::fs::FileSystem;

/// Default read size for hashing.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// BLAKE3 digest of a file's contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Get the digest as a hex string.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compares files by streamed content digest.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityVerifier {
    chunk_size: usize,
}

impl Default for IntegrityVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl IntegrityVerifier {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Hash a file in fixed-size chunks. Memory use is bounded by the chunk
    /// size regardless of file length.
    pub fn digest(&self, fs: &dyn FileSystem, path: &Path) -> Result<ContentDigest> {
        let mut reader = fs.open_read(path).map_err(|e| TreeError::io(path, e))?;
        let mut hasher = Hasher::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return Err(TreeError::io(path, e)),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentDigest(*hasher.finalize().as_bytes()))
    }

    /// Check whether `dest` holds the same bytes as `source`.
    ///
    /// Two empty files are equal without hashing; differing sizes are
    /// unequal without hashing.
    pub fn verify(&self, fs: &dyn FileSystem, source: &Path, dest: &Path) -> Result<bool> {
        let source_size = fs.stat(source).map_err(|e| TreeError::io(source, e))?.size;
        let dest_size = fs.stat(dest).map_err(|e| TreeError::io(dest, e))?.size;

        if source_size == 0 && dest_size == 0 {
            return Ok(true);
        }
        if source_size != dest_size {
            tracing::debug!(
                source = %source.display(),
                dest = %dest.display(),
                source_size,
                dest_size,
                "size mismatch"
            );
            return Ok(false);
        }

        let equal = self.digest(fs, source)? == self.digest(fs, dest)?;
        if !equal {
            tracing::warn!(
                source = %source.display(),
                dest = %dest.display(),
                "content digest mismatch"
            );
        }
        Ok(equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_digest_independent_of_chunk_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.md");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        let small = IntegrityVerifier::new(7).digest(&LocalFs, &path).unwrap();
        let large = IntegrityVerifier::default().digest(&LocalFs, &path).unwrap();
        assert_eq!(small, large);
        assert_eq!(small.to_hex(), blake3::hash(&content).to_hex().to_string());
    }

    #[test]
    fn test_verify_rules() {
        let temp = TempDir::new().unwrap();
        let p = |name: &str| temp.path().join(name);
        fs::write(p("empty1"), "").unwrap();
        fs::write(p("empty2"), "").unwrap();
        fs::write(p("a"), "hello").unwrap();
        fs::write(p("b"), "hello").unwrap();
        fs::write(p("c"), "hellO").unwrap();
        fs::write(p("d"), "hello!").unwrap();

        let verifier = IntegrityVerifier::default();
        assert!(verifier.verify(&LocalFs, &p("empty1"), &p("empty2")).unwrap());
        assert!(verifier.verify(&LocalFs, &p("a"), &p("b")).unwrap());
        assert!(!verifier.verify(&LocalFs, &p("a"), &p("c")).unwrap());
        assert!(!verifier.verify(&LocalFs, &p("a"), &p("d")).unwrap());
    }

    #[test]
    fn test_verify_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), "x").unwrap();
        let err = IntegrityVerifier::default()
            .verify(&LocalFs, &temp.path().join("a"), &temp.path().join("gone"))
            .unwrap_err();
        assert!(matches!(err, TreeError::NotFound { .. }));
    }
}
