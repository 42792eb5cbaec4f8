//! SHA-256 content fingerprints recorded in share manifests.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Files are hashed in chunks of this size so memory use stays flat.
const CHUNK_SIZE: usize = 1 << 20;

/// Hash everything readable from `reader`, returning lowercase hex.
pub fn fingerprint<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Reader that hashes every byte it passes through.
///
/// Lets a file be stored and fingerprinted from the same read, so the digest
/// always describes the bytes that were written.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Lowercase hex digest of everything read so far.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Hash a file on disk.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    fingerprint(file)
}
