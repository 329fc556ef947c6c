//! # Content Hashing
//!
//! SHA-256 over raw file bytes, hex encoded. Recorded in the manifest when a
//! resource is written and recomputed on every load.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{PresamplesError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Hex SHA-256 of a file's contents
pub fn file_hash(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PresamplesError::ResourceFileMissing {
            path: path.to_path_buf(),
        },
        _ => PresamplesError::Io(e),
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of a byte slice
pub fn bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
