//! Content fingerprints for the host's change detection.
//!
//! The host asks "did this input change since I last ran?" by comparing
//! fingerprints. A fingerprint is the SHA-256 of the full file content,
//! lowercase hex. Modification times are not consulted: a file touched
//! without changing its bytes keeps its fingerprint, and a rewrite with
//! identical bytes is not reported as a change.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// SHA-256 of a file's contents, 64 lowercase hex characters.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
