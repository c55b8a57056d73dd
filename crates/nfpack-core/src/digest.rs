//! Content digests recorded in the package descriptor.

use nfpack_schema::Digest;
use std::fs::File;
use std::io;
use std::path::Path;

/// Hex blake3 digest of a file, streamed from disk.
pub fn file_digest(path: &Path) -> io::Result<Digest> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(&mut file)?;
    Ok(Digest::new(hasher.finalize().to_hex().to_string()))
}

pub fn bytes_digest(data: &[u8]) -> Digest {
    Digest::new(blake3::hash(data).to_hex().to_string())
}
