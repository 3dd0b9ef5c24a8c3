//! Content fingerprints for watched files

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::Result;

/// Files at or below this size are hashed in full
pub const FULL_HASH_LIMIT_BYTES: u64 = 256 * 1024;

/// Bytes of head and tail sampled for large files
const SAMPLE_BYTES: usize = 4 * 1024;

/// Compute a content fingerprint for a file
///
/// Small files get a full SHA-256 of their contents. Above
/// [`FULL_HASH_LIMIT_BYTES`] the fingerprint is a composite hash of the
/// first and last [`SAMPLE_BYTES`] plus size and mtime, so huge files are
/// never read end to end just to notice they changed.
pub fn fingerprint(path: &Path) -> Result<String> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();

    if size <= FULL_HASH_LIMIT_BYTES {
        let contents = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&contents);
        return Ok(format!("{:x}", hasher.finalize()));
    }

    let mut file = std::fs::File::open(path)?;
    let mut head = vec![0u8; SAMPLE_BYTES];
    let read = file.read(&mut head)?;
    head.truncate(read);

    let mut tail = vec![0u8; SAMPLE_BYTES];
    file.seek(SeekFrom::End(-(SAMPLE_BYTES as i64)))?;
    let read = file.read(&mut tail)?;
    tail.truncate(read);

    let mtime_secs = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(&head);
    hasher.update(&tail);
    hasher.update(size.to_le_bytes());
    hasher.update(mtime_secs.to_le_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
