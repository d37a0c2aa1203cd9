//! Content digests for change detection.
//!
//! MD5 is used because S3 reports the MD5 of single-part uploads as the
//! object's ETag, which makes local and remote checksums comparable.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Hash bytes, returning lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    to_hex(&Md5::digest(data))
}

/// Hash a file by streaming its content.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
