use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex SHA-256 over the raw file bytes.
    pub checksum: String,
    pub size_bytes: u64,
}

/// Streams a file through SHA-256 in fixed-size chunks. Errors (file vanished
/// mid-read, permission denied) surface to the caller, which treats them as
/// "skip this event".
pub fn hash_file(path: &Path) -> io::Result<FileDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut size_bytes = 0u64;

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size_bytes += read as u64;
    }

    Ok(FileDigest {
        checksum: format!("{:x}", hasher.finalize()),
        size_bytes,
    })
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{hash_bytes, hash_file};

    fn temp_file(contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kmsd-hash-test-{}", Uuid::now_v7()));
        std::fs::write(&path, contents).expect("temp file should be writable");
        path
    }

    #[test]
    fn hashes_known_vector() {
        assert_eq!(
            hash_bytes(b"Hello"),
            "185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969"
        );
    }

    #[test]
    fn file_digest_matches_byte_digest() {
        let path = temp_file(b"Hello");
        let digest = hash_file(&path).expect("hashing should succeed");
        assert_eq!(digest.checksum, hash_bytes(b"Hello"));
        assert_eq!(digest.size_bytes, 5);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn hashes_content_larger_than_one_chunk() {
        let contents = vec![0x42u8; 3 * super::CHUNK_SIZE + 17];
        let path = temp_file(&contents);
        let digest = hash_file(&path).expect("hashing should succeed");
        assert_eq!(digest.checksum, hash_bytes(&contents));
        assert_eq!(digest.size_bytes, contents.len() as u64);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("kmsd-hash-missing-{}", Uuid::now_v7()));
        assert!(hash_file(&path).is_err());
    }
}
