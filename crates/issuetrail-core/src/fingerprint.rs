use crate::types::{CapturedError, Fingerprint};
use sha2::{Digest, Sha256};

const DELIMITER: &[u8] = b"\x00";

/// Compute the deduplication key for an error raised at `source_file:source_line`.
///
/// SHA-256 over the three components separated by NUL bytes, hex encoded.
/// No salt is mixed in, so every process derives the same key for the same
/// error. The stack trace is not part of the key.
pub fn fingerprint(message: &str, source_file: &str, source_line: u32) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(source_file.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(source_line.to_string().as_bytes());
    Fingerprint::new(hex::encode(hasher.finalize()))
}

/// Fingerprint of a captured error.
pub fn fingerprint_error(error: &CapturedError) -> Fingerprint {
    fingerprint(&error.message, &error.source_file, error.source_line)
}
