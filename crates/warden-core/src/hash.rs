use sha2::{Digest, Sha256};

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
