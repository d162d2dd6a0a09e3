use sha2::{Digest, Sha256};

/// `sha256:<hex>` digest of raw bytes.
pub fn sha256_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::sha256_digest;

    #[test]
    fn digest_is_prefixed_and_stable() {
        let a = sha256_digest(b"id: demo\n");
        let b = sha256_digest(b"id: demo\n");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), "sha256:".len() + 64);
        assert_ne!(a, sha256_digest(b"id: other\n"));
    }
}
