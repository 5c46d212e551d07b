//! Content hashing for change detection.
//!
//! The digest is taken over the normalized payload. Index time and re-scan
//! time must go through the same [`normalize`] or every unit looks modified.

use sha2::{Digest, Sha256};

/// Normalize a payload before hashing and chunking. Line breaks are dropped.
pub fn normalize(payload: &str) -> String {
    payload.replace('\n', "")
}

/// SHA-256 of the given text as 64 lowercase hex characters.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = content_hash("import requests");
        let hash2 = content_hash("import requests");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_distinguishes_content() {
        let corpus = ["", "a", "b", "ab", "ba", "import os", "import os "];
        let hashes: std::collections::HashSet<_> = corpus.iter().map(|t| content_hash(t)).collect();
        assert_eq!(hashes.len(), corpus.len());
    }

    #[test]
    fn test_hash_format() {
        let hash = content_hash("x = 1");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(content_hash("abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn test_normalize_drops_newlines_only() {
        assert_eq!(normalize("a\nb\r\n c\t"), "ab\r c\t");
        assert_eq!(content_hash(&normalize("x\ny")), content_hash(&normalize("xy")));
    }
}
