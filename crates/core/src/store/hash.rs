//! Request-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for an HTTP request.
///
/// The key covers the method, the canonical URL and the values of the headers
/// the response varies on, so two requests share an entry only when all three
/// match.
pub fn compute_cache_key(method: &str, url: &str, vary_headers: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary_headers.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", "https://example.com/api/inventory", "");
        let hash2 = compute_cache_key("get", "https://example.com/api/inventory", "");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", "https://example.com/api/inventory", "");
        let head = compute_cache_key("HEAD", "https://example.com/api/inventory", "");
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_different_headers() {
        let hash1 = compute_cache_key("GET", "https://example.com", "Bearer a");
        let hash2 = compute_cache_key("GET", "https://example.com", "Bearer b");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", "https://example.com", "");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
