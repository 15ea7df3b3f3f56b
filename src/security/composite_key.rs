use sha2::{Sha256, Digest};

/// Derives the rate-limit client key by hashing the client IP with a server secret,
/// so raw addresses never reach the counter store
#[derive(Clone)]
pub struct CompositeKeyGenerator {
    server_secret: String,
}

impl CompositeKeyGenerator {
    /// Create a new composite key generator with a server secret
    pub fn new(server_secret: String) -> Self {
        Self { server_secret }
    }

    /// Generate a client key from an IP address
    ///
    /// # Arguments
    /// * `ip` - The client's IP address as seen by the gateway
    ///
    /// # Returns
    /// A hexadecimal SHA-256 digest
    pub fn generate(&self, ip: &str) -> String {
        let combined = format!("{}:{}", ip, self.server_secret);
        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_composite_key() {
        let generator = CompositeKeyGenerator::new("test_secret".to_string());
        let key = generator.generate("192.168.1.1");

        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!key.contains("192.168"));
    }

    #[test]
    fn test_same_inputs_produce_same_key() {
        let generator = CompositeKeyGenerator::new("test_secret".to_string());
        assert_eq!(generator.generate("192.168.1.1"), generator.generate("192.168.1.1"));
    }

    #[test]
    fn test_different_inputs_produce_different_keys() {
        let generator = CompositeKeyGenerator::new("test_secret".to_string());
        assert_ne!(generator.generate("192.168.1.1"), generator.generate("192.168.1.2"));

        let other_secret = CompositeKeyGenerator::new("other_secret".to_string());
        assert_ne!(generator.generate("192.168.1.1"), other_secret.generate("192.168.1.1"));
    }
}
