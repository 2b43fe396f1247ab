use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// bcrypt with a fixed cost. Each hash gets a fresh random salt; the
/// returned string embeds algorithm version, cost, salt and digest.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Constant-time check of `password` against a stored hash. A stored
    /// hash that cannot be parsed counts as a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is malformed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        // Minimum cost keeps the suite fast
        PasswordHasher::new(4)
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let hash = hasher().hash("pw1").unwrap();
        assert_ne!(hash, "pw1");
        assert!(hash.starts_with("$2"));
        assert!(!hash.contains("pw1"));
    }

    #[test]
    fn test_verify_roundtrip() {
        let h = hasher();
        for password in ["pw1", "correct horse battery staple", "ünïcödé", " "] {
            let hash = h.hash(password).unwrap();
            assert!(h.verify(password, &hash), "failed for {password:?}");
        }
    }

    #[test]
    fn test_verify_rejects_other_password() {
        let h = hasher();
        let hash = h.hash("pw1").unwrap();
        assert!(!h.verify("pw2", &hash));
        assert!(!h.verify("PW1", &hash));
        assert!(!h.verify("", &hash));
    }

    #[test]
    fn test_salt_differs_per_call() {
        let h = hasher();
        let a = h.hash("same").unwrap();
        let b = h.hash("same").unwrap();
        assert_ne!(a, b);
        assert!(h.verify("same", &a));
        assert!(h.verify("same", &b));
    }

    #[test]
    fn test_malformed_hash_is_a_mismatch() {
        let h = hasher();
        assert!(!h.verify("pw1", "not-a-bcrypt-hash"));
        assert!(!h.verify("pw1", ""));
        assert!(!h.verify("pw1", "$2b$04$tooshort"));
    }
}
