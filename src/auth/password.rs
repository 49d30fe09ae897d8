use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

/// Password digest capability. The algorithm behind it is opaque to callers.
pub trait Hasher: Send + Sync {
    fn hash(&self, plain: &str) -> anyhow::Result<String>;
    fn matches(&self, plain: &str, digest: &str) -> anyhow::Result<bool>;
}

/// Argon2id with PHC-encoded digests.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl Argon2Hasher {
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Hasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn matches(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(digest).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
pub(crate) fn fast_hasher() -> Argon2Hasher {
    // minimum memory cost keeps the test suite quick
    Argon2Hasher::with_params(Params::new(8, 1, 1, None).expect("valid argon2 params"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = fast_hasher();
        let password = "Secur3P@ssw0rd!";
        let hash = hasher.hash(password).expect("hashing should succeed");
        assert!(hasher.matches(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = fast_hasher();
        let hash = hasher.hash("correct-horse-battery-staple").unwrap();
        assert!(!hasher.matches("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = fast_hasher();
        let a = hasher.hash("p1").unwrap();
        let b = hasher.hash("p1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn digest_from_default_params_verifies_with_fast_hasher() {
        // verification reads parameters from the PHC string, not from the hasher
        let digest = Argon2Hasher::default().hash("p1").unwrap();
        assert!(fast_hasher().matches("p1", &digest).unwrap());
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = fast_hasher().matches("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
