//! Credential hashing
//!
//! Both hashers are CPU-bound, so every call runs on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::error::{IdentityError, IdentityResult};

/// bcrypt for full passwords
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub async fn hash(&self, password: &str) -> IdentityResult<String> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| IdentityError::Hashing(format!("hashing task failed: {e}")))?
            .map_err(|e| IdentityError::Hashing(e.to_string()))
    }

    pub async fn verify(&self, password: &str, hash: &str) -> IdentityResult<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| IdentityError::Hashing(format!("verification task failed: {e}")))?
            .map_err(|e| IdentityError::Hashing(e.to_string()))
    }

    /// Whether `password` matches any of `hashes`
    pub async fn matches_any(&self, password: &str, hashes: &[String]) -> IdentityResult<bool> {
        for hash in hashes {
            if self.verify(password, hash).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A freshly computed passcode hash and the salt that produced it
#[derive(Debug, Clone)]
pub struct PasscodeDigest {
    pub hash: String,
    pub salt: String,
}

/// Argon2id for short numeric passcodes
#[derive(Clone)]
pub struct PasscodeHasher {
    argon2: Argon2<'static>,
}

impl PasscodeHasher {
    /// Argon2id with 19 MiB memory, 2 iterations, 1 lane, 32-byte output
    pub fn new() -> IdentityResult<Self> {
        let params = Params::new(19456, 2, 1, Some(32))
            .map_err(|e| IdentityError::Hashing(format!("invalid Argon2 params: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub async fn hash(&self, passcode: &str) -> IdentityResult<PasscodeDigest> {
        let passcode = passcode.to_string();
        let argon2 = self.argon2.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(passcode.as_bytes(), &salt)
                .map(|hash| PasscodeDigest {
                    hash: hash.to_string(),
                    salt: salt.as_str().to_string(),
                })
                .map_err(|e| IdentityError::Hashing(e.to_string()))
        })
        .await
        .map_err(|e| IdentityError::Hashing(format!("hashing task failed: {e}")))?
    }

    pub async fn verify(&self, passcode: &str, hash: &str) -> IdentityResult<bool> {
        let passcode = passcode.to_string();
        let hash = hash.to_string();
        let argon2 = self.argon2.clone();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash).map_err(|e| IdentityError::Hashing(e.to_string()))?;
            match argon2.verify_password(passcode.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(IdentityError::Hashing(e.to_string())),
            }
        })
        .await
        .map_err(|e| IdentityError::Hashing(format!("verification task failed: {e}")))?
    }

    pub async fn matches_any(&self, passcode: &str, hashes: &[String]) -> IdentityResult<bool> {
        for hash in hashes {
            if self.verify(passcode, hash).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bcrypt_round_trip() {
        let hasher = BcryptHasher::new(4);
        let hash = hasher.hash("Correct-Horse-9").await.unwrap();
        assert!(hasher.verify("Correct-Horse-9", &hash).await.unwrap());
        assert!(!hasher.verify("correct-horse-9", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_passcode_salts_differ() {
        let hasher = PasscodeHasher::new().unwrap();
        let first = hasher.hash("4826").await.unwrap();
        let second = hasher.hash("4826").await.unwrap();

        assert_ne!(first.hash, second.hash);
        assert!(first.hash.starts_with("$argon2id$"));
        assert!(hasher.verify("4826", &second.hash).await.unwrap());
        assert!(!hasher.verify("4827", &first.hash).await.unwrap());
        assert!(hasher.verify("4826", "not-a-phc-string").await.is_err());
    }
}
