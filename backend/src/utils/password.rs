//! Legacy credential digest: `md5_hex(sha1_hex(password + salt1) + salt2)`.
//!
//! Every stored reseller digest depends on this exact pipeline. Replacing it
//! needs a versioned migration, not an in-place change.

use md5::Md5;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

use crate::error::ConfigError;

#[derive(Clone)]
pub struct LegacyHasher {
    salt_primary: String,
    salt_secondary: String,
}

impl std::fmt::Debug for LegacyHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyHasher").finish_non_exhaustive()
    }
}

impl LegacyHasher {
    pub fn new(
        salt_primary: impl Into<String>,
        salt_secondary: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let salt_primary = salt_primary.into();
        let salt_secondary = salt_secondary.into();
        if salt_primary.is_empty() {
            return Err(ConfigError::Missing("PASSWORD_SALT_PRIMARY"));
        }
        if salt_secondary.is_empty() {
            return Err(ConfigError::Missing("PASSWORD_SALT_SECONDARY"));
        }
        Ok(Self {
            salt_primary,
            salt_secondary,
        })
    }

    pub fn hash(&self, plaintext: &str) -> String {
        let mut stage1 = Sha1::new();
        stage1.update(plaintext.as_bytes());
        stage1.update(self.salt_primary.as_bytes());
        let stage1_hex = hex::encode(stage1.finalize());

        let mut stage2 = Md5::new();
        stage2.update(stage1_hex.as_bytes());
        stage2.update(self.salt_secondary.as_bytes());
        hex::encode(stage2.finalize())
    }

    pub fn verify(&self, plaintext: &str, stored_digest: &str) -> bool {
        let computed = self.hash(plaintext);
        let stored = stored_digest.trim().to_ascii_lowercase();
        computed.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}
