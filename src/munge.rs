//! Munge authentication key synthesis
//!
//! Every daemon of one cluster authenticates with the same symmetric key,
//! mounted from a binary ConfigMap. A fresh key is drawn per provisioning
//! pass and never rotated in place.

use aws_lc_rs::digest::SHA256_OUTPUT_LEN;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::Error;

/// Length of the secret material in bytes
pub const SECRET_LEN: usize = 128;

/// Domain-separation tag carried alongside the key
pub const KEY_INFO: &[u8] = b"MUNGEKEY";

/// Freshly generated munge key material
///
/// The salt and info are kept for a future derivation step. Only the raw
/// secret is written to the cluster today.
#[derive(Clone)]
pub struct MungeKey {
    secret: [u8; SECRET_LEN],
    salt: [u8; SHA256_OUTPUT_LEN],
}

impl MungeKey {
    /// Draw a new key from the system CSPRNG
    pub fn generate() -> Result<Self, Error> {
        let mut secret = [0u8; SECRET_LEN];
        let mut salt = [0u8; SHA256_OUTPUT_LEN];
        aws_lc_rs::rand::fill(&mut secret)
            .map_err(|_| Error::crypto("failed to generate munge secret"))?;
        aws_lc_rs::rand::fill(&mut salt)
            .map_err(|_| Error::crypto("failed to generate munge salt"))?;
        Ok(Self { secret, salt })
    }

    /// Raw secret bytes
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Salt reserved for key derivation
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Fixed domain tag
    pub fn info(&self) -> &'static [u8] {
        KEY_INFO
    }

    /// Secret encoded as base64, the form ConfigMap `binaryData` expects
    pub fn secret_base64(&self) -> String {
        STANDARD.encode(self.secret)
    }
}

impl std::fmt::Debug for MungeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MungeKey")
            .field("secret", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}
