//! Identity hashing for voice-platform user ids.
//!
//! Raw platform user ids never reach the bot backend. Each id is replaced by
//! a keyed HMAC-SHA256 digest rendered as 64 lowercase hex characters, which
//! sits inside the `[0-9a-f]` alphabet every Direct Line deployment accepts
//! for `from.id`.

use std::fmt::Write as _;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

pub const DEFAULT_IDENTITY_HASH_KEY: &str = "vox-bridge-identity";
pub const HASHED_IDENTITY_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
/// Enumerates supported `IdentityHashError` values.
pub enum IdentityHashError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

#[derive(Clone)]
/// Deterministic one-way mapping from raw platform ids to backend-safe ids.
pub struct IdentityHasher {
    key: Vec<u8>,
}

impl std::fmt::Debug for IdentityHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityHasher")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_HASH_KEY)
    }
}

impl IdentityHasher {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    pub fn hash(&self, raw_id: &str) -> Result<String, IdentityHashError> {
        if raw_id.trim().is_empty() {
            return Err(IdentityHashError::InvalidInput("raw identifier cannot be empty"));
        }
        // HMAC accepts keys of any length, including empty.
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|_| IdentityHashError::InvalidInput("identity hash key rejected"))?;
        mac.update(raw_id.as_bytes());
        let digest = mac.finalize().into_bytes();
        let mut output = String::with_capacity(HASHED_IDENTITY_LEN);
        for byte in digest {
            let _ = write!(&mut output, "{byte:02x}");
        }
        Ok(output)
    }
}
