//! Keyed sealing of canonical bytes.
//!
//! The seal is an HMAC-SHA256 digest over an entry's canonical bytes,
//! rendered as 64 lowercase hex characters. The key is deployment secret
//! material: it enters as a [`SecretBox`], is folded into the MAC state at
//! construction, and is never logged, persisted or exposed through `Debug`.
//!
//! Verification uses constant-time digest comparison.

use std::fmt;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded seal.
pub const SEAL_HEX_LEN: usize = 64;

/// Errors raised while constructing a [`Sealer`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SealError {
    /// The HMAC implementation rejected the key.
    #[error("HMAC key rejected: {message}")]
    InvalidKey {
        /// Description from the MAC implementation.
        message: String,
    },
}

/// Computes and checks entry seals with a fixed secret key.
///
/// Cloning a `Sealer` clones the keyed MAC state, not the raw key; the key
/// bytes themselves are dropped after construction.
#[derive(Clone)]
pub struct Sealer {
    mac: HmacSha256,
}

impl Sealer {
    /// Creates a sealer keyed with the given secret.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::InvalidKey`] if the MAC implementation rejects
    /// the key. HMAC-SHA256 accepts keys of any non-zero length, so this
    /// only fires on an empty key that slipped past option validation.
    pub fn new(key: &SecretBox<[u8]>) -> Result<Self, SealError> {
        let mac = HmacSha256::new_from_slice(key.expose_secret()).map_err(|e| {
            SealError::InvalidKey {
                message: e.to_string(),
            }
        })?;
        Ok(Self { mac })
    }

    /// Seals the given bytes: `HMAC-SHA256(key, bytes)` as lowercase hex.
    #[must_use]
    pub fn seal(&self, bytes: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(bytes);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks whether `expected_hex` is the seal of `bytes`.
    ///
    /// The comparison is constant-time in the digest contents. Expected
    /// values are compared case-sensitively; seals are always lowercase.
    #[must_use]
    pub fn matches(&self, bytes: &[u8], expected_hex: &str) -> bool {
        let computed = self.seal(bytes);
        computed.as_bytes().ct_eq(expected_hex.as_bytes()).into()
    }
}

impl fmt::Debug for Sealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}
