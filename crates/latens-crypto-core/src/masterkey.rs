//! The long-term symmetric key protecting one identity's vault contents.
//!
//! A [`Masterkey`] is an opaque 256-bit key. It supports CSPRNG generation, a
//! deep copy, serialization to (and loading from) a single-keyslot blob
//! protected by a password and an scrypt work factor, and explicit
//! zeroizing destruction.

use crate::error::CryptoError;
use crate::kdf::scrypt_derive;
use crate::memory::SecretBytes;
use crate::symmetric::{decrypt, encrypt, SealedData};
use rand::rngs::OsRng;
use rand::RngCore;

/// Length of a masterkey in bytes.
pub const MASTERKEY_LEN: usize = 32;

/// Length of the random salt prefixed to a single-keyslot blob.
const BLOB_SALT_LEN: usize = 16;

/// Domain-separation tag for the AEAD wrapping a single-keyslot blob. The
/// blob is consumed only from inside an already-authenticated keyslot
/// envelope, so this AAD exists to keep the two AEAD layers from ever being
/// interchangeable, not to add confidentiality.
const BLOB_AAD: &[u8] = b"latens-masterkey-blob-v1";

/// Minimum serialized blob length: salt + work factor byte + empty `SealedData`.
const MIN_BLOB_LEN: usize = BLOB_SALT_LEN + 1 + crate::symmetric::NONCE_LEN + crate::symmetric::TAG_LEN;

/// An opaque 256-bit symmetric key.
pub struct Masterkey {
    bytes: SecretBytes<MASTERKEY_LEN>,
}

impl Masterkey {
    /// Generate a fresh masterkey from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self {
            bytes: SecretBytes::random()?,
        })
    }

    /// Build a masterkey from raw bytes (e.g. recovered from a single-keyslot blob).
    #[must_use]
    pub fn from_bytes(bytes: [u8; MASTERKEY_LEN]) -> Self {
        Self {
            bytes: SecretBytes::new(bytes),
        }
    }

    /// Deep-copy this key into an independent owner. Useful when a transient
    /// handle must be handed to a collaborator (e.g. an FS provider) while the
    /// original owner keeps its own zeroize-on-drop copy.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self::from_bytes(*self.bytes.expose())
    }

    /// Borrow the raw key bytes for a cryptographic operation. Keep exposure
    /// minimal; do not persist the returned slice past the expression that
    /// needs it.
    #[must_use]
    pub fn bytes(&self) -> &[u8; MASTERKEY_LEN] {
        self.bytes.expose()
    }

    /// Explicitly destroy this key, overwriting its backing memory with
    /// zeros. Equivalent to dropping the value — provided for call sites that
    /// want to make destruction visible rather than implicit.
    pub fn destroy(self) {
        drop(self);
    }

    /// Serialize this masterkey to a single-keyslot blob protected by
    /// `password` at the given scrypt work factor.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if key derivation or encryption fails.
    pub fn serialize_single_keyslot(
        &self,
        password: &[u8],
        work_factor: u8,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut salt = [0u8; BLOB_SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let wrapping_key = scrypt_derive(password, &salt, work_factor)?;
        let sealed = encrypt(self.bytes.expose(), wrapping_key.expose(), BLOB_AAD)?;

        let mut out = Vec::with_capacity(MIN_BLOB_LEN);
        out.extend_from_slice(&salt);
        out.push(work_factor);
        out.extend_from_slice(&sealed.to_bytes());
        Ok(out)
    }

    /// Load a masterkey from a single-keyslot blob, given the password that
    /// protects it.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::WrongPassphrase` if the password does not
    /// authenticate the blob, or `CryptoError::MalformedBlob` if the blob is
    /// too short or decrypts to the wrong length.
    pub fn deserialize_single_keyslot(bytes: &[u8], password: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_BLOB_LEN {
            return Err(CryptoError::MalformedBlob(format!(
                "blob too short: {} bytes (minimum {MIN_BLOB_LEN})",
                bytes.len()
            )));
        }
        let salt = &bytes[0..BLOB_SALT_LEN];
        let work_factor = bytes[BLOB_SALT_LEN];
        let sealed = SealedData::from_bytes(&bytes[BLOB_SALT_LEN + 1..])
            .map_err(|e| CryptoError::MalformedBlob(e.to_string()))?;

        let wrapping_key = scrypt_derive(password, salt, work_factor)?;
        let plaintext = decrypt(&sealed, wrapping_key.expose(), BLOB_AAD)
            .map_err(|_| CryptoError::WrongPassphrase)?;

        if plaintext.len() != MASTERKEY_LEN {
            return Err(CryptoError::MalformedBlob(format!(
                "decrypted masterkey length {} (expected {MASTERKEY_LEN})",
                plaintext.len()
            )));
        }
        let mut key = [0u8; MASTERKEY_LEN];
        key.copy_from_slice(plaintext.expose());
        Ok(Self::from_bytes(key))
    }
}

impl std::fmt::Debug for Masterkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Masterkey(***)")
    }
}
