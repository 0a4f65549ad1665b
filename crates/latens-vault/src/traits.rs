//! Trait seams to the core's external collaborators.
//!
//! Per the dynamic-dispatch mapping this crate follows, there are exactly two
//! trait objects the container layer depends on — [`MasterkeyCodec`] and
//! [`ConfigCodec`] — plus [`FilesystemProvider`], the consumer-side interface
//! the lifecycle and unlock layers hand a recovered masterkey to. Identity
//! records stay plain structs; nothing here models an identity as a subclass.

use crate::error::VaultError;
use latens_crypto_core::Masterkey;
use std::path::Path;

/// Serializes and loads a [`Masterkey`] to/from a single-keyslot blob.
///
/// A keyslot envelope's plaintext carries exactly the bytes this trait
/// produces; the envelope itself never inspects them.
pub trait MasterkeyCodec: Send + Sync {
    /// Serialize `mk` into a password-and-work-factor-protected blob.
    ///
    /// # Errors
    ///
    /// Returns `VaultError` if serialization fails.
    fn serialize(&self, mk: &Masterkey, password: &[u8], work_factor: u8) -> Result<Vec<u8>, VaultError>;

    /// Recover a [`Masterkey`] from a blob produced by [`Self::serialize`].
    ///
    /// # Errors
    ///
    /// Returns `VaultError::WrongPassphrase` if `password` does not
    /// authenticate the blob.
    fn deserialize(&self, bytes: &[u8], password: &[u8]) -> Result<Masterkey, VaultError>;
}

/// Decodes a signed configuration token into an [`UnverifiedConfig`].
///
/// Decoding is structural only — no masterkey is required and no signature is
/// checked. Verification happens on the returned value via
/// [`UnverifiedConfig::verify`].
pub trait ConfigCodec: Send + Sync {
    /// Parse `token` into its unverified components.
    ///
    /// # Errors
    ///
    /// Returns `VaultError` if `token` is not well-formed.
    fn decode(&self, token: &str) -> Result<UnverifiedConfig, VaultError>;
}

/// A configuration token that has been parsed but not yet verified against a
/// masterkey.
#[derive(Debug, Clone)]
pub struct UnverifiedConfig {
    pub(crate) token: String,
    pub(crate) version: u32,
    pub(crate) data: String,
    pub(crate) signature: Vec<u8>,
    pub(crate) signed_part: String,
}

impl UnverifiedConfig {
    /// The format version claimed by the token itself. Trusting this value
    /// before `verify` succeeds would let an attacker pick the verification
    /// path; it is exposed only as a hint for callers that want to route to a
    /// version-specific verifier before confirming the MAC.
    #[must_use]
    pub fn alleged_version(&self) -> u32 {
        self.version
    }

    /// Verify this token's signature under `masterkey_bytes` and, if it
    /// matches, confirm it claims `claimed_version`.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::NoMatchingConfig` if the signature does not
    /// verify or the verified version does not equal `claimed_version`.
    pub fn verify(
        &self,
        masterkey_bytes: &[u8],
        claimed_version: u32,
    ) -> Result<VerifiedConfig, VaultError> {
        crate::config_token::verify_signature(
            self.signed_part.as_bytes(),
            &self.signature,
            masterkey_bytes,
        )?;
        if self.version != claimed_version {
            return Err(VaultError::NoMatchingConfig);
        }
        Ok(VerifiedConfig {
            version: self.version,
            data: self.data.clone(),
        })
    }
}

/// A configuration token whose signature has been verified under the caller's
/// masterkey.
#[derive(Debug, Clone)]
pub struct VerifiedConfig {
    /// The format version the token claims, now trustworthy (the MAC covers it).
    pub version: u32,
    /// Opaque payload data (the FS provider's configuration, as a string).
    pub data: String,
}

/// Mounts a cryptographic filesystem rooted at a vault directory.
///
/// The core treats this entirely as a black box: it hands over a masterkey
/// copy and a config filename and receives back a mount handle, or an error.
pub trait FilesystemProvider {
    /// The mount handle returned on success.
    type Mount;

    /// Initialize a fresh filesystem rooted at `dir` under `key`, recording
    /// its configuration under `config_filename`.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::MountFailed` if initialization fails.
    fn initialize(&self, dir: &Path, key: &Masterkey, config_filename: &str) -> Result<(), VaultError>;

    /// Mount the filesystem rooted at `dir` under `key`, using the
    /// configuration recorded under `config_filename`.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::MountFailed` if the mount fails.
    fn open(
        &self,
        dir: &Path,
        key: &Masterkey,
        config_filename: &str,
    ) -> Result<Self::Mount, VaultError>;
}
