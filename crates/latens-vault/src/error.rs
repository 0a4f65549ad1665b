//! Vault error types for `latens-vault`.

use latens_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// No keyslot in the container authenticated the supplied password.
    #[error("wrong passphrase")]
    WrongPassphrase,

    /// No config slot verified under the masterkey recovered from C2.
    #[error("no configuration slot matches this masterkey")]
    NoMatchingConfig,

    /// `add_keyslot` found the new password already bound to an existing slot.
    #[error("password already in use by another identity")]
    DuplicatePassword,

    /// All four keyslots are occupied in a way that forbids safe insertion.
    #[error("all keyslots are occupied")]
    AllSlotsOccupied,

    /// All four config slots are occupied; no slot available for a new token.
    #[error("no available configuration slot")]
    NoAvailableSlot,

    /// A secondary-identity operation was attempted without first verifying
    /// the primary password.
    #[error("primary password verification required")]
    AuthRequired,

    /// A slot's encrypted-and-authenticated plaintext had an out-of-range
    /// length field. Cannot occur under honest writes; fatal to that slot only.
    #[error("corrupt container: {0}")]
    CorruptContainer(String),

    /// Vault directory, keyslot container, or config container not found.
    #[error("vault not found: {0}")]
    NotFound(String),

    /// The external filesystem provider failed to mount.
    #[error("mount failed: {0}")]
    MountFailed(String),

    /// The vault (or the filesystem it exposes) is read-only.
    #[error("vault is read-only")]
    ReadOnly,

    /// A vault already exists at the target path.
    #[error("vault already exists: {0}")]
    VaultAlreadyExists(String),

    /// Legacy-to-multi-keyslot migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
