//! Cryptographic error types for `latens-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (parameter validation or the underlying primitive rejected input).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed — ciphertext tampered or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation failure (mlock, guard pages).
    #[error("secure memory error: {0}")]
    SecureMemory(String),

    /// A single-keyslot masterkey blob did not authenticate under the supplied password.
    #[error("wrong passphrase")]
    WrongPassphrase,

    /// A masterkey blob was the wrong length or otherwise structurally malformed.
    #[error("malformed masterkey blob: {0}")]
    MalformedBlob(String),
}
