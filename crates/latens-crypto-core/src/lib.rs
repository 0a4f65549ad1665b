//! `latens-crypto-core` — pure cryptographic primitives.
//!
//! This crate is the audit target: zero network, zero async, zero UI
//! dependencies. It provides AES-256-GCM, PBKDF2-HMAC-SHA256, scrypt, and the
//! [`Masterkey`] type; higher layers (container formats, lifecycle
//! orchestration) live in `latens-vault`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod kdf;
pub mod masterkey;
pub mod memory;
pub mod symmetric;

pub use error::CryptoError;
pub use kdf::{
    brute_force_time_estimate, calibrate, force_recalibrate, pbkdf2_derive, scrypt_derive,
    security_level, CalibrationModel, KEYSLOT_PBKDF2_ITERATIONS,
};
pub use masterkey::{Masterkey, MASTERKEY_LEN};
pub use memory::{disable_core_dumps, LockedRegion, SecretBuffer, SecretBytes};
pub use symmetric::{decrypt, encrypt, SealedData, KEY_LEN, NONCE_LEN, TAG_LEN};
