//! `latens-vault` — the plausibly-deniable multi-keyslot vault core.
//!
//! Two fixed-size binary container formats and the protocols that create,
//! unlock, mutate, and destroy them:
//!
//! - [`keyslot_container`] (C2) — the 16 KiB masterkey keyslot container.
//! - [`config_container`] (C3) — the 32 KiB vault configuration container.
//! - [`lifecycle`] (C4) — primary creation, secondary addition, removal.
//! - [`unlock`] (C5) — password-to-mount dispatch.
//! - [`migration`] (C6) — legacy single-token-to-multi-keyslot migration.
//!
//! An observer without a valid password cannot distinguish zero, one, two,
//! three, or four identities in a vault, nor a vault from uniform random
//! bytes of the same sizes. No public function in this crate returns a
//! count or index of occupied slots; see each module's "Forbidden
//! operations" notes for the operations this rules out.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod atomic;
pub mod config_container;
pub mod config_token;
pub mod error;
pub mod keyslot_container;
pub mod lifecycle;
pub mod masterkey_codec;
pub mod migration;
pub mod traits;
pub mod unlock;

pub use config_token::DefaultConfigCodec;
pub use error::VaultError;
pub use lifecycle::{
    add_secondary, init_primary, remove, verify_container_integrity, IntegrityReport,
    CONFIG_FILENAME, DATA_DIR_NAME, MASTERKEY_FILENAME,
};
pub use masterkey_codec::DefaultMasterkeyCodec;
pub use migration::{migrate, LEGACY_BACKUP_FILENAME, MIGRATED_BACKUP_FILENAME};
pub use traits::{ConfigCodec, FilesystemProvider, MasterkeyCodec, UnverifiedConfig, VerifiedConfig};
pub use unlock::{unlock_vault, UnlockSession, UNLOCK_DOTFILE};
