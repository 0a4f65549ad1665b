//! Legacy Migrator (C6): folds an old hidden-identity auxiliary file
//! (`vault.bak`) into the config container as a second slot, then removes
//! `vault.bak` — after first copying it to `vault.bak.migrated` as a
//! crash-safety backup, so a crash between the backup copy and the final
//! commit still leaves `vault.bak` present for a retried attempt.
//!
//! Idempotent: re-running after a completed migration is a no-op, detected
//! by the absence of `vault.bak`.

use std::path::Path;

use crate::config_container;
use crate::error::VaultError;
use crate::lifecycle::CONFIG_FILENAME;

/// Legacy hidden-identity indicator, consumed (and deleted) by [`migrate`].
pub const LEGACY_BACKUP_FILENAME: &str = "vault.bak";
/// Crash-safety copy of `vault.bak`, written before it is deleted.
pub const MIGRATED_BACKUP_FILENAME: &str = "vault.bak.migrated";

/// Migrate `vault_dir`'s legacy hidden-identity marker into the config
/// container, if one is present.
///
/// Returns `Ok(false)` without touching anything when `vault.bak` is
/// absent (including when a prior call already migrated it) — this makes
/// `migrate` its own no-op check, so `migrate(migrate(dir))` behaves
/// identically to a single call.
///
/// # Errors
///
/// Propagates I/O errors from the backup copy or the config container
/// write, and `VaultError::NoAvailableSlot` if the config container
/// already has four occupied slots.
pub fn migrate(vault_dir: &Path) -> Result<bool, VaultError> {
    tracing::debug!(vault_dir = %vault_dir.display(), "migrate: checking for legacy backup");
    let bak_path = vault_dir.join(LEGACY_BACKUP_FILENAME);
    if !bak_path.exists() {
        tracing::debug!(vault_dir = %vault_dir.display(), "migrate: nothing to migrate");
        return Ok(false);
    }

    let migrated_path = vault_dir.join(MIGRATED_BACKUP_FILENAME);
    // Copy (not rename) so a crash between this line and the final
    // deletion below still leaves vault.bak present for a retry.
    std::fs::copy(&bak_path, &migrated_path)?;

    let legacy_token = std::fs::read_to_string(&bak_path)?;
    let config_path = vault_dir.join(CONFIG_FILENAME);
    config_container::add_config_slot(&config_path, &legacy_token).inspect_err(|e| {
        tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "migrate: add_config_slot failed");
    })?;

    std::fs::remove_file(&bak_path)?;
    tracing::debug!(vault_dir = %vault_dir.display(), "migrate: complete");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_token::DefaultConfigCodec;

    #[test]
    fn migrate_is_noop_when_backup_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        std::fs::create_dir_all(&vault_dir).expect("create_dir_all");
        assert!(!migrate(&vault_dir).expect("migrate"));
    }

    #[test]
    fn migrate_merges_backup_into_config_container() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        std::fs::create_dir_all(&vault_dir).expect("create_dir_all");

        let codec = DefaultConfigCodec;
        let primary_mk = [0x11u8; 32];
        let secondary_mk = [0x22u8; 32];
        let primary_token = codec.encode("primary-config", 1, &primary_mk);
        let secondary_token = codec.encode("secondary-config", 1, &secondary_mk);

        config_container::persist(&vault_dir.join(CONFIG_FILENAME), &primary_token)
            .expect("persist primary config");
        std::fs::write(vault_dir.join(LEGACY_BACKUP_FILENAME), &secondary_token)
            .expect("write vault.bak");

        let migrated = migrate(&vault_dir).expect("migrate");
        assert!(migrated);

        assert!(!vault_dir.join(LEGACY_BACKUP_FILENAME).exists());
        let backup = std::fs::read_to_string(vault_dir.join(MIGRATED_BACKUP_FILENAME))
            .expect("read migrated backup");
        assert_eq!(backup, secondary_token);

        assert!(config_container::is_multikeyslot(
            &vault_dir.join(CONFIG_FILENAME)
        ));
        let primary_verified =
            config_container::load(&vault_dir.join(CONFIG_FILENAME), &primary_mk, &codec)
                .expect("load primary");
        assert_eq!(primary_verified.data, "primary-config");
        let secondary_verified =
            config_container::load(&vault_dir.join(CONFIG_FILENAME), &secondary_mk, &codec)
                .expect("load secondary");
        assert_eq!(secondary_verified.data, "secondary-config");
    }

    #[test]
    fn migrate_twice_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        std::fs::create_dir_all(&vault_dir).expect("create_dir_all");

        let codec = DefaultConfigCodec;
        let primary_mk = [0x11u8; 32];
        let secondary_mk = [0x22u8; 32];
        config_container::persist(
            &vault_dir.join(CONFIG_FILENAME),
            &codec.encode("primary-config", 1, &primary_mk),
        )
        .expect("persist primary config");
        std::fs::write(
            vault_dir.join(LEGACY_BACKUP_FILENAME),
            codec.encode("secondary-config", 1, &secondary_mk),
        )
        .expect("write vault.bak");

        assert!(migrate(&vault_dir).expect("first migrate"));
        let after_first = std::fs::read(vault_dir.join(CONFIG_FILENAME)).expect("read");

        assert!(!migrate(&vault_dir).expect("second migrate is a no-op"));
        let after_second = std::fs::read(vault_dir.join(CONFIG_FILENAME)).expect("read");
        assert_eq!(after_first, after_second);
    }
}
