//! Identity Lifecycle (C4): orchestrates primary-identity creation,
//! hidden-secondary addition, and identity removal on top of the keyslot
//! container ([`crate::keyslot_container`]) and the config container
//! ([`crate::config_container`]).
//!
//! ```text
//!        [not-initialized]
//!               | init_primary(pw, wf)
//!               v
//!        [primary-only]
//!               | add_secondary(pw_primary, pw_secondary, known_secondaries, wf)
//!               v
//!        [primary + N secondary,  1 <= N <= 3]  <------+
//!               |                                      |
//!               | remove(pw)                           |
//!               v                                      |
//!        [primary + N-1 secondary] ------- add_secondary
//! ```
//!
//! No function here returns a value that reveals how many keyslots or
//! config slots a vault holds; `verify_container_integrity` reports only
//! file-level facts (presence, plausible size) already derivable by `stat`,
//! never an occupancy predicate.

use std::path::{Path, PathBuf};

use latens_crypto_core::Masterkey;
use zeroize::Zeroize;

use crate::config_container;
use crate::config_token::DefaultConfigCodec;
use crate::error::VaultError;
use crate::keyslot_container;
use crate::masterkey_codec::DefaultMasterkeyCodec;
use crate::traits::FilesystemProvider;

/// Filename of the keyslot container (C2) inside a vault directory.
pub const MASTERKEY_FILENAME: &str = "masterkey.cryptomator";
/// Filename of the config container (C3) inside a vault directory.
pub const CONFIG_FILENAME: &str = "vault.cryptomator";
/// Directory the external filesystem provider roots ciphertext data under.
pub const DATA_DIR_NAME: &str = "d";

const VAULT_EXTERNAL_README: &str = "README.txt";
const VAULT_EXTERNAL_README_BODY: &str = "\
This directory holds an encrypted vault. Do not edit, rename, or delete\n\
the files here directly — they are opaque binary containers and a raw\n\
edit will make the vault unrecoverable. Use the vault application to\n\
open, modify, or remove this vault.\n";

const VAULT_INTERNAL_README: &str = ".vault-info.txt";
const VAULT_INTERNAL_README_BODY: &str = "\
This vault may contain more than one identity. Only a password holder can\n\
tell which; the files on disk are indistinguishable from random bytes to\n\
anyone without a password.\n";

/// A pre-authentication, no-password structural check of a vault directory.
///
/// Reports only facts a plain `stat(2)` on the directory already exposes —
/// whether the two container files exist and whether their sizes are
/// plausible for either form (legacy single-keyslot/single-token, or the
/// fixed multi-keyslot size). It never attempts a password-guided read, so
/// it cannot be used to distinguish occupied from empty slots; it exists so
/// a caller can show "this does not look like a vault directory" before
/// ever prompting for a password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityReport {
    /// `masterkey.cryptomator` exists.
    pub masterkey_present: bool,
    /// `masterkey.cryptomator`'s size is plausible (nonzero, legacy or multi-keyslot).
    pub masterkey_plausible_size: bool,
    /// `vault.cryptomator` exists.
    pub config_present: bool,
    /// `vault.cryptomator`'s size is plausible (nonzero, legacy or multi-keyslot).
    pub config_plausible_size: bool,
}

impl IntegrityReport {
    /// `true` iff both containers are present with a plausible size.
    #[must_use]
    pub const fn looks_like_a_vault(&self) -> bool {
        self.masterkey_present
            && self.masterkey_plausible_size
            && self.config_present
            && self.config_plausible_size
    }
}

/// Run the structural check described on [`IntegrityReport`] against `vault_dir`.
#[must_use]
pub fn verify_container_integrity(vault_dir: &Path) -> IntegrityReport {
    let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
    let config_path = vault_dir.join(CONFIG_FILENAME);
    let masterkey_len = std::fs::metadata(&masterkey_path).ok().map(|m| m.len());
    let config_len = std::fs::metadata(&config_path).ok().map(|m| m.len());

    IntegrityReport {
        masterkey_present: masterkey_len.is_some(),
        masterkey_plausible_size: masterkey_len.is_some_and(|len| len > 0),
        config_present: config_len.is_some(),
        config_plausible_size: config_len.is_some_and(|len| len > 0),
    }
}

/// Create the primary identity of a brand-new vault directory.
///
/// Requires `masterkey.cryptomator` to be absent. Persists `masterkey`
/// wrapped under `password` into a fresh keyslot container, asks
/// `fs_provider` to initialize a cryptographic filesystem at `vault_dir`
/// (capturing the config token it writes at [`CONFIG_FILENAME`] — a legacy,
/// single-slot token is an acceptable config-container form at this stage),
/// and writes the vault-external and vault-internal README files.
///
/// # Errors
///
/// Returns `VaultError::VaultAlreadyExists` if a keyslot container already
/// exists at `vault_dir`. Propagates I/O, crypto, and filesystem-provider
/// errors otherwise.
pub fn init_primary<P: FilesystemProvider>(
    vault_dir: &Path,
    masterkey: &Masterkey,
    password: &[u8],
    work_factor: u8,
    fs_provider: &P,
) -> Result<(), VaultError> {
    tracing::debug!(vault_dir = %vault_dir.display(), "init_primary: starting");
    let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
    if masterkey_path.exists() {
        tracing::warn!(vault_dir = %vault_dir.display(), "init_primary: vault already exists");
        return Err(VaultError::VaultAlreadyExists(
            vault_dir.display().to_string(),
        ));
    }

    std::fs::create_dir_all(vault_dir)?;
    std::fs::create_dir_all(vault_dir.join(DATA_DIR_NAME))?;

    fs_provider
        .initialize(vault_dir, masterkey, CONFIG_FILENAME)
        .map_err(|e| {
            tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "init_primary: filesystem init failed");
            VaultError::MountFailed(e.to_string())
        })?;

    let codec = DefaultMasterkeyCodec;
    keyslot_container::persist(&masterkey_path, masterkey, password, work_factor, &codec)?;

    write_readmes(vault_dir)?;
    tracing::debug!(vault_dir = %vault_dir.display(), "init_primary: complete");
    Ok(())
}

/// Add a hidden secondary identity to a vault that already has a primary one.
///
/// Verifies `primary_password` against the existing keyslot container
/// first — the loaded masterkey is dropped immediately, never reused.
/// Generates a fresh masterkey, initializes a standalone cryptographic
/// filesystem for it in a private temp directory, then folds the result
/// into the vault's two containers: the keyslot container gains a slot
/// under `secondary_password`, the config container gains the temp
/// filesystem's config token, and the temp directory's top-level directory
/// tree (directories only, no files) is mirrored into the vault's ciphertext
/// data root. The temp directory and the transient masterkey copy are
/// cleaned up on every exit path by virtue of going out of scope.
///
/// `other_known_secondary_passwords` must list every secondary password the
/// caller already knows to be bound to a slot of this vault (empty for the
/// first secondary). No on-disk signal reveals slot occupancy, so these are
/// the only passwords this call can avoid clobbering; a secondary the
/// caller doesn't mention here is a secondary this call cannot protect.
///
/// # Errors
///
/// Returns `VaultError::AuthRequired` if `primary_password` does not
/// authenticate. Returns `VaultError::DuplicatePassword` or
/// `VaultError::AllSlotsOccupied`/`VaultError::NoAvailableSlot` per the
/// usual container rules. Propagates I/O, crypto, and
/// filesystem-provider errors otherwise.
pub fn add_secondary<P: FilesystemProvider>(
    vault_dir: &Path,
    primary_password: &[u8],
    secondary_password: &[u8],
    other_known_secondary_passwords: &[&[u8]],
    work_factor: u8,
    fs_provider: &P,
) -> Result<(), VaultError> {
    tracing::debug!(vault_dir = %vault_dir.display(), "add_secondary: starting");
    let masterkey_codec = DefaultMasterkeyCodec;
    let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
    let config_path = vault_dir.join(CONFIG_FILENAME);

    // Step 1: verify the primary password. Any failure here — wrong
    // password or otherwise — is reported as AuthRequired, and the loaded
    // key (if any) is dropped at the end of this match without reuse.
    keyslot_container::load(&masterkey_path, primary_password, &masterkey_codec).map_err(|e| {
        tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "add_secondary: primary auth failed");
        VaultError::AuthRequired
    })?;

    // Step 2: fresh masterkey for the secondary identity.
    let secondary_masterkey = Masterkey::generate()?;

    // Step 3: initialize a standalone filesystem in a private temp
    // directory and capture the config token it writes, plus its
    // top-level directory tree.
    let temp_workspace = tempfile::tempdir()?;
    fs_provider
        .initialize(temp_workspace.path(), &secondary_masterkey, CONFIG_FILENAME)
        .map_err(|e| {
            tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "add_secondary: filesystem init failed");
            VaultError::MountFailed(e.to_string())
        })?;
    let secondary_token =
        std::fs::read_to_string(temp_workspace.path().join(CONFIG_FILENAME))?;

    // Step 4: add the keyslot.
    keyslot_container::add_keyslot(
        &masterkey_path,
        &secondary_masterkey,
        secondary_password,
        primary_password,
        other_known_secondary_passwords,
        work_factor,
        &masterkey_codec,
    )
    .inspect_err(|e| {
        tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "add_secondary: add_keyslot failed");
    })?;

    // Step 5: add the config slot.
    config_container::add_config_slot(&config_path, &secondary_token).inspect_err(|e| {
        tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "add_secondary: add_config_slot failed");
    })?;

    // Step 6: mirror the top-level directory tree (directories only).
    mirror_directories(temp_workspace.path(), &vault_dir.join(DATA_DIR_NAME))?;

    // Step 7: temp_workspace and secondary_masterkey are dropped here,
    // regardless of which branch above returned early — TempDir removes
    // its backing directory recursively on drop, and Masterkey zeroizes
    // its backing memory on drop.
    tracing::debug!(vault_dir = %vault_dir.display(), "add_secondary: complete");
    Ok(())
}

/// Remove the identity unlocked by `password`, if any.
///
/// Best-effort removes the matching config slot (legacy single-token
/// config containers cannot be slot-removed and report `false` for that
/// step without failing the whole operation), then removes the matching
/// keyslot. Returns `false` and mutates nothing if `password` does not
/// authenticate any keyslot. Never refuses on "last remaining slot"
/// grounds — that check would require slot counting, which the core
/// forbids.
///
/// # Errors
///
/// Propagates I/O and crypto errors from either container.
pub fn remove(vault_dir: &Path, password: &[u8]) -> Result<bool, VaultError> {
    tracing::debug!(vault_dir = %vault_dir.display(), "remove: starting");
    let masterkey_codec = DefaultMasterkeyCodec;
    let config_codec = DefaultConfigCodec;
    let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
    let config_path = vault_dir.join(CONFIG_FILENAME);

    let masterkey = match keyslot_container::load(&masterkey_path, password, &masterkey_codec) {
        Ok(mk) => mk,
        Err(VaultError::WrongPassphrase) => {
            tracing::debug!(vault_dir = %vault_dir.display(), "remove: no matching identity");
            return Ok(false);
        }
        Err(e) => {
            tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "remove: keyslot load failed");
            return Err(e);
        }
    };

    let mut raw = *masterkey.bytes();
    let _ = config_container::remove_config_slot(&config_path, &raw, &config_codec);
    let removed = keyslot_container::remove_keyslot(&masterkey_path, password).inspect_err(|e| {
        tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "remove: remove_keyslot failed");
    })?;

    raw.zeroize();
    drop(masterkey);
    tracing::debug!(vault_dir = %vault_dir.display(), removed, "remove: complete");
    Ok(removed)
}

fn write_readmes(vault_dir: &Path) -> std::io::Result<()> {
    std::fs::write(vault_dir.join(VAULT_EXTERNAL_README), VAULT_EXTERNAL_README_BODY)?;
    std::fs::write(vault_dir.join(VAULT_INTERNAL_README), VAULT_INTERNAL_README_BODY)?;
    Ok(())
}

/// Recursively mirror the directory structure (directories only, no file
/// contents) rooted at `src` into `dst`, creating `dst` if it does not
/// already exist.
fn mirror_directories(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let target = dst.join(entry.file_name());
            mirror_directories(&entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Resolve the standard keyslot and config container paths for `vault_dir`.
#[must_use]
pub fn container_paths(vault_dir: &Path) -> (PathBuf, PathBuf) {
    (
        vault_dir.join(MASTERKEY_FILENAME),
        vault_dir.join(CONFIG_FILENAME),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ConfigCodec, FilesystemProvider};
    use std::sync::Mutex;

    /// A fake filesystem provider that "initializes" by writing a signed
    /// config token at `dir/config_filename` (mirroring how a real
    /// cryptographic-filesystem provider would persist its own config
    /// alongside ciphertext it manages) and creating a couple of
    /// subdirectories so directory-mirroring has something to observe.
    struct FakeFilesystemProvider {
        codec: DefaultConfigCodec,
        initialize_calls: Mutex<u32>,
    }

    impl FakeFilesystemProvider {
        fn new() -> Self {
            Self {
                codec: DefaultConfigCodec,
                initialize_calls: Mutex::new(0),
            }
        }
    }

    impl FilesystemProvider for FakeFilesystemProvider {
        type Mount = PathBuf;

        fn initialize(
            &self,
            dir: &Path,
            key: &Masterkey,
            config_filename: &str,
        ) -> Result<(), VaultError> {
            *self.initialize_calls.lock().expect("lock") += 1;
            let token = self.codec.encode("fake-fs-config", 1, key.bytes());
            std::fs::write(dir.join(config_filename), token)?;
            std::fs::create_dir_all(dir.join("documents"))?;
            std::fs::create_dir_all(dir.join("photos/2024"))?;
            Ok(())
        }

        fn open(
            &self,
            dir: &Path,
            _key: &Masterkey,
            _config_filename: &str,
        ) -> Result<Self::Mount, VaultError> {
            Ok(dir.to_path_buf())
        }
    }

    #[test]
    fn init_primary_creates_both_containers_and_readmes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        let mk = Masterkey::generate().expect("generate");
        let provider = FakeFilesystemProvider::new();

        init_primary(&vault_dir, &mk, b"hunter2", 4, &provider).expect("init_primary");

        assert!(vault_dir.join(MASTERKEY_FILENAME).exists());
        assert!(vault_dir.join(CONFIG_FILENAME).exists());
        assert!(vault_dir.join(VAULT_EXTERNAL_README).exists());
        assert!(vault_dir.join(VAULT_INTERNAL_README).exists());
        assert!(keyslot_container::is_multikeyslot(
            &vault_dir.join(MASTERKEY_FILENAME)
        ));
    }

    #[test]
    fn init_primary_refuses_when_masterkey_already_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        let mk = Masterkey::generate().expect("generate");
        let provider = FakeFilesystemProvider::new();
        init_primary(&vault_dir, &mk, b"hunter2", 4, &provider).expect("first init");

        let mk2 = Masterkey::generate().expect("generate");
        let result = init_primary(&vault_dir, &mk2, b"other", 4, &provider);
        assert!(matches!(result, Err(VaultError::VaultAlreadyExists(_))));
    }

    #[test]
    fn add_secondary_requires_correct_primary_password() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        let mk = Masterkey::generate().expect("generate");
        let provider = FakeFilesystemProvider::new();
        init_primary(&vault_dir, &mk, b"hunter2", 4, &provider).expect("init_primary");

        let result = add_secondary(&vault_dir, b"wrong-primary", b"deniable", &[], 4, &provider);
        assert!(matches!(result, Err(VaultError::AuthRequired)));
    }

    #[test]
    fn add_secondary_upgrades_containers_and_mirrors_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        let mk = Masterkey::generate().expect("generate");
        let provider = FakeFilesystemProvider::new();
        init_primary(&vault_dir, &mk, b"hunter2", 4, &provider).expect("init_primary");

        add_secondary(&vault_dir, b"hunter2", b"deniable", &[], 4, &provider).expect("add_secondary");

        assert!(keyslot_container::is_multikeyslot(
            &vault_dir.join(MASTERKEY_FILENAME)
        ));
        assert!(config_container::is_multikeyslot(&vault_dir.join(
            CONFIG_FILENAME
        )));
        assert!(vault_dir.join(DATA_DIR_NAME).join("documents").is_dir());
        assert!(vault_dir
            .join(DATA_DIR_NAME)
            .join("photos")
            .join("2024")
            .is_dir());
    }

    #[test]
    fn remove_then_password_no_longer_authenticates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        let mk = Masterkey::generate().expect("generate");
        let provider = FakeFilesystemProvider::new();
        init_primary(&vault_dir, &mk, b"hunter2", 4, &provider).expect("init_primary");
        add_secondary(&vault_dir, b"hunter2", b"deniable", &[], 4, &provider).expect("add_secondary");

        let removed = remove(&vault_dir, b"deniable").expect("remove");
        assert!(removed);

        let codec = DefaultMasterkeyCodec;
        let result =
            keyslot_container::load(&vault_dir.join(MASTERKEY_FILENAME), b"deniable", &codec);
        assert!(matches!(result, Err(VaultError::WrongPassphrase)));

        let still_there =
            keyslot_container::load(&vault_dir.join(MASTERKEY_FILENAME), b"hunter2", &codec)
                .expect("primary still loads");
        assert_eq!(still_there.bytes(), mk.bytes());
    }

    #[test]
    fn remove_with_unknown_password_returns_false_without_mutating() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        let mk = Masterkey::generate().expect("generate");
        let provider = FakeFilesystemProvider::new();
        init_primary(&vault_dir, &mk, b"hunter2", 4, &provider).expect("init_primary");

        let before = std::fs::read(vault_dir.join(MASTERKEY_FILENAME)).expect("read");
        let removed = remove(&vault_dir, b"never-added").expect("remove");
        assert!(!removed);
        let after = std::fs::read(vault_dir.join(MASTERKEY_FILENAME)).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn verify_container_integrity_reports_absence_before_init() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        std::fs::create_dir_all(&vault_dir).expect("create_dir_all");
        let report = verify_container_integrity(&vault_dir);
        assert!(!report.masterkey_present);
        assert!(!report.config_present);
        assert!(!report.looks_like_a_vault());
    }

    #[test]
    fn verify_container_integrity_reports_presence_after_init() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault_dir = dir.path().join("vault");
        let mk = Masterkey::generate().expect("generate");
        let provider = FakeFilesystemProvider::new();
        init_primary(&vault_dir, &mk, b"hunter2", 4, &provider).expect("init_primary");

        let report = verify_container_integrity(&vault_dir);
        assert!(report.looks_like_a_vault());
    }
}
