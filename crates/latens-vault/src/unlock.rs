//! Unlock Dispatch (C5): given a password, recover the masterkey via the
//! keyslot container, pick the matching config slot via the config
//! container, stage it for the external filesystem provider, and clean up
//! on any failure.
//!
//! Identity is never exposed to the caller — the winning keyslot index and
//! the winning config slot index are both internal to [`crate::keyslot_container`]
//! and [`crate::config_container`]. The caller receives only a mount handle
//! and an [`UnlockSession`] to lock later.

use std::path::{Path, PathBuf};

use latens_crypto_core::Masterkey;
use zeroize::Zeroize;

use crate::config_container;
use crate::config_token::DefaultConfigCodec;
use crate::error::VaultError;
use crate::keyslot_container;
use crate::lifecycle::{CONFIG_FILENAME, MASTERKEY_FILENAME};
use crate::masterkey_codec::DefaultMasterkeyCodec;
use crate::traits::FilesystemProvider;

/// Transient dotfile the config token is staged into before handing the
/// vault off to the filesystem provider, when the config container is in
/// multi-keyslot form. Deleted on lock and on any unlock failure.
pub const UNLOCK_DOTFILE: &str = ".vault.cryptomator.unlock";

/// A successful unlock: a mount handle plus everything needed to lock later.
///
/// The masterkey is owned by this session (per the core's ownership rule
/// that a loaded masterkey belongs to the caller of unlock) and is
/// zeroized when the session is locked or dropped. The unlock dotfile, if
/// one was staged, is removed on lock.
pub struct UnlockSession<M> {
    /// The mount handle returned by the filesystem provider.
    pub mount: M,
    masterkey: Masterkey,
    dotfile_path: Option<PathBuf>,
}

impl<M> UnlockSession<M> {
    /// Destroy the held masterkey and delete the unlock dotfile, if any.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Io` if the dotfile exists but cannot be removed.
    pub fn lock(mut self) -> Result<(), VaultError> {
        tracing::debug!("unlock_session: locking");
        // `self.masterkey` is dropped along with `self` at the end of this
        // call, which zeroizes its backing memory (Masterkey's SecretBytes
        // is ZeroizeOnDrop) — no explicit destroy step is needed here.
        self.cleanup_dotfile()
    }

    fn cleanup_dotfile(&mut self) -> Result<(), VaultError> {
        if let Some(path) = self.dotfile_path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(error = %e, "unlock_session: dotfile cleanup failed");
                    return Err(VaultError::Io(e));
                }
            }
        }
        Ok(())
    }
}

impl<M> Drop for UnlockSession<M> {
    fn drop(&mut self) {
        let _ = self.cleanup_dotfile();
    }
}

/// Unlock `vault_dir` with `password` and mount it via `fs_provider`.
///
/// 1. Recover the masterkey from the keyslot container.
/// 2. If the config container is multi-keyslot, find the config slot that
///    verifies under the recovered masterkey and stage its token into
///    [`UNLOCK_DOTFILE`] (owner-only permissions on Unix) for the provider
///    to read. Otherwise hand the provider the plain config filename.
/// 3. Ask `fs_provider` to open the mount.
///
/// Every exit path after the masterkey is recovered zeroizes the raw key
/// copy this function took and deletes the unlock dotfile on failure.
///
/// # Errors
///
/// Returns `VaultError::WrongPassphrase`, `VaultError::NoMatchingConfig`,
/// `VaultError::MountFailed`, or `VaultError::Io` per the usual container
/// and provider failure modes.
pub fn unlock_vault<P: FilesystemProvider>(
    vault_dir: &Path,
    password: &[u8],
    fs_provider: &P,
) -> Result<UnlockSession<P::Mount>, VaultError> {
    tracing::debug!(vault_dir = %vault_dir.display(), "unlock_vault: starting");
    let masterkey_codec = DefaultMasterkeyCodec;
    let config_codec = DefaultConfigCodec;
    let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
    let config_path = vault_dir.join(CONFIG_FILENAME);

    let masterkey = keyslot_container::load(&masterkey_path, password, &masterkey_codec)
        .inspect_err(|e| {
            tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "unlock_vault: keyslot load failed");
        })?;
    let mut raw = *masterkey.bytes();

    let result = (|| -> Result<(P::Mount, Option<PathBuf>), VaultError> {
        if config_container::is_multikeyslot(&config_path) {
            let (token, _verified) =
                config_container::load_with_token(&config_path, &raw, &config_codec)?;
            let dotfile_path = vault_dir.join(UNLOCK_DOTFILE);
            write_dotfile(&dotfile_path, &token)?;
            match fs_provider.open(vault_dir, &masterkey, UNLOCK_DOTFILE) {
                Ok(mount) => Ok((mount, Some(dotfile_path))),
                Err(e) => {
                    let _ = std::fs::remove_file(&dotfile_path);
                    Err(VaultError::MountFailed(e.to_string()))
                }
            }
        } else {
            let mount = fs_provider
                .open(vault_dir, &masterkey, CONFIG_FILENAME)
                .map_err(|e| VaultError::MountFailed(e.to_string()))?;
            Ok((mount, None))
        }
    })();

    raw.zeroize();

    match result {
        Ok((mount, dotfile_path)) => {
            tracing::debug!(vault_dir = %vault_dir.display(), "unlock_vault: mounted");
            Ok(UnlockSession {
                mount,
                masterkey,
                dotfile_path,
            })
        }
        Err(e) => {
            tracing::warn!(vault_dir = %vault_dir.display(), error = %e, "unlock_vault: failed after key recovery");
            drop(masterkey);
            Err(e)
        }
    }
}

#[cfg(unix)]
fn write_dotfile(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, contents)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn write_dotfile(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
