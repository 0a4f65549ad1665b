//! Atomic whole-file writes shared by every container format in this crate.
//!
//! Every mutating container operation writes a full replacement file to a
//! temporary sibling and renames it over the target. A crash or a failing
//! write never leaves the target file partially updated — either the rename
//! lands and the new bytes are visible, or it does not and the old file (if
//! any) is untouched.

use std::io::Write;
use std::path::Path;

/// Write `bytes` to `path` atomically via a temp file in the same directory.
///
/// On Unix, the temp file's permissions are restricted to owner-only before
/// the rename, so the window between create and rename never exposes
/// world/group-readable container bytes.
///
/// # Errors
///
/// Returns `std::io::Error` if the parent directory cannot be determined, the
/// temp file cannot be created or written, or the rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target path has no parent directory",
        )
    })?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".latens-tmp-")
        .tempfile_in(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)?;
    Ok(())
}
