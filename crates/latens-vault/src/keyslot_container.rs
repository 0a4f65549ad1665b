//! Keyslot Container (KSC): a fixed 16 KiB file of four 4 KiB slots, each an
//! AES-256-GCM envelope of one single-keyslot masterkey blob, or uniform
//! random bytes.
//!
//! No field outside the encrypted plaintext encodes occupancy, count,
//! version, or magic. `is_multikeyslot` — a file-size check — is the only
//! on-disk signal, and it is intentionally ambiguous: any legitimate legacy
//! single-keyslot file happens to be smaller.

use crate::atomic::write_atomic;
use crate::error::VaultError;
use crate::traits::MasterkeyCodec;
use latens_crypto_core::{decrypt, encrypt, kdf::KEYSLOT_PBKDF2_ITERATIONS, pbkdf2_derive, Masterkey, SealedData};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;

/// Number of keyslots per container.
pub const SLOT_COUNT: usize = 4;
/// Size of one slot in bytes.
pub const SLOT_LEN: usize = 4096;
/// Total container size in bytes.
pub const CONTAINER_LEN: usize = SLOT_COUNT * SLOT_LEN;

const SALT_LEN: usize = 32;
const LENGTH_PREFIX_LEN: usize = 4;
/// Authenticated plaintext size: `length_u32_le || masterkey_blob || padding`.
const PLAINTEXT_LEN: usize = SLOT_LEN - SALT_LEN - latens_crypto_core::NONCE_LEN - latens_crypto_core::TAG_LEN;
/// Maximum masterkey blob length that fits the plaintext alongside its prefix.
const MAX_BLOB_LEN: usize = PLAINTEXT_LEN - LENGTH_PREFIX_LEN;

/// Domain-separation tag for the keyslot envelope AEAD. The core has only one
/// envelope type, so this is fixed rather than varying per slot.
const ENVELOPE_AAD: &[u8] = b"latens-keyslot-envelope-v1";

type Slot = [u8; SLOT_LEN];
type Slots = [Slot; SLOT_COUNT];

/// `true` iff `path` exists and its size is exactly [`CONTAINER_LEN`]. No byte
/// inspection — this is the only on-disk occupancy-adjacent signal, and it is
/// a property of the file, not of any slot's contents.
#[must_use]
pub fn is_multikeyslot(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.len() == CONTAINER_LEN as u64)
        .unwrap_or(false)
}

/// Create a fresh [`CONTAINER_LEN`]-byte file: slot 0 wraps `masterkey` under
/// `password`, slots 1-3 are CSPRNG bytes. Atomic create.
///
/// # Errors
///
/// Returns `VaultError` if serialization, encryption, or the atomic write fails.
pub fn persist(
    path: &Path,
    masterkey: &Masterkey,
    password: &[u8],
    work_factor: u8,
    codec: &dyn MasterkeyCodec,
) -> Result<(), VaultError> {
    let blob = codec.serialize(masterkey, password, work_factor)?;
    let slots: Slots = [
        encrypt_slot(password, &blob)?,
        random_slot(),
        random_slot(),
        random_slot(),
    ];
    write_container(path, &slots)
}

/// Recover the masterkey that `password` unlocks.
///
/// If `path` is not [`is_multikeyslot`], the whole file is treated as a
/// legacy single-keyslot blob and handed to `codec` directly. Otherwise each
/// of the four slots is attempted in order; the first that authenticates
/// wins. The winning slot index is never exposed.
///
/// # Errors
///
/// Returns `VaultError::WrongPassphrase` if no slot authenticates.
pub fn load(path: &Path, password: &[u8], codec: &dyn MasterkeyCodec) -> Result<Masterkey, VaultError> {
    if !is_multikeyslot(path) {
        let bytes = std::fs::read(path)?;
        return codec.deserialize(&bytes, password);
    }

    let bytes = std::fs::read(path)?;
    let slots = split_into_slots(&bytes)?;
    for slot in &slots {
        if let Some(blob) = try_decrypt_slot(slot, password)? {
            return codec.deserialize(&blob, password);
        }
    }
    Err(VaultError::WrongPassphrase)
}

/// Add a hidden identity: wrap `new_masterkey` under `new_password` into a
/// slot not already claimed by `primary_password` or by any password in
/// `other_known_passwords`, after verifying `new_password` is not already
/// bound to any slot.
///
/// No field outside a slot's encrypted plaintext encodes occupancy, so the
/// core itself cannot tell "empty" from "occupied under a password it was
/// never given" — the caller is the only one who can know which passwords
/// are already bound to a slot, and must supply all of them here (beyond
/// `primary_password`) for target selection to avoid clobbering them. A
/// password truly unknown to the caller is never a selection hazard either,
/// since nobody asks this container about it.
///
/// If `path` is not yet multi-keyslot, its legacy bytes become slot 0,
/// re-wrapped under `primary_password`; that slot is then naturally
/// excluded from the target search since it matches `primary_password`.
///
/// # Errors
///
/// Returns `VaultError::DuplicatePassword` if `new_password` already wraps a
/// slot, or `VaultError::AllSlotsOccupied` if no slot is available.
pub fn add_keyslot(
    path: &Path,
    new_masterkey: &Masterkey,
    new_password: &[u8],
    primary_password: &[u8],
    other_known_passwords: &[&[u8]],
    work_factor: u8,
    codec: &dyn MasterkeyCodec,
) -> Result<(), VaultError> {
    let mut slots = if is_multikeyslot(path) {
        let bytes = std::fs::read(path)?;
        split_into_slots(&bytes)?
    } else {
        let legacy_bytes = std::fs::read(path)?;
        let slot0 = encrypt_slot(primary_password, &legacy_bytes)?;
        [slot0, random_slot(), random_slot(), random_slot()]
    };

    if slots
        .iter()
        .any(|slot| envelope_matches(slot, new_password))
    {
        return Err(VaultError::DuplicatePassword);
    }

    let known_passwords: Vec<&[u8]> = std::iter::once(primary_password)
        .chain(other_known_passwords.iter().copied())
        .collect();
    let target = (0..SLOT_COUNT)
        .find(|&i| !known_passwords.iter().any(|pw| envelope_matches(&slots[i], pw)));
    let Some(target) = target else {
        return Err(VaultError::AllSlotsOccupied);
    };

    let blob = codec.serialize(new_masterkey, new_password, work_factor)?;
    slots[target] = encrypt_slot(new_password, &blob)?;
    write_container(path, &slots)
}

/// Find the unique slot that authenticates under `password` and overwrite it
/// with fresh CSPRNG bytes. Returns `false` and mutates nothing when no slot
/// matches; this is never treated as "last slot" refusal — that check would
/// require slot counting, which the core forbids.
///
/// # Errors
///
/// Returns `VaultError` if the file cannot be read or the atomic write fails.
pub fn remove_keyslot(path: &Path, password: &[u8]) -> Result<bool, VaultError> {
    if !is_multikeyslot(path) {
        return Ok(false);
    }
    let bytes = std::fs::read(path)?;
    let mut slots = split_into_slots(&bytes)?;

    let Some(target) = slots.iter().position(|slot| envelope_matches(slot, password)) else {
        return Ok(false);
    };
    slots[target] = random_slot();
    write_container(path, &slots)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn envelope_matches(slot: &Slot, password: &[u8]) -> bool {
    matches!(try_decrypt_slot(slot, password), Ok(Some(_)))
}

/// Attempt to authenticate and parse `slot` under `password`.
///
/// `Ok(None)` is the ordinary negative case (wrong password or an empty
/// slot) and must stay silent — no logging, no distinguishing timing beyond
/// the PBKDF2 + AES-GCM cost already paid. `Err(CorruptContainer)` surfaces
/// only when authentication succeeded but the length prefix inside the
/// plaintext is out of range, which cannot happen under honest writes.
fn try_decrypt_slot(slot: &Slot, password: &[u8]) -> Result<Option<Vec<u8>>, VaultError> {
    let salt = &slot[0..SALT_LEN];
    let key = pbkdf2_derive(password, salt, KEYSLOT_PBKDF2_ITERATIONS)?;

    let Ok(sealed) = SealedData::from_bytes(&slot[SALT_LEN..]) else {
        return Ok(None);
    };
    let Ok(plaintext) = decrypt(&sealed, key.expose(), ENVELOPE_AAD) else {
        return Ok(None);
    };

    if plaintext.len() != PLAINTEXT_LEN {
        return Ok(None);
    }
    let raw = plaintext.expose();
    let length = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    if length > MAX_BLOB_LEN {
        return Err(VaultError::CorruptContainer(format!(
            "keyslot plaintext length {length} exceeds maximum {MAX_BLOB_LEN}"
        )));
    }
    let start = LENGTH_PREFIX_LEN;
    let end = start + length;
    Ok(Some(raw[start..end].to_vec()))
}

fn encrypt_slot(password: &[u8], blob: &[u8]) -> Result<Slot, VaultError> {
    if blob.len() > MAX_BLOB_LEN {
        return Err(VaultError::CorruptContainer(format!(
            "masterkey blob length {} exceeds maximum {MAX_BLOB_LEN}",
            blob.len()
        )));
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let key = pbkdf2_derive(password, &salt, KEYSLOT_PBKDF2_ITERATIONS)?;

    let mut plaintext = vec![0u8; PLAINTEXT_LEN];
    OsRng.fill_bytes(&mut plaintext);
    #[allow(clippy::cast_possible_truncation)]
    let length = blob.len() as u32;
    plaintext[0..LENGTH_PREFIX_LEN].copy_from_slice(&length.to_le_bytes());
    plaintext[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + blob.len()].copy_from_slice(blob);

    let sealed = encrypt(&plaintext, key.expose(), ENVELOPE_AAD)?;
    let mut slot = [0u8; SLOT_LEN];
    slot[0..SALT_LEN].copy_from_slice(&salt);
    slot[SALT_LEN..].copy_from_slice(&sealed.to_bytes());
    Ok(slot)
}

fn random_slot() -> Slot {
    let mut slot = [0u8; SLOT_LEN];
    OsRng.fill_bytes(&mut slot);
    slot
}

fn split_into_slots(bytes: &[u8]) -> Result<Slots, VaultError> {
    if bytes.len() != CONTAINER_LEN {
        return Err(VaultError::CorruptContainer(format!(
            "keyslot container is {} bytes (expected {CONTAINER_LEN})",
            bytes.len()
        )));
    }
    let mut slots: Slots = [[0u8; SLOT_LEN]; SLOT_COUNT];
    for (i, slot) in slots.iter_mut().enumerate() {
        slot.copy_from_slice(&bytes[i * SLOT_LEN..(i + 1) * SLOT_LEN]);
    }
    Ok(slots)
}

fn write_container(path: &Path, slots: &Slots) -> Result<(), VaultError> {
    let mut bytes = Vec::with_capacity(CONTAINER_LEN);
    for slot in slots {
        bytes.extend_from_slice(slot);
    }
    write_atomic(path, &bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masterkey_codec::DefaultMasterkeyCodec;

    fn codec() -> DefaultMasterkeyCodec {
        DefaultMasterkeyCodec
    }

    #[test]
    fn persist_produces_exact_container_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let mk = Masterkey::generate().expect("generate");
        persist(&path, &mk, b"hunter2", 4, &codec()).expect("persist");
        let size = std::fs::metadata(&path).expect("metadata").len();
        assert_eq!(size, CONTAINER_LEN as u64);
        assert!(is_multikeyslot(&path));
    }

    #[test]
    fn load_after_persist_recovers_masterkey() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let mk = Masterkey::generate().expect("generate");
        persist(&path, &mk, b"hunter2", 4, &codec()).expect("persist");
        let loaded = load(&path, b"hunter2", &codec()).expect("load");
        assert_eq!(mk.bytes(), loaded.bytes());
    }

    #[test]
    fn load_with_wrong_password_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let mk = Masterkey::generate().expect("generate");
        persist(&path, &mk, b"hunter2", 4, &codec()).expect("persist");
        let result = load(&path, b"incorrect", &codec());
        assert!(matches!(result, Err(VaultError::WrongPassphrase)));
    }

    #[test]
    fn hidden_identity_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let mk1 = Masterkey::generate().expect("generate");
        let mk2 = Masterkey::generate().expect("generate");
        persist(&path, &mk1, b"hunter2", 4, &codec()).expect("persist");
        add_keyslot(&path, &mk2, b"deniable", b"hunter2", &[], 4, &codec()).expect("add");

        let loaded1 = load(&path, b"hunter2", &codec()).expect("load primary");
        assert_eq!(loaded1.bytes(), mk1.bytes());
        let loaded2 = load(&path, b"deniable", &codec()).expect("load secondary");
        assert_eq!(loaded2.bytes(), mk2.bytes());
        assert!(matches!(
            load(&path, b"neither", &codec()),
            Err(VaultError::WrongPassphrase)
        ));
        assert_eq!(
            std::fs::metadata(&path).expect("metadata").len(),
            CONTAINER_LEN as u64
        );
    }

    #[test]
    fn duplicate_password_is_refused_and_file_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let mk1 = Masterkey::generate().expect("generate");
        let mk2 = Masterkey::generate().expect("generate");
        persist(&path, &mk1, b"hunter2", 4, &codec()).expect("persist");
        add_keyslot(&path, &mk2, b"deniable", b"hunter2", &[], 4, &codec()).expect("add");

        let before = std::fs::read(&path).expect("read");
        let mk3 = Masterkey::generate().expect("generate");
        let result = add_keyslot(&path, &mk3, b"hunter2", b"hunter2", &[], 4, &codec());
        assert!(matches!(result, Err(VaultError::DuplicatePassword)));
        let after = std::fs::read(&path).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn removal_then_readd() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let mk1 = Masterkey::generate().expect("generate");
        let mk2 = Masterkey::generate().expect("generate");
        persist(&path, &mk1, b"hunter2", 4, &codec()).expect("persist");
        add_keyslot(&path, &mk2, b"deniable", b"hunter2", &[], 4, &codec()).expect("add");

        assert!(remove_keyslot(&path, b"deniable").expect("remove"));
        assert!(matches!(
            load(&path, b"deniable", &codec()),
            Err(VaultError::WrongPassphrase)
        ));
        assert_eq!(load(&path, b"hunter2", &codec()).expect("load").bytes(), mk1.bytes());

        let mk4 = Masterkey::generate().expect("generate");
        add_keyslot(&path, &mk4, b"other", b"hunter2", &[], 4, &codec()).expect("re-add");
        assert_eq!(load(&path, b"other", &codec()).expect("load").bytes(), mk4.bytes());
    }

    #[test]
    fn remove_keyslot_with_no_match_returns_false_and_does_not_mutate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let mk = Masterkey::generate().expect("generate");
        persist(&path, &mk, b"hunter2", 4, &codec()).expect("persist");
        let before = std::fs::read(&path).expect("read");
        assert!(!remove_keyslot(&path, b"wrong").expect("remove"));
        let after = std::fs::read(&path).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn four_slots_occupied_refuses_fifth_distinct_password() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let primary = Masterkey::generate().expect("generate");
        persist(&path, &primary, b"p0", 4, &codec()).expect("persist");
        let mut known_secondaries: Vec<&[u8]> = Vec::new();
        for pw in ["p1", "p2", "p3"] {
            let mk = Masterkey::generate().expect("generate");
            add_keyslot(&path, &mk, pw.as_bytes(), b"p0", &known_secondaries, 4, &codec())
                .expect("add");
            known_secondaries.push(pw.as_bytes());
        }
        let mk5 = Masterkey::generate().expect("generate");
        let result = add_keyslot(&path, &mk5, b"p4", b"p0", &known_secondaries, 4, &codec());
        assert!(matches!(result, Err(VaultError::AllSlotsOccupied)));
    }

    #[test]
    fn load_on_truncated_file_does_not_panic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        std::fs::write(&path, [0u8; 10]).expect("write");
        let result = load(&path, b"anything", &codec());
        assert!(result.is_err());
    }

    #[test]
    fn legacy_upgrade_reserves_slot_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("masterkey.vault");
        let primary = Masterkey::generate().expect("generate");
        let legacy_blob = codec()
            .serialize(&primary, b"hunter2", 4)
            .expect("serialize legacy blob");
        std::fs::write(&path, &legacy_blob).expect("write legacy file");
        assert!(!is_multikeyslot(&path));

        let secondary = Masterkey::generate().expect("generate");
        add_keyslot(&path, &secondary, b"deniable", b"hunter2", &[], 4, &codec()).expect("upgrade+add");
        assert!(is_multikeyslot(&path));

        assert_eq!(load(&path, b"hunter2", &codec()).expect("load").bytes(), primary.bytes());
        assert_eq!(
            load(&path, b"deniable", &codec()).expect("load").bytes(),
            secondary.bytes()
        );
    }
}
