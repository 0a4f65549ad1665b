//! Vault Configuration Container (CFGC): a fixed 32 KiB file of four 8 KiB
//! slots, each a length-prefixed signed configuration token padded with
//! random bytes, or uniform random bytes.
//!
//! The length prefix sits in plaintext (a signed token cannot be forged
//! without the masterkey regardless) but is sanity-ranged on read so that
//! the overwhelming majority of empty slots are rejected before a signature
//! check is even attempted.

use crate::atomic::write_atomic;
use crate::error::VaultError;
use crate::traits::{ConfigCodec, UnverifiedConfig, VerifiedConfig};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;

/// Number of config slots per container.
pub const SLOT_COUNT: usize = 4;
/// Size of one slot in bytes.
pub const SLOT_LEN: usize = 8192;
/// Total container size in bytes.
pub const CONTAINER_LEN: usize = SLOT_COUNT * SLOT_LEN;

const LENGTH_PREFIX_LEN: usize = 4;
const MIN_TOKEN_LEN: usize = 100;
const MAX_TOKEN_LEN: usize = SLOT_LEN - LENGTH_PREFIX_LEN;

type Slot = [u8; SLOT_LEN];
type Slots = [Slot; SLOT_COUNT];

/// `true` iff `path` exists and its size is exactly [`CONTAINER_LEN`].
#[must_use]
pub fn is_multikeyslot(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.len() == CONTAINER_LEN as u64)
        .unwrap_or(false)
}

/// Recover the configuration token bound to `masterkey_bytes`.
///
/// If `path` is not [`is_multikeyslot`], the whole file is treated as a
/// legacy plaintext token. Otherwise every slot whose length prefix survives
/// the sanity range is attempted; the first that both decodes and
/// signature-verifies under `masterkey_bytes` wins.
///
/// # Errors
///
/// Returns `VaultError::NoMatchingConfig` if no slot verifies.
pub fn load(
    path: &Path,
    masterkey_bytes: &[u8],
    codec: &dyn ConfigCodec,
) -> Result<VerifiedConfig, VaultError> {
    load_with_token(path, masterkey_bytes, codec).map(|(_, verified)| verified)
}

/// Like [`load`], but also returns the raw token text of the winning slot.
///
/// Unlock dispatch needs the original token bytes (not just the decoded
/// payload) to stage them into the unlock dotfile for the external
/// filesystem provider; ordinary callers want [`load`].
///
/// # Errors
///
/// Returns `VaultError::NoMatchingConfig` if no slot verifies.
pub fn load_with_token(
    path: &Path,
    masterkey_bytes: &[u8],
    codec: &dyn ConfigCodec,
) -> Result<(String, VerifiedConfig), VaultError> {
    if !is_multikeyslot(path) {
        let token = read_legacy_token(path)?;
        let unverified = codec.decode(&token)?;
        let version = unverified.alleged_version();
        let verified = unverified.verify(masterkey_bytes, version)?;
        return Ok((token, verified));
    }

    let bytes = std::fs::read(path)?;
    let slots = split_into_slots(&bytes)?;
    for slot in &slots {
        let Some(token) = extract_token(slot) else {
            continue;
        };
        let Ok(unverified) = codec.decode(&token) else {
            continue;
        };
        let version = unverified.alleged_version();
        if let Ok(verified) = unverified.verify(masterkey_bytes, version) {
            return Ok((token, verified));
        }
    }
    Err(VaultError::NoMatchingConfig)
}

/// Create a fresh [`CONTAINER_LEN`]-byte file: slot 0 holds `token`, slots
/// 1-3 are CSPRNG bytes.
///
/// # Errors
///
/// Returns `VaultError` if `token` is too large or the atomic write fails.
pub fn persist(path: &Path, token: &str) -> Result<(), VaultError> {
    let slots: Slots = [
        encode_slot(token)?,
        random_slot(),
        random_slot(),
        random_slot(),
    ];
    write_container(path, &slots)
}

/// Add `new_token` to the first empty slot.
///
/// If `path` is not yet multi-keyslot, its legacy token becomes slot 0 and
/// slots 1-3 start empty.
///
/// # Errors
///
/// Returns `VaultError::NoAvailableSlot` if every slot already holds a token.
pub fn add_config_slot(path: &Path, new_token: &str) -> Result<(), VaultError> {
    let mut slots = if is_multikeyslot(path) {
        let bytes = std::fs::read(path)?;
        split_into_slots(&bytes)?
    } else {
        let legacy_token = read_legacy_token(path)?;
        [encode_slot(&legacy_token)?, random_slot(), random_slot(), random_slot()]
    };

    let target = (0..SLOT_COUNT).find(|&i| extract_token(&slots[i]).is_none());
    let Some(target) = target else {
        return Err(VaultError::NoAvailableSlot);
    };
    slots[target] = encode_slot(new_token)?;
    write_container(path, &slots)
}

/// Find the unique slot that verifies under `masterkey_bytes` and render it
/// as fresh CSPRNG bytes.
///
/// Since the core never holds every other slot's masterkey, the decision
/// between "preserve multi-keyslot form" and "downgrade to a legacy plaintext
/// token" is made on the length-sanity heuristic alone (a slot whose prefix
/// survives the sanity range counts as occupied), not on full re-verification
/// of the remaining slots.
///
/// # Errors
///
/// Returns `VaultError` if the file cannot be read or the write fails.
pub fn remove_config_slot(
    path: &Path,
    masterkey_bytes: &[u8],
    codec: &dyn ConfigCodec,
) -> Result<bool, VaultError> {
    if !is_multikeyslot(path) {
        return Ok(false);
    }
    let bytes = std::fs::read(path)?;
    let mut slots = split_into_slots(&bytes)?;

    let mut target = None;
    for (i, slot) in slots.iter().enumerate() {
        let Some(token) = extract_token(slot) else {
            continue;
        };
        let Ok(unverified) = codec.decode(&token) else {
            continue;
        };
        let version = unverified.alleged_version();
        if unverified.verify(masterkey_bytes, version).is_ok() {
            target = Some(i);
            break;
        }
    }
    let Some(target) = target else {
        return Ok(false);
    };
    slots[target] = random_slot();

    let remaining: Vec<usize> = (0..SLOT_COUNT)
        .filter(|&i| extract_token(&slots[i]).is_some())
        .collect();

    if remaining.len() == 1 {
        let survivor = extract_token(&slots[remaining[0]]).expect("just confirmed occupied");
        write_atomic(path, survivor.as_bytes())?;
    } else {
        write_container(path, &slots)?;
    }
    Ok(true)
}

/// Decode the lowest-index slot that survives the length sanity check,
/// without any signature verification. Exposes only the primary-view token;
/// callers that need an authenticated read must use [`load`].
///
/// # Errors
///
/// Returns `VaultError::NoMatchingConfig` if no slot's length prefix is sane.
pub fn load_first_slot_unverified(
    path: &Path,
    codec: &dyn ConfigCodec,
) -> Result<UnverifiedConfig, VaultError> {
    if !is_multikeyslot(path) {
        let token = read_legacy_token(path)?;
        return codec.decode(&token);
    }

    let bytes = std::fs::read(path)?;
    let slots = split_into_slots(&bytes)?;
    for slot in &slots {
        if let Some(token) = extract_token(slot) {
            if let Ok(unverified) = codec.decode(&token) {
                return Ok(unverified);
            }
        }
    }
    Err(VaultError::NoMatchingConfig)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn read_legacy_token(path: &Path) -> Result<String, VaultError> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| VaultError::NoMatchingConfig)
}

/// Apply the self-referential length sanity rule and, if it passes, decode
/// the token bytes as UTF-8. Every empty slot's random first four bytes fail
/// this with overwhelming probability.
fn extract_token(slot: &Slot) -> Option<String> {
    let length = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) as usize;
    if !(MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&length) {
        return None;
    }
    let bytes = &slot[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + length];
    String::from_utf8(bytes.to_vec()).ok()
}

fn encode_slot(token: &str) -> Result<Slot, VaultError> {
    let token_bytes = token.as_bytes();
    if token_bytes.len() > MAX_TOKEN_LEN {
        return Err(VaultError::CorruptContainer(format!(
            "config token length {} exceeds maximum {MAX_TOKEN_LEN}",
            token_bytes.len()
        )));
    }
    let mut slot = [0u8; SLOT_LEN];
    OsRng.fill_bytes(&mut slot);
    #[allow(clippy::cast_possible_truncation)]
    let length = token_bytes.len() as u32;
    slot[0..LENGTH_PREFIX_LEN].copy_from_slice(&length.to_le_bytes());
    slot[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + token_bytes.len()].copy_from_slice(token_bytes);
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
            "config container is {} bytes (expected {CONTAINER_LEN})",
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
