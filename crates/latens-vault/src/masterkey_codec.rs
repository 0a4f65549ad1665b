//! The default [`MasterkeyCodec`] implementation, backed by
//! [`Masterkey`]'s own single-keyslot blob serialization.

use crate::error::VaultError;
use crate::traits::MasterkeyCodec;
use latens_crypto_core::Masterkey;

/// Delegates directly to [`Masterkey::serialize_single_keyslot`] and
/// [`Masterkey::deserialize_single_keyslot`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMasterkeyCodec;

impl MasterkeyCodec for DefaultMasterkeyCodec {
    fn serialize(
        &self,
        mk: &Masterkey,
        password: &[u8],
        work_factor: u8,
    ) -> Result<Vec<u8>, VaultError> {
        Ok(mk.serialize_single_keyslot(password, work_factor)?)
    }

    fn deserialize(&self, bytes: &[u8], password: &[u8]) -> Result<Masterkey, VaultError> {
        Masterkey::deserialize_single_keyslot(bytes, password).map_err(|e| match e {
            latens_crypto_core::CryptoError::WrongPassphrase => VaultError::WrongPassphrase,
            other => VaultError::Crypto(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_trait_object() {
        let codec: &dyn MasterkeyCodec = &DefaultMasterkeyCodec;
        let mk = Masterkey::generate().expect("generate");
        let blob = codec.serialize(&mk, b"hunter2", 4).expect("serialize");
        let loaded = codec.deserialize(&blob, b"hunter2").expect("deserialize");
        assert_eq!(mk.bytes(), loaded.bytes());
    }

    #[test]
    fn wrong_password_maps_to_wrong_passphrase() {
        let codec: &dyn MasterkeyCodec = &DefaultMasterkeyCodec;
        let mk = Masterkey::generate().expect("generate");
        let blob = codec.serialize(&mk, b"hunter2", 4).expect("serialize");
        let result = codec.deserialize(&blob, b"wrong");
        assert!(matches!(result, Err(VaultError::WrongPassphrase)));
    }
}
