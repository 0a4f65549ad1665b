//! The default [`ConfigCodec`] implementation: a compact, JWS-flavored,
//! HMAC-SHA256-signed configuration token.
//!
//! Wire format: `base64url(header) . base64url(payload) . base64url(hmac)`,
//! where `header` and `payload` are small JSON objects and `hmac` is
//! HMAC-SHA256 over the ASCII bytes of `base64url(header) . base64url(payload)`
//! keyed by the masterkey. `alleged_version()` reads the version out of the
//! payload before the signature is ever checked; callers must not act on it
//! until `verify` has confirmed the MAC, since the MAC is what makes the
//! version (and every other payload field) trustworthy.

use crate::error::VaultError;
use crate::traits::{ConfigCodec, UnverifiedConfig};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize)]
struct Header {
    alg: &'static str,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    v: u32,
    d: String,
}

/// HMAC-SHA256-signed compact token codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConfigCodec;

impl DefaultConfigCodec {
    /// Encode `data` at format `version`, signed under `masterkey_bytes`.
    #[must_use]
    pub fn encode(&self, data: &str, version: u32, masterkey_bytes: &[u8]) -> String {
        let header = BASE64URL_NOPAD.encode(
            serde_json::to_vec(&Header { alg: "HS256" })
                .expect("header serialization is infallible")
                .as_slice(),
        );
        let payload = BASE64URL_NOPAD.encode(
            serde_json::to_vec(&Payload {
                v: version,
                d: data.to_string(),
            })
            .expect("payload serialization is infallible")
            .as_slice(),
        );
        let signed_part = format!("{header}.{payload}");
        let signature = sign(signed_part.as_bytes(), masterkey_bytes);
        format!("{signed_part}.{}", BASE64URL_NOPAD.encode(&signature))
    }
}

impl ConfigCodec for DefaultConfigCodec {
    fn decode(&self, token: &str) -> Result<UnverifiedConfig, VaultError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::NoMatchingConfig);
        };

        let payload_bytes = BASE64URL_NOPAD
            .decode(payload_b64.as_bytes())
            .map_err(|_| VaultError::NoMatchingConfig)?;
        let payload: Payload =
            serde_json::from_slice(&payload_bytes).map_err(|_| VaultError::NoMatchingConfig)?;
        let signature = BASE64URL_NOPAD
            .decode(sig_b64.as_bytes())
            .map_err(|_| VaultError::NoMatchingConfig)?;

        Ok(UnverifiedConfig {
            token: token.to_string(),
            version: payload.v,
            data: payload.d,
            signature,
            signed_part: format!("{header_b64}.{payload_b64}"),
        })
    }
}

fn sign(signed_part: &[u8], masterkey_bytes: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(masterkey_bytes).expect("HMAC accepts keys of any length");
    mac.update(signed_part);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn verify_signature(
    signed_part: &[u8],
    signature: &[u8],
    masterkey_bytes: &[u8],
) -> Result<(), VaultError> {
    let mut mac =
        HmacSha256::new_from_slice(masterkey_bytes).expect("HMAC accepts keys of any length");
    mac.update(signed_part);
    mac.verify_slice(signature)
        .map_err(|_| VaultError::NoMatchingConfig)
}
