//! HMAC-SHA256 payload signatures.

use crate::error::codec::CodecError;

use common::{ErrorLocation, RedactedSecret};

use std::panic::Location;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signature of `payload` under `key`.
pub fn sign(payload: &[u8], key: &RedactedSecret) -> Result<Vec<u8>, CodecError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| CodecError::Signing {
        message: format!("Failed to initialise HMAC: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time check of `signature` against `payload` under `key`.
pub fn verify(payload: &[u8], key: &RedactedSecret, signature: &[u8]) -> bool {
    match HmacSha256::new_from_slice(key.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload);
            mac.verify_slice(signature).is_ok()
        }
        Err(_) => false,
    }
}
