//! HMAC-SHA256 webhook signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::GatewayError;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str) -> Result<HmacSha256, GatewayError> {
    if secret.is_empty() {
        return Err(GatewayError::MissingSecret);
    }
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| GatewayError::MissingSecret)
}

/// Signs `message` and returns the lowercase hex digest.
pub fn sign(secret: &str, message: &str) -> Result<String, GatewayError> {
    let mut mac = mac_for(secret)?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex signature of `message` in constant time.
pub fn verify(secret: &str, message: &str, signature_hex: &str) -> Result<(), GatewayError> {
    let expected = hex::decode(signature_hex).map_err(|_| GatewayError::InvalidSignature)?;
    let mut mac = mac_for(secret)?;
    mac.update(message.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| GatewayError::InvalidSignature)
}
