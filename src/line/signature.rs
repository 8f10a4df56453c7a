use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Carries base64(HMAC-SHA256(channel secret, raw body)) on every delivery.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(channel_secret: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    mac
}

/// Base64 encoded signature for a body, as LINE would send it.
#[cfg(test)]
pub fn sign_body(channel_secret: &str, body: &[u8]) -> String {
    general_purpose::STANDARD.encode(mac_for(channel_secret, body).finalize().into_bytes())
}

/// Constant-time check of a received signature against the body.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    mac_for(channel_secret, body).verify_slice(&expected).is_ok()
}
