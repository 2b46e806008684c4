use base64::{prelude::BASE64_STANDARD, Engine};
use chrono::Local;

/// Timestamp layout the gateway signs against, merchant-local time.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A password/timestamp pair for one request. The gateway rejects stale
/// timestamps, so this is derived fresh for the push and again for every
/// status query — never cached.
#[derive(Debug, Clone)]
pub struct SigningMaterial {
    pub password: String,
    pub timestamp: String,
}

pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// base64(shortcode ∥ passkey ∥ timestamp). Deterministic for a fixed
/// triple.
pub fn derive(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64_STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

pub fn derive_now(shortcode: &str, passkey: &str) -> SigningMaterial {
    let timestamp = timestamp_now();
    let password = derive(shortcode, passkey, &timestamp);
    SigningMaterial {
        password,
        timestamp,
    }
}
