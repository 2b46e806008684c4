use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const APP_NAME: &str = "booth360";
const KEYCHAIN_SERVICE: &str = "booth360.mpesa.credentials";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BoothConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub booth: BoothSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_kind")]
    pub kind: String, // "mock" | "daraja"
    pub base_url: Option<String>,
    #[serde(default = "default_shortcode")]
    pub shortcode: String,
    pub callback_url: Option<String>,
    #[serde(default = "default_account_reference")]
    pub account_reference: String,
    #[serde(default = "default_transaction_desc")]
    pub transaction_desc: String,
    /// Result code the gateway sends when the payer dismisses the
    /// prompt. Unverified against production, hence config not constant.
    #[serde(default = "default_cancelled_code")]
    pub cancelled_result_code: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: default_gateway_kind(),
            base_url: None,
            shortcode: default_shortcode(),
            callback_url: None,
            account_reference: default_account_reference(),
            transaction_desc: default_transaction_desc(),
            cancelled_result_code: default_cancelled_code(),
            poll_timeout_secs: default_poll_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoothSettings {
    /// Price of one booth session in whole shillings; rounded before it
    /// is handed to the gateway.
    #[serde(default = "default_price")]
    pub price: f64,
    #[serde(default = "default_record_time_secs")]
    pub record_time_secs: u64,
    #[serde(default)]
    pub admin_email: Option<String>,
    /// SHA-256 hex digest, never the clear text.
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl Default for BoothSettings {
    fn default() -> Self {
        Self {
            price: default_price(),
            record_time_secs: default_record_time_secs(),
            admin_email: None,
            password_hash: None,
        }
    }
}

fn default_gateway_kind() -> String {
    "mock".to_string()
}

// the public Daraja sandbox shortcode
fn default_shortcode() -> String {
    "174379".to_string()
}

fn default_account_reference() -> String {
    "Booth360".to_string()
}

fn default_transaction_desc() -> String {
    "360 Booth Session".to_string()
}

fn default_cancelled_code() -> String {
    "1032".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    90
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_price() -> f64 {
    50.0
}

fn default_record_time_secs() -> u64 {
    20
}

pub fn load() -> Result<BoothConfig> {
    let cfg: BoothConfig = confy::load(APP_NAME, None).context("Failed to load booth config")?;
    Ok(cfg)
}

pub fn store(cfg: &BoothConfig) -> Result<()> {
    confy::store(APP_NAME, None, cfg).context("Failed to store booth config")?;
    Ok(())
}

/// Look a secret up in the environment first, then the OS keychain.
/// Merchant credentials never live in the config file.
pub fn secret(env_var: &str, keychain_key: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            return Ok(value);
        }
    }
    get_secret(keychain_key)
}

/// Store a secret in the OS keychain
pub fn store_secret(key: &str, value: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.set_password(value)?;
    Ok(())
}

/// Retrieve a secret from the OS keychain
pub fn get_secret(key: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    let password = entry.get_password()?;
    Ok(password)
}

/// Delete a secret from the OS keychain
pub fn delete_secret(key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.delete_password()?;
    Ok(())
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(cfg: &BoothConfig, password: &str) -> bool {
    match &cfg.booth.password_hash {
        Some(stored) => *stored == hash_password(password),
        None => false,
    }
}

pub fn set_password(cfg: &mut BoothConfig, password: &str) {
    cfg.booth.password_hash = Some(hash_password(password));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_kiosk_expectations() {
        let cfg = BoothConfig::default();
        assert_eq!(cfg.gateway.kind, "mock");
        assert_eq!(cfg.gateway.shortcode, "174379");
        assert_eq!(cfg.gateway.cancelled_result_code, "1032");
        assert_eq!(cfg.gateway.poll_timeout_secs, 90);
        assert_eq!(cfg.gateway.poll_interval_secs, 3);
        assert_eq!(cfg.booth.price, 50.0);
        assert_eq!(cfg.booth.record_time_secs, 20);
        assert_eq!(cfg.booth.password_hash, None);
    }

    #[test]
    fn password_hash_round_trip() {
        let mut cfg = BoothConfig::default();
        assert!(!verify_password(&cfg, "anything"));

        set_password(&mut cfg, "booth-admin");
        assert!(verify_password(&cfg, "booth-admin"));
        assert!(!verify_password(&cfg, "wrong"));

        // the stored value is a hex digest, not the clear text
        let stored = cfg.booth.password_hash.as_deref().unwrap();
        assert_eq!(stored.len(), 64);
        assert_ne!(stored, "booth-admin");
    }
}
