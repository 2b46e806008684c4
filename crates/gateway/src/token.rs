use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::PaymentError;

/// Refresh this many seconds before the gateway-reported expiry so a
/// token is never used at the edge of its lifetime.
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expiry: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Utc::now() < self.expiry
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    // the live gateway serialises this as a JSON string
    #[serde(default, deserialize_with = "crate::wire::opt_string_or_number")]
    expires_in: Option<String>,
}

impl TokenResponse {
    fn expires_in_secs(&self) -> Option<i64> {
        self.expires_in.as_deref()?.parse().ok()
    }
}

/// Owned OAuth token cache for the gateway. A fresh cached token is
/// returned without touching the network; refresh happens behind a write
/// lock so concurrent flows cannot race the credential exchange.
pub struct TokenCache {
    http: reqwest::Client,
    token_url: String,
    consumer_key: String,
    consumer_secret: String,
    cached: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(
        http: reqwest::Client,
        token_url: String,
        consumer_key: String,
        consumer_secret: String,
    ) -> Self {
        Self {
            http,
            token_url,
            consumer_key,
            consumer_secret,
            cached: RwLock::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<String, PaymentError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.cached.write().await;
        // another flow may have refreshed while we waited for the lock
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<AccessToken, PaymentError> {
        let response = self
            .http
            .get(&self.token_url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await
            .map_err(|e| PaymentError::TokenAcquisition(format!("transport: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::TokenAcquisition(format!(
                "{status} - {body}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::TokenAcquisition(format!("malformed body: {e}")))?;

        let expires_in = body.expires_in_secs().unwrap_or(3600);
        tracing::info!("gateway access token obtained");

        Ok(AccessToken {
            value: body.access_token,
            expiry: Utc::now() + chrono::Duration::seconds(expires_in - EXPIRY_SAFETY_MARGIN_SECS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Port 9 is the discard service; nothing listens there in CI, so any
    // attempt to refresh fails fast with a connect error.
    fn unreachable_cache() -> TokenCache {
        TokenCache::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/oauth/v1/generate?grant_type=client_credentials".to_string(),
            "consumer-key".to_string(),
            "consumer-secret".to_string(),
        )
    }

    #[tokio::test]
    async fn fresh_cached_token_needs_no_network_call() {
        let cache = unreachable_cache();
        *cache.cached.write().await = Some(AccessToken {
            value: "cached-token".to_string(),
            expiry: Utc::now() + chrono::Duration::seconds(600),
        });

        // both calls hit the cache; the endpoint is unreachable, so a
        // network attempt would error instead
        assert_eq!(cache.get_token().await.unwrap(), "cached-token");
        assert_eq!(cache.get_token().await.unwrap(), "cached-token");
    }

    #[tokio::test]
    async fn expired_token_triggers_a_refresh() {
        let cache = unreachable_cache();
        *cache.cached.write().await = Some(AccessToken {
            value: "stale-token".to_string(),
            expiry: Utc::now() - chrono::Duration::seconds(1),
        });

        let err = cache.get_token().await.unwrap_err();
        assert!(matches!(err, PaymentError::TokenAcquisition(_)));
    }

    #[test]
    fn expires_in_accepts_string_or_number() {
        let as_string: TokenResponse =
            serde_json::from_str(r#"{"access_token":"t","expires_in":"3599"}"#).unwrap();
        assert_eq!(as_string.expires_in_secs(), Some(3599));

        let as_number: TokenResponse =
            serde_json::from_str(r#"{"access_token":"t","expires_in":3599}"#).unwrap();
        assert_eq!(as_number.expires_in_secs(), Some(3599));

        let missing: TokenResponse = serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert_eq!(missing.expires_in_secs(), None);
    }
}
