use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use booth_core::models::CheckoutHandle;
use booth_core::{password, phone};
use serde::{Deserialize, Serialize};

use crate::token::TokenCache;
use crate::{PaymentError, PaymentGateway, StkQueryStatus};

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";

#[derive(Debug, Clone)]
pub struct DarajaConfig {
    /// Scheme + host, no trailing slash.
    pub base_url: String,
    pub shortcode: String,
    pub passkey: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
    /// Per-request cap so a hung connection cannot wedge the kiosk.
    pub request_timeout: Duration,
}

/// M-Pesa Daraja client: OAuth credential exchange, STK push, and STK
/// status query, sharing one HTTP client and one owned token cache.
pub struct DarajaClient {
    cfg: DarajaConfig,
    http: reqwest::Client,
    tokens: TokenCache,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushRequest<'a> {
    business_short_code: &'a str,
    password: &'a str,
    timestamp: &'a str,
    transaction_type: &'a str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(
        rename = "ResponseCode",
        default,
        deserialize_with = "crate::wire::opt_string_or_number"
    )]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    // error bodies use a different envelope
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

impl StkPushResponse {
    fn rejection_reason(self) -> String {
        self.response_description
            .or(self.error_message)
            .unwrap_or_else(|| "gateway returned no description".to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryRequest<'a> {
    business_short_code: &'a str,
    password: &'a str,
    timestamp: &'a str,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

impl DarajaClient {
    pub fn new(cfg: DarajaConfig) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        let tokens = TokenCache::new(
            http.clone(),
            format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                cfg.base_url
            ),
            cfg.consumer_key.clone(),
            cfg.consumer_secret.clone(),
        );

        Arc::new(Self { cfg, http, tokens })
    }

    fn push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.cfg.base_url)
    }

    fn query_url(&self) -> String {
        format!("{}/mpesa/stkpushquery/v1/query", self.cfg.base_url)
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn initiate(&self, phone: &str, amount: u64) -> Result<CheckoutHandle, PaymentError> {
        let phone = phone::normalize(phone)?;
        if amount == 0 {
            return Err(PaymentError::InvalidAmount(amount));
        }

        let token = self.tokens.get_token().await?;
        let signing = password::derive_now(&self.cfg.shortcode, &self.cfg.passkey);

        let payload = StkPushRequest {
            business_short_code: &self.cfg.shortcode,
            password: &signing.password,
            timestamp: &signing.timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: &phone,
            party_b: &self.cfg.shortcode,
            phone_number: &phone,
            call_back_url: &self.cfg.callback_url,
            account_reference: &self.cfg.account_reference,
            transaction_desc: &self.cfg.transaction_desc,
        };

        let response = self
            .http
            .post(self.push_url())
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: StkPushResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::MalformedResponse(format!("push response ({status}): {e}")))?;

        if body.response_code.as_deref() == Some("0") {
            if let Some(checkout_id) = body.checkout_request_id {
                tracing::info!(%checkout_id, phone = %phone, amount, "payment push accepted");
                return Ok(CheckoutHandle::new(checkout_id));
            }
            return Err(PaymentError::MalformedResponse(
                "push accepted but no CheckoutRequestID in response".to_string(),
            ));
        }

        Err(PaymentError::PushRejected(body.rejection_reason()))
    }

    async fn query(&self, checkout_id: &str) -> Result<StkQueryStatus, PaymentError> {
        let token = self.tokens.get_token().await?;
        // a query needs fresh signing material too; the pair used for the
        // initiation must not be reused
        let signing = password::derive_now(&self.cfg.shortcode, &self.cfg.passkey);

        let payload = StkQueryRequest {
            business_short_code: &self.cfg.shortcode,
            password: &signing.password,
            timestamp: &signing.timestamp,
            checkout_request_id: checkout_id,
        };

        let response = self
            .http
            .post(self.query_url())
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        // While the payer still has the prompt open the sandbox answers
        // with 5xx bodies carrying no ResultCode; those parse into a
        // pending status instead of failing the poll.
        let parsed: StkQueryStatus = response.json().await.map_err(|e| {
            PaymentError::MalformedResponse(format!("query response ({status}): {e}"))
        })?;

        tracing::debug!(
            checkout_id,
            result_code = parsed.result_code.as_deref().unwrap_or(""),
            "status query answered"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_payload_uses_the_gateway_field_names() {
        let payload = StkPushRequest {
            business_short_code: "174379",
            password: "cGFzcw==",
            timestamp: "20240101120000",
            transaction_type: "CustomerPayBillOnline",
            amount: 50,
            party_a: "254712345678",
            party_b: "174379",
            phone_number: "254712345678",
            call_back_url: "https://example.com/callback",
            account_reference: "Booth360",
            transaction_desc: "360 Booth Session",
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["BusinessShortCode"], "174379");
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
        assert_eq!(value["Amount"], 50);
        assert_eq!(value["PartyA"], "254712345678");
        assert_eq!(value["CallBackURL"], "https://example.com/callback");
        assert_eq!(value["TransactionDesc"], "360 Booth Session");
    }

    #[test]
    fn query_payload_uses_the_gateway_field_names() {
        let payload = StkQueryRequest {
            business_short_code: "174379",
            password: "cGFzcw==",
            timestamp: "20240101120000",
            checkout_request_id: "ws_CO_191220191020363925",
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["BusinessShortCode"], "174379");
        assert_eq!(value["CheckoutRequestID"], "ws_CO_191220191020363925");
    }

    #[test]
    fn accepted_push_response_parses() {
        let body: StkPushResponse = serde_json::from_str(
            r#"{
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            }"#,
        )
        .unwrap();

        assert_eq!(body.response_code.as_deref(), Some("0"));
        assert_eq!(
            body.checkout_request_id.as_deref(),
            Some("ws_CO_191220191020363925")
        );
    }

    #[test]
    fn numeric_response_code_is_normalized_to_a_string() {
        let body: StkPushResponse =
            serde_json::from_str(r#"{"ResponseCode":0,"CheckoutRequestID":"ws_1"}"#).unwrap();
        assert_eq!(body.response_code.as_deref(), Some("0"));
    }

    #[test]
    fn error_envelope_yields_the_gateway_description() {
        let body: StkPushResponse = serde_json::from_str(
            r#"{
                "requestId": "4788-61684722-1",
                "errorCode": "400.002.02",
                "errorMessage": "Bad Request - Invalid PhoneNumber"
            }"#,
        )
        .unwrap();

        assert_eq!(body.response_code, None);
        assert_eq!(
            body.rejection_reason(),
            "Bad Request - Invalid PhoneNumber"
        );
    }

    #[test]
    fn query_status_parses_pending_error_envelope_as_pending() {
        // the sandbox answers early queries with this 500 body
        let status: StkQueryStatus = serde_json::from_str(
            r#"{
                "requestId": "ws_CO_x",
                "errorCode": "500.001.1001",
                "errorMessage": "The transaction is being processed"
            }"#,
        )
        .unwrap();
        assert_eq!(status.result_code, None);
    }
}
