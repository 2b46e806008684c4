use async_trait::async_trait;
use booth_core::models::CheckoutHandle;
use serde::Deserialize;

pub mod daraja;
mod error;
pub mod mock;
pub mod poll;
pub mod token;
mod wire;

pub use daraja::{DarajaClient, DarajaConfig};
pub use error::PaymentError;
pub use poll::{wait_for_outcome, PollConfig};

/// One answer to a status query. An absent result code means the push is
/// still pending on the payer's handset.
#[derive(Debug, Clone, Deserialize)]
pub struct StkQueryStatus {
    #[serde(
        rename = "ResultCode",
        default,
        deserialize_with = "wire::opt_string_or_number"
    )]
    pub result_code: Option<String>,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
}

impl StkQueryStatus {
    pub fn pending() -> Self {
        Self {
            result_code: None,
            result_desc: None,
        }
    }

    pub fn resolved(code: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            result_code: Some(code.into()),
            result_desc: Some(desc.into()),
        }
    }
}

/// Seam between the payment flow and the gateway. The Daraja client is
/// the real implementation; `mock::MockGateway` stands in for demos and
/// tests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Validate the payer number and submit a push payment request for
    /// `amount` whole shillings. Returns the handle used to poll the
    /// outcome.
    async fn initiate(&self, phone: &str, amount: u64) -> Result<CheckoutHandle, PaymentError>;

    /// One status query for a previously initiated push.
    async fn query(&self, checkout_id: &str) -> Result<StkQueryStatus, PaymentError>;
}
