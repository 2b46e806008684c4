use booth_core::phone::InvalidPhoneNumber;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    InvalidPhone(#[from] InvalidPhoneNumber),
    #[error("amount must be a positive number of whole shillings, got {0}")]
    InvalidAmount(u64),
    #[error("failed to obtain access token: {0}")]
    TokenAcquisition(String),
    #[error("push request rejected: {0}")]
    PushRejected(String),
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected gateway response: {0}")]
    MalformedResponse(String),
}
