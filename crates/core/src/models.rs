use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gateway-issued key for polling the outcome of an initiated push.
/// Discarded once a terminal outcome has been returned for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutHandle {
    pub checkout_id: String,
    pub created_at: DateTime<Utc>,
}

impl CheckoutHandle {
    pub fn new(checkout_id: String) -> Self {
        Self {
            checkout_id,
            created_at: Utc::now(),
        }
    }
}

/// Terminal result of one payment attempt. These are values, not errors:
/// a declined payment is a normal outcome of the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    /// Payer approved the push; the booth session may start.
    Success { description: Option<String> },
    /// Gateway reported a non-zero result code.
    Failed { description: Option<String> },
    /// Payer dismissed the prompt on the handset.
    Cancelled { description: Option<String> },
    /// No terminal result before the polling deadline.
    Timeout,
    /// Setup failed before a push was ever confirmed (no token, push
    /// rejected, transport down).
    Error { description: Option<String> },
}

impl PaymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentOutcome::Success { .. })
    }

    /// Stable lowercase label used for session records and audit events.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentOutcome::Success { .. } => "success",
            PaymentOutcome::Failed { .. } => "failed",
            PaymentOutcome::Cancelled { .. } => "cancelled",
            PaymentOutcome::Timeout => "timeout",
            PaymentOutcome::Error { .. } => "error",
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            PaymentOutcome::Success { description }
            | PaymentOutcome::Failed { description }
            | PaymentOutcome::Cancelled { description }
            | PaymentOutcome::Error { description } => description.as_deref(),
            PaymentOutcome::Timeout => None,
        }
    }
}
