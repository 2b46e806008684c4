use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event_type: String,
    pub session_id: String,
    pub state: String,
    pub phone: Option<String>,
    pub amount: Option<u64>,
    pub checkout_id: Option<String>,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: &str, session_id: &str, state: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            session_id: session_id.to_string(),
            state: state.to_string(),
            phone: None,
            amount: None,
            checkout_id: None,
            error: None,
        }
    }

    pub fn with_payment(mut self, phone: String, amount: u64) -> Self {
        self.phone = Some(phone);
        self.amount = Some(amount);
        self
    }

    pub fn with_checkout_id(mut self, checkout_id: String) -> Self {
        self.checkout_id = Some(checkout_id);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

pub fn write_audit_event(path: &Path, event: &AuditEvent) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let json = serde_json::to_string(event)?;
    writeln!(file, "{}", json)?;
    tracing::debug!(event_type=%event.event_type, session_id=%event.session_id, "Audit event written");
    Ok(())
}
