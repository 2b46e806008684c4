mod audit;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use audit::{write_audit_event, AuditEvent};
use booth_core::models::PaymentOutcome;
use booth_core::phone;
use chrono::{DateTime, Utc};
use gateway::{poll, PaymentGateway, PollConfig};
use serde::{Deserialize, Serialize};
use sled::Db;
use tokio::sync::oneshot;

/// One payment attempt as persisted in the session store.
///
/// `state` moves `queued` → `awaiting_approval` → one of `success`,
/// `failed`, `cancelled`, `timeout`, `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub phone: String,
    pub amount: u64,
    pub state: String,
    pub last_error: Option<String>,
    pub checkout_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Handle returned from [`PaymentWorker::submit`]. `outcome` resolves
/// exactly once, when the payment reaches a terminal state. Dropping it
/// abandons the wait without touching the flow or the session record —
/// that is the whole abort story, since the gateway has no cancel API.
pub struct PaymentTicket {
    pub session_id: String,
    pub outcome: oneshot::Receiver<PaymentOutcome>,
}

/// Single worker for payment flows. Each submission runs on its own
/// background task; every transition lands in the session store and the
/// audit log. Replaces the thread-per-button-press pattern: the caller
/// hands over a request and gets a ticket back, nothing more.
pub struct PaymentWorker {
    db: Db,
    audit_path: PathBuf,
    gateway: Arc<dyn PaymentGateway>,
    poll: PollConfig,
}

impl PaymentWorker {
    pub fn open(
        path: impl AsRef<Path>,
        gateway: Arc<dyn PaymentGateway>,
        poll: PollConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).context("failed to open session store")?;
        let audit_path = path.with_extension("audit.jsonl");
        Ok(Self {
            db,
            audit_path,
            gateway,
            poll,
        })
    }

    fn sessions_tree(&self) -> Result<sled::Tree> {
        Ok(self.db.open_tree("sessions")?)
    }

    /// Validates the request, records it, and starts the payment flow in
    /// the background. Setup failures (bad phone, zero amount) surface
    /// here synchronously and never consume poll attempts.
    pub fn submit(&self, phone: &str, amount: u64) -> Result<PaymentTicket> {
        let phone = phone::normalize(phone)?;
        if amount == 0 {
            bail!("amount must be a positive number of shillings");
        }

        let session_id = generate_session_id();
        let now = Utc::now();
        let record = SessionRecord {
            session_id: session_id.clone(),
            phone: phone.clone(),
            amount,
            state: "queued".to_string(),
            last_error: None,
            checkout_id: None,
            created_at: now,
            updated_at: now,
        };

        let sessions = self.sessions_tree()?;
        sessions.insert(session_id.as_bytes(), serde_json::to_vec(&record)?)?;

        let _ = write_audit_event(
            &self.audit_path,
            &AuditEvent::new("payment_queued", &session_id, "queued")
                .with_payment(phone.clone(), amount),
        );

        let (tx, rx) = oneshot::channel();
        let client = Arc::clone(&self.gateway);
        let poll_cfg = self.poll.clone();
        let audit_path = self.audit_path.clone();
        let task_session_id = session_id.clone();

        tokio::spawn(async move {
            let result = process_payment(
                client,
                sessions,
                audit_path,
                task_session_id.clone(),
                phone,
                amount,
                poll_cfg,
            )
            .await;

            match result {
                // the receiver may be gone; the record already holds the outcome
                Ok(outcome) => {
                    let _ = tx.send(outcome);
                }
                Err(e) => {
                    tracing::error!(session_id=%task_session_id, error=%e, "payment flow failed")
                }
            }
        });

        Ok(PaymentTicket {
            session_id,
            outcome: rx,
        })
    }

    /// Recorded sessions, newest first.
    pub fn sessions(&self) -> Result<Vec<SessionRecord>> {
        read_sessions(&self.sessions_tree()?)
    }
}

async fn process_payment(
    client: Arc<dyn PaymentGateway>,
    sessions: sled::Tree,
    audit_path: PathBuf,
    session_id: String,
    phone: String,
    amount: u64,
    poll_cfg: PollConfig,
) -> Result<PaymentOutcome> {
    let handle = match client.initiate(&phone, amount).await {
        Ok(handle) => handle,
        Err(err) => {
            let outcome = PaymentOutcome::Error {
                description: Some(err.to_string()),
            };
            update_record(&sessions, &session_id, |rec| {
                rec.state = outcome.label().into();
                rec.updated_at = Utc::now();
                rec.last_error = Some(err.to_string());
            })?;
            let _ = write_audit_event(
                &audit_path,
                &AuditEvent::new("initiation_failed", &session_id, outcome.label())
                    .with_error(err.to_string()),
            );
            return Ok(outcome);
        }
    };

    update_record(&sessions, &session_id, |rec| {
        rec.state = "awaiting_approval".into();
        rec.updated_at = Utc::now();
        rec.checkout_id = Some(handle.checkout_id.clone());
    })?;
    let _ = write_audit_event(
        &audit_path,
        &AuditEvent::new("push_sent", &session_id, "awaiting_approval")
            .with_checkout_id(handle.checkout_id.clone()),
    );

    let checkout_id = handle.checkout_id.clone();
    let outcome = poll::wait_for_outcome(client.as_ref(), handle, &poll_cfg).await;

    update_record(&sessions, &session_id, |rec| {
        rec.state = outcome.label().into();
        rec.updated_at = Utc::now();
        rec.last_error = match &outcome {
            PaymentOutcome::Success { .. } => None,
            other => other.description().map(str::to_string),
        };
    })?;

    let mut event = AuditEvent::new("payment_resolved", &session_id, outcome.label())
        .with_checkout_id(checkout_id);
    if !outcome.is_success() {
        if let Some(desc) = outcome.description() {
            event = event.with_error(desc.to_string());
        }
    }
    let _ = write_audit_event(&audit_path, &event);

    if outcome.is_success() {
        tracing::info!(session_id=%session_id, "payment confirmed, booth session unlocked");
    }

    Ok(outcome)
}

fn update_record<F>(sessions: &sled::Tree, session_id: &str, mut f: F) -> Result<()>
where
    F: FnMut(&mut SessionRecord),
{
    let key = session_id.as_bytes();
    let existing = sessions
        .get(key)?
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;
    let mut rec: SessionRecord = serde_json::from_slice(&existing)?;
    f(&mut rec);
    sessions.insert(key, serde_json::to_vec(&rec)?)?;
    Ok(())
}

fn read_sessions(sessions: &sled::Tree) -> Result<Vec<SessionRecord>> {
    let mut out = Vec::new();
    for item in sessions.iter() {
        let (_k, v) = item?;
        let rec: SessionRecord = serde_json::from_slice(&v)?;
        out.push(rec);
    }
    out.sort_by_key(|r| r.created_at);
    out.reverse();
    Ok(out)
}

/// Open a session store read-only, without standing up a worker.
pub fn list_sessions(path: impl AsRef<Path>) -> Result<Vec<SessionRecord>> {
    let db = sled::open(path).context("failed to open session store")?;
    read_sessions(&db.open_tree("sessions")?)
}

fn generate_session_id() -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}
