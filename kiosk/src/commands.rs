use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use booth_core::models::PaymentOutcome;
use gateway::mock::MockGateway;
use gateway::{DarajaClient, DarajaConfig, PaymentGateway, PollConfig};
use worker::PaymentWorker;

const SESSION_DB: &str = ".booth_sessions";

fn poll_config(cfg: &config::BoothConfig) -> PollConfig {
    PollConfig {
        timeout: Duration::from_secs(cfg.gateway.poll_timeout_secs),
        interval: Duration::from_secs(cfg.gateway.poll_interval_secs),
        cancelled_code: cfg.gateway.cancelled_result_code.clone(),
    }
}

fn create_gateway_client(cfg: &config::BoothConfig) -> Result<Arc<dyn PaymentGateway>> {
    match cfg.gateway.kind.as_str() {
        "daraja" => {
            let consumer_key = config::secret("MPESA_CONSUMER_KEY", "consumer_key")
                .context("consumer key not found in env or keychain")?;
            let consumer_secret = config::secret("MPESA_CONSUMER_SECRET", "consumer_secret")
                .context("consumer secret not found in env or keychain")?;
            let passkey = config::secret("MPESA_PASSKEY", "passkey")
                .context("passkey not found in env or keychain")?;

            let base_url = cfg
                .gateway
                .base_url
                .clone()
                .unwrap_or_else(|| gateway::daraja::SANDBOX_BASE_URL.to_string());
            let callback_url = cfg
                .gateway
                .callback_url
                .clone()
                .ok_or_else(|| anyhow!("gateway callback_url not configured"))?;

            tracing::info!(%base_url, "Using Daraja gateway");
            Ok(DarajaClient::new(DarajaConfig {
                base_url,
                shortcode: cfg.gateway.shortcode.clone(),
                passkey,
                consumer_key,
                consumer_secret,
                callback_url,
                account_reference: cfg.gateway.account_reference.clone(),
                transaction_desc: cfg.gateway.transaction_desc.clone(),
                request_timeout: Duration::from_secs(10),
            }))
        }
        _ => {
            tracing::info!("Using mock gateway");
            Ok(MockGateway::approving())
        }
    }
}

pub async fn pay(phone: &str, amount: Option<u64>) -> Result<()> {
    let cfg = config::load().unwrap_or_default();
    let amount = amount.unwrap_or_else(|| cfg.booth.price.round().max(0.0) as u64);

    let client = create_gateway_client(&cfg)?;
    let worker = PaymentWorker::open(SESSION_DB, client, poll_config(&cfg))?;

    let ticket = worker.submit(phone, amount)?;
    println!(
        "session {}: payment of {} KES started, waiting for the payer...",
        ticket.session_id, amount
    );

    let outcome = ticket
        .outcome
        .await
        .context("payment flow ended without an outcome")?;

    match &outcome {
        PaymentOutcome::Success { .. } => {
            println!(
                "payment confirmed — a {}s booth session is unlocked",
                cfg.booth.record_time_secs
            );
            Ok(())
        }
        other => {
            if let Some(desc) = other.description() {
                println!("payment not completed ({}): {desc}", other.label());
            } else {
                println!("payment not completed ({})", other.label());
            }
            bail!("payment {}", other.label());
        }
    }
}

pub fn sessions() -> Result<()> {
    let records = worker::list_sessions(SESSION_DB)?;
    if records.is_empty() {
        println!("no sessions recorded");
        return Ok(());
    }
    for rec in records {
        println!(
            "{}  {}  {:>6} KES  {}  {}",
            rec.created_at.format("%Y-%m-%d %H:%M:%S"),
            rec.session_id,
            rec.amount,
            rec.phone,
            rec.state
        );
        if let Some(err) = rec.last_error {
            println!("    {err}");
        }
    }
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = config::load().unwrap_or_default();
    println!("gateway:");
    println!("  kind: {}", cfg.gateway.kind);
    println!(
        "  base_url: {}",
        cfg.gateway.base_url.as_deref().unwrap_or("(sandbox default)")
    );
    println!("  shortcode: {}", cfg.gateway.shortcode);
    println!(
        "  callback_url: {}",
        cfg.gateway.callback_url.as_deref().unwrap_or("(unset)")
    );
    println!("  account_reference: {}", cfg.gateway.account_reference);
    println!("  cancelled_result_code: {}", cfg.gateway.cancelled_result_code);
    println!(
        "  polling: every {}s for up to {}s",
        cfg.gateway.poll_interval_secs, cfg.gateway.poll_timeout_secs
    );
    println!("booth:");
    println!("  price: {} KES", cfg.booth.price);
    println!("  record_time: {}s", cfg.booth.record_time_secs);
    println!(
        "  admin_email: {}",
        cfg.booth.admin_email.as_deref().unwrap_or("(unset)")
    );
    println!(
        "  admin_password: {}",
        if cfg.booth.password_hash.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    Ok(())
}

pub fn update_settings(
    price: Option<f64>,
    record_time: Option<u64>,
    email: Option<String>,
    gateway_kind: Option<String>,
    callback_url: Option<String>,
) -> Result<()> {
    let mut cfg = config::load().unwrap_or_default();

    if let Some(price) = price {
        if price < 1.0 {
            bail!("price must be at least 1 shilling");
        }
        cfg.booth.price = price;
    }
    if let Some(record_time) = record_time {
        cfg.booth.record_time_secs = record_time;
    }
    if let Some(email) = email {
        cfg.booth.admin_email = Some(email);
    }
    if let Some(kind) = gateway_kind {
        if kind != "mock" && kind != "daraja" {
            bail!("unknown gateway kind {kind:?}, expected mock or daraja");
        }
        cfg.gateway.kind = kind;
    }
    if let Some(url) = callback_url {
        cfg.gateway.callback_url = Some(url);
    }

    config::store(&cfg)?;
    tracing::info!("Settings updated");
    Ok(())
}

pub fn set_password(new_password: &str, old_password: Option<&str>) -> Result<()> {
    let mut cfg = config::load().unwrap_or_default();

    if cfg.booth.password_hash.is_some() {
        let old = old_password.ok_or_else(|| anyhow!("admin password already set, pass --old-password"))?;
        if !config::verify_password(&cfg, old) {
            bail!("incorrect old password");
        }
    }

    config::set_password(&mut cfg, new_password);
    config::store(&cfg)?;
    println!("admin password set");
    Ok(())
}
