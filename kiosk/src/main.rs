mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "booth", about = "360 photo booth payment kiosk", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initiate an STK push and wait for the payer to approve it
    Pay {
        /// Payer phone number (07..., 01..., or 2547...)
        #[arg(long)]
        phone: String,
        /// Whole shillings; defaults to the configured session price
        #[arg(long)]
        amount: Option<u64>,
    },
    /// List recorded payment sessions, newest first
    Sessions,
    /// Show the active configuration
    Config,
    /// Update booth settings
    Set {
        /// Session price in shillings
        #[arg(long)]
        price: Option<f64>,
        /// Recording time in seconds
        #[arg(long)]
        record_time: Option<u64>,
        /// Admin notification email
        #[arg(long)]
        email: Option<String>,
        /// Gateway kind: mock or daraja
        #[arg(long)]
        gateway: Option<String>,
        /// Callback URL registered with the gateway
        #[arg(long)]
        callback_url: Option<String>,
    },
    /// Set or rotate the admin password
    SetPassword {
        new_password: String,
        /// Required once a password has been set
        #[arg(long)]
        old_password: Option<String>,
    },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Pay { phone, amount } => commands::pay(&phone, amount).await,
        Command::Sessions => commands::sessions(),
        Command::Config => commands::show_config(),
        Command::Set {
            price,
            record_time,
            email,
            gateway,
            callback_url,
        } => commands::update_settings(price, record_time, email, gateway, callback_url),
        Command::SetPassword {
            new_password,
            old_password,
        } => commands::set_password(&new_password, old_password.as_deref()),
    }
}
