//! # Memply — membership lifecycle & renewal reminders
//!
//! Usage:
//!   memply run                         # One lifecycle + reminder pass
//!   memply serve                       # Run passes on an interval
//!   memply stats                       # Today's engine stats
//!   memply member add "Ada" ada@x.com --expires 2026-04-01
//!   memply blacklist list

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use memply_core::traits::SystemClock;
use memply_core::types::Member;
use memply_core::MemplyConfig;
use memply_engine::ReminderService;
use memply_mailer::SmtpMailer;
use memply_store::MemberStore;

#[derive(Parser)]
#[command(
    name = "memply",
    version,
    about = "📬 Memply — membership lifecycle & renewal reminders"
)]
struct Cli {
    /// Path to config file (defaults to ~/.memply/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one lifecycle + reminder pass and exit
    Run,
    /// Keep running passes on the configured interval
    Serve,
    /// Print today's engine stats
    Stats,
    /// Manage members
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },
    /// Inspect the delivery blacklist
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },
}

#[derive(Subcommand)]
enum MemberAction {
    /// Register a new member
    Add {
        name: String,
        email: String,
        /// Plan label used in reminder templates
        #[arg(long, default_value = "Standard")]
        plan: String,
        /// Renewal price in cents, used in reminder templates
        #[arg(long, default_value_t = 0)]
        price_cents: i64,
        /// Entitlement end date (YYYY-MM-DD)
        #[arg(long)]
        expires: NaiveDate,
    },
    /// List all members
    List,
    /// Record a payment and start a fresh entitlement period
    Pay {
        id: String,
        /// New entitlement end date (YYYY-MM-DD)
        #[arg(long)]
        new_expiry: NaiveDate,
        /// Payment date, today if omitted
        #[arg(long)]
        paid_on: Option<NaiveDate>,
    },
    /// Manually suspend a member
    Suspend { id: String },
    /// Reactivate a suspended or expired member
    Reactivate { id: String },
    /// Cancel a membership (terminal)
    Cancel { id: String },
}

#[derive(Subcommand)]
enum BlacklistAction {
    /// Show all failure-history entries
    List,
    /// Administrative unblock: delete a recipient's entry
    Remove { email: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "memply=debug" } else { "memply=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => MemplyConfig::load_from(path)?,
        None => MemplyConfig::load()?,
    };
    let store = Arc::new(MemberStore::open(&config.store.db_path)?);

    match cli.command {
        Command::Run => {
            let service = build_service(store, config);
            let outcome = service.run_once().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Serve => {
            let interval_secs = config.serve.check_interval_secs;
            let service = build_service(store, config);
            tracing::info!("⏰ Memply serving (pass every {interval_secs}s)");
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let outcome = service.run_once().await;
                tracing::info!("🏁 {}", outcome.message);
            }
        }
        Command::Stats => {
            let service = build_service(store, config);
            let stats = service.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Member { action } => run_member_action(&store, action)?,
        Command::Blacklist { action } => run_blacklist_action(&store, action)?,
    }

    Ok(())
}

fn build_service(store: Arc<MemberStore>, config: MemplyConfig) -> ReminderService {
    let transport = Arc::new(SmtpMailer::new(config.smtp.clone()));
    ReminderService::new(store, transport, Arc::new(SystemClock), config)
}

fn run_member_action(store: &MemberStore, action: MemberAction) -> Result<()> {
    match action {
        MemberAction::Add { name, email, plan, price_cents, expires } => {
            let member = Member::new(&name, &email, &plan, price_cents, expires);
            store.add_member(&member)?;
            println!("Added member {} ({})", member.name, member.id);
        }
        MemberAction::List => {
            for m in store.list_members()? {
                println!(
                    "{}  {:<10} {:<24} {:<28} expires {}",
                    m.id,
                    m.status.as_str(),
                    m.name,
                    m.email,
                    m.expiry_date
                );
            }
        }
        MemberAction::Pay { id, new_expiry, paid_on } => {
            let paid_on = paid_on.unwrap_or_else(|| chrono::Utc::now().date_naive());
            store.record_payment(&id, paid_on, new_expiry)?;
            println!("Payment recorded for {id}, active until {new_expiry}");
        }
        MemberAction::Suspend { id } => {
            store.suspend_member(&id)?;
            println!("Member {id} suspended");
        }
        MemberAction::Reactivate { id } => {
            store.reactivate_member(&id)?;
            println!("Member {id} reactivated");
        }
        MemberAction::Cancel { id } => {
            store.cancel_member(&id)?;
            println!("Member {id} cancelled");
        }
    }
    Ok(())
}

fn run_blacklist_action(store: &MemberStore, action: BlacklistAction) -> Result<()> {
    match action {
        BlacklistAction::List => {
            for entry in store.list_blacklist()? {
                println!(
                    "{:<28} {:<18} attempts {:<3} {} last: {}",
                    entry.email,
                    entry.error_type.as_str(),
                    entry.attempt_count,
                    if entry.is_permanent { "PERMANENT" } else { "transient" },
                    entry.error_message
                );
            }
        }
        BlacklistAction::Remove { email } => {
            if store.remove_blacklist_entry(&email)? {
                println!("Removed blacklist entry for {email}");
            } else {
                println!("No blacklist entry for {email}");
            }
        }
    }
    Ok(())
}
