//! Snaplock - age-based deletion locks for disk snapshots
//!
//! Usage:
//!   snaplock -g <resource-group>                 # Reconcile once
//!   snaplock -g <resource-group> --lock-name X   # Create locks named X
//!   snaplock -g <resource-group> --format json   # Machine-readable summary

mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snaplock_core::prelude::*;

#[derive(Parser)]
#[command(name = "snaplock")]
#[command(about = "Keep deletion locks on young disk snapshots", long_about = None)]
struct Cli {
    /// Resource group holding the snapshots
    #[arg(short = 'g', long, env = "SNAPLOCK_RESOURCE_GROUP")]
    resource_group: String,

    /// Name of the lock created on young snapshots
    ///
    /// Defaults to the settings file value, then "AutoSnapshot-CannotDelete".
    /// Existing locks are removed from old snapshots whatever their name.
    #[arg(long)]
    lock_name: Option<String>,

    /// Subscription id (defaults to AZURE_SUBSCRIPTION_ID, the settings
    /// file, then the first enabled subscription of the identity)
    #[arg(long)]
    subscription: Option<String>,

    /// Settings file (defaults to <config dir>/snaplock/snaplock.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable summary block
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only report problems
    Quiet,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snaplock=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let settings = resolve_settings(&cli)?;
    let options = build_options(&cli, &settings)?;

    tracing::debug!(
        resource_group = %options.resource_group,
        lock_name = %options.lock_name,
        "Starting snapshot lock reconciliation"
    );

    let client = AzureClient::from_settings(&settings)?;
    let mut reconciler = Reconciler::new(client);
    let summary = reconciler
        .run(&options)
        .context("Snapshot lock reconciliation failed")?;

    output::print_summary(&summary, cli.format)?;
    Ok(())
}

/// Defaults, then the settings file, then environment, then flags.
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply_env();
    if let Some(subscription) = &cli.subscription {
        settings.subscription_id = Some(subscription.clone());
    }
    Ok(settings)
}

fn build_options(cli: &Cli, settings: &Settings) -> Result<ReconcileOptions> {
    let resource_group = cli.resource_group.trim();
    if resource_group.is_empty() {
        anyhow::bail!("Resource group name must not be empty");
    }

    let lock_name = cli
        .lock_name
        .clone()
        .or_else(|| settings.lock_name.clone())
        .unwrap_or_else(|| DEFAULT_LOCK_NAME.to_string());
    if lock_name.trim().is_empty() {
        anyhow::bail!("Lock name must not be empty");
    }

    let mut options = ReconcileOptions::new(resource_group).with_lock_name(lock_name);
    if let Some(note) = &settings.lock_note {
        options = options.with_lock_note(note);
    }
    Ok(options)
}
