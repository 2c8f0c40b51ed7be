//! Summary rendering.

use std::io::Write;

use anyhow::Result;
use console::style;

use snaplock_core::prelude::{LockAction, RunSummary};

use crate::OutputFormat;

pub fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Table => write_table(&mut out, summary)?,
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
        }
        OutputFormat::Quiet => {}
    }

    if summary.has_errors() {
        let stderr = std::io::stderr();
        write_warning(&mut stderr.lock(), summary)?;
    }
    Ok(())
}

fn write_table(out: &mut impl Write, summary: &RunSummary) -> Result<()> {
    writeln!(
        out,
        "{} (resource group {})",
        style("Snapshot lock summary").bold(),
        summary.resource_group
    )?;
    writeln!(out, "  Processed:     {}", summary.processed)?;
    writeln!(out, "  Locks added:   {}", style(summary.locks_added).green())?;
    writeln!(out, "  Locks removed: {}", style(summary.locks_removed).green())?;
    if summary.has_errors() {
        writeln!(out, "  Errors:        {}", style(summary.errors).red())?;
    } else {
        writeln!(out, "  Errors:        {}", summary.errors)?;
    }

    if !summary.outcomes.is_empty() {
        writeln!(out)?;
    }
    for outcome in &summary.outcomes {
        let line = match (&outcome.action, &outcome.error) {
            (_, Some(error)) => format!("{} {}: {}", style("✗").red(), outcome.snapshot, error),
            (Some(LockAction::Added { lock_name }), _) => {
                format!("✓ {}: added lock '{}'", outcome.snapshot, lock_name)
            }
            (Some(LockAction::Removed { lock_names }), _) => {
                let names: Vec<String> = lock_names.iter().map(|n| format!("'{n}'")).collect();
                let noun = if lock_names.len() == 1 { "lock" } else { "locks" };
                format!("✓ {}: removed {} {}", outcome.snapshot, noun, names.join(", "))
            }
            (Some(LockAction::AlreadyLocked { lock_name }), _) => {
                format!("• {}: already locked by '{}'", outcome.snapshot, lock_name)
            }
            (Some(LockAction::NothingToRemove), _) | (None, None) => {
                format!("• {}: no lock, past retention", outcome.snapshot)
            }
        };
        writeln!(out, "  {} ({}h old)", line, outcome.age_hours)?;
    }
    Ok(())
}

fn write_warning(out: &mut impl Write, summary: &RunSummary) -> Result<()> {
    let failed: Vec<&str> = summary.failures().map(|o| o.snapshot.as_str()).collect();
    writeln!(
        out,
        "{} {} of {} snapshot(s) could not be reconciled and were left unchanged: {}",
        style("warning:").yellow().bold(),
        summary.errors,
        summary.processed,
        failed.join(", ")
    )?;
    Ok(())
}
