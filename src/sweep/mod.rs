// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sweep: cached runs over the configured parameter space
//!
//! Three passes, each enabled by the stats section of the config:
//! rule-generating programs over wordlist samples, the cracker over
//! attack × target × rule file × rule prefix size, and strength
//! histograms of recovered passwords and target files. Every unit is looked
//! up in the ledger by command fingerprint first; a hit is never rerun but
//! its stored figures are copied into any table still missing its row.

mod cracker;
mod metrics;
mod program;
mod strength;


use crate::context::SweepContext;
use crate::ledger::{LedgerRecord, RecordStats};
use crate::runner::RunError;
use crate::types::WorkUnit;
use anyhow::Result;
use colored::*;
use serde::Serialize;
use tracing::warn;

/// A unit that ran and failed; the sweep carried on without it
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub command: String,
    pub error: String,
}

/// Counters for one sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    /// Units actually executed
    pub executed: usize,
    /// Units skipped because the ledger already had them
    pub cached: usize,
    /// Ledger records copied into tables that lacked them
    pub replayed: usize,
    pub failed: usize,
    /// Size variants that could not be produced
    pub skipped: usize,
    pub failures: Vec<UnitFailure>,
}

/// Runs every enabled pass. Work-unit failures are recorded and counted;
/// missing inputs and storage errors abort the sweep.
pub fn run(ctx: &SweepContext) -> Result<SweepSummary> {
    let stats = &ctx.config.stats;
    let mut summary = SweepSummary::default();

    if stats.program_stats_enabled() {
        program::run(ctx, &mut summary)?;
    }

    if stats.recovered_guesses {
        let sizes = if ctx.config.input.rules_size.is_empty() {
            vec![0]
        } else {
            ctx.config.input.rules_size.clone()
        };
        cracker::run(ctx, &sizes, &mut summary)?;
    }

    if stats.strength_enabled() {
        // Strength of recovered passwords needs full-size cracker runs.
        if !stats.recovered_guesses {
            cracker::run(ctx, &[0], &mut summary)?;
        }
        strength::score_targets(ctx, &mut summary)?;
    }

    Ok(summary)
}

/// Stored stats for `command`, if the ledger is enabled and has it as done.
fn cached(ctx: &SweepContext, command: &str) -> Option<(RecordStats, Option<String>)> {
    ctx.ledger.as_ref()?.stats_for(command)
}

fn record(ctx: &SweepContext, record: LedgerRecord) -> Result<()> {
    match &ctx.ledger {
        Some(ledger) => ledger.upsert(record),
        None => Ok(()),
    }
}

fn record_failure(
    ctx: &SweepContext,
    summary: &mut SweepSummary,
    unit: &WorkUnit,
    stats: RecordStats,
    err: &RunError,
) -> Result<()> {
    warn!("'{}' failed: {}", unit.command, err);
    summary.failed += 1;
    summary.failures.push(UnitFailure {
        command: unit.command.clone(),
        error: err.to_string(),
    });
    record(
        ctx,
        LedgerRecord::error(
            unit.command.clone(),
            err.ledger_message(),
            Some(unit.rule_file.clone()),
            stats,
        ),
    )
}

/// Print a summary to the terminal
pub fn print_summary(summary: &SweepSummary, quiet: bool) {
    if quiet {
        return;
    }

    println!("\n{}", "=== SWEEP SUMMARY ===".bold().cyan());
    println!(
        "Executed: {}  |  Cached: {}  |  Replayed: {}",
        summary.executed.to_string().green(),
        summary.cached,
        summary.replayed
    );
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().bold()
    } else {
        summary.failed.to_string().normal()
    };
    println!("Failed: {}  |  Skipped: {}", failed, summary.skipped);

    if !summary.failures.is_empty() {
        println!();
        for failure in summary.failures.iter().take(20) {
            println!("  {} {}", "ERROR".red(), failure.command);
            println!("        {}", failure.error);
        }
        if summary.failures.len() > 20 {
            println!("  ... and {} more failures", summary.failures.len() - 20);
        }
    }
    println!();
}
