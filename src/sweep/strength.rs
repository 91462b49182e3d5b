// SPDX-License-Identifier: PMPL-1.0-or-later

//! Strength histograms of recovered passwords and of the target files.

use super::{cached, record, SweepSummary};
use crate::context::SweepContext;
use crate::files;
use crate::ledger::{Histogram, LedgerRecord, RecordStats};
use crate::strength::{analyze_file, StrengthStats};
use crate::table::{StrengthRecoveredRows, StrengthScoreRow, TableKind};
use anyhow::Result;
use tracing::{debug, info};

const FULL_RECOVERY: &str = "100.0";
const NOTHING_RECOVERED: &str = "0.00";

pub(super) fn rule_strength_command(rule_file: &str, attack: &str, target: &str) -> String {
    format!("zxcvbn R:{} A:{} T:{}", rule_file, attack, target)
}

pub(super) fn target_strength_command(target: &str) -> String {
    format!("zxcvbn T:{}", target)
}

/// True when some enabled strength table has no rows for `file_name`.
fn rows_missing(ctx: &SweepContext, file_name: &str) -> Result<bool> {
    let stats = &ctx.config.stats;
    Ok((stats.zxcvbn_recovered
        && !ctx
            .tables
            .file_row_exists(TableKind::StrengthRecovered, file_name)?)
        || (stats.zxcvbn_score
            && !ctx
                .tables
                .file_row_exists(TableKind::StrengthScore, file_name)?))
}

/// Appends to each enabled table still lacking `file_name`. True if
/// anything was written.
fn write_tables(
    ctx: &SweepContext,
    file_name: &str,
    recovered: &str,
    guesses_log10: &Histogram,
    score: &Histogram,
) -> Result<bool> {
    let stats = &ctx.config.stats;
    let mut wrote = false;

    if stats.zxcvbn_recovered
        && !ctx
            .tables
            .file_row_exists(TableKind::StrengthRecovered, file_name)?
    {
        let rows = StrengthRecoveredRows {
            file_name,
            recovered,
            guesses_log10,
        }
        .to_records();
        wrote |= !rows.is_empty();
        ctx.tables.append_rows(TableKind::StrengthRecovered, &rows)?;
    }

    if stats.zxcvbn_score && !ctx.tables.file_row_exists(TableKind::StrengthScore, file_name)? {
        let row = StrengthScoreRow {
            file_name,
            recovered,
            score,
        };
        ctx.tables.append_row(TableKind::StrengthScore, &row.to_record())?;
        wrote = true;
    }
    Ok(wrote)
}

fn strength_record(
    command: &str,
    rule_file: Option<&str>,
    recovered: &str,
    found: StrengthStats,
) -> LedgerRecord {
    let stats = RecordStats {
        recovered: Some(recovered.to_string()),
        guesses_log10: Some(found.guesses_log10),
        score: Some(found.score),
        ..RecordStats::default()
    };
    LedgerRecord::done(command, rule_file.map(str::to_string), stats)
}

/// Copies a stored strength record into the tables.
fn replay(
    ctx: &SweepContext,
    command: &str,
    file_name: &str,
    summary: &mut SweepSummary,
) -> Result<bool> {
    let Some((stats, _)) = cached(ctx, command) else {
        return Ok(false);
    };
    let recovered = stats.recovered.unwrap_or_else(|| NOTHING_RECOVERED.to_string());
    let guesses = stats.guesses_log10.unwrap_or_default();
    let score = stats.score.unwrap_or_default();
    if write_tables(ctx, file_name, &recovered, &guesses, &score)? {
        info!("strength statistics for '{}' retrieved from ledger", file_name);
        summary.replayed += 1;
    }
    Ok(true)
}

/// Cracker cache hit: the recovered file is long gone, so only the ledger
/// can fill the tables.
pub(super) fn replay_rule(
    ctx: &SweepContext,
    command: &str,
    rule_file: &str,
    summary: &mut SweepSummary,
) -> Result<()> {
    if rows_missing(ctx, rule_file)? && !replay(ctx, command, rule_file, summary)? {
        debug!("no strength statistics stored for '{}'", command);
    }
    Ok(())
}

/// Scores the cracker's recovered-password file for `rule_file`.
pub(super) fn score_recovered(
    ctx: &SweepContext,
    command: &str,
    rule_file: &str,
    recovered: Option<&str>,
    summary: &mut SweepSummary,
) -> Result<()> {
    if !rows_missing(ctx, rule_file)? {
        return Ok(());
    }
    info!("RUN: {}", command);
    let found = analyze_file(&ctx.recovered_file(), ctx.scorer.as_ref())?;
    let recovered = recovered.unwrap_or(NOTHING_RECOVERED);
    write_tables(ctx, rule_file, recovered, &found.guesses_log10, &found.score)?;
    record(ctx, strength_record(command, Some(rule_file), recovered, found))?;
    summary.executed += 1;
    Ok(())
}

/// Scores every target file in full.
pub(super) fn score_targets(ctx: &SweepContext, summary: &mut SweepSummary) -> Result<()> {
    for target in &ctx.targets {
        let name = files::display(target);
        if !rows_missing(ctx, &name)? {
            continue;
        }
        let command = target_strength_command(&name);
        if replay(ctx, &command, &name, summary)? {
            summary.cached += 1;
            continue;
        }

        info!("RUN: {}", command);
        let found = analyze_file(&ctx.resolve(target), ctx.scorer.as_ref())?;
        write_tables(ctx, &name, FULL_RECOVERY, &found.guesses_log10, &found.score)?;
        record(ctx, strength_record(&command, None, FULL_RECOVERY, found))?;
        summary.executed += 1;
    }
    Ok(())
}
