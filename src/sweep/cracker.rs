// SPDX-License-Identifier: PMPL-1.0-or-later

//! Cracker runs over attack × target × rule file × rule prefix size.

use super::{cached, metrics, record, record_failure, strength, SweepSummary};
use crate::context::{SweepContext, RECOVERED_FILE};
use crate::files::{self, TempFile};
use crate::ledger::{LedgerRecord, RecordStats};
use crate::runner::{ProcessRunner, RunError};
use crate::table::{CrackerRow, TableKind};
use crate::types::WorkUnit;
use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rule files to attack with: the pre-built folder when configured,
/// otherwise what the programs produce for each full wordlist.
fn rule_files(ctx: &SweepContext) -> Result<Vec<PathBuf>> {
    let general = &ctx.config.general;
    if !general.hashcat_folder.is_empty() {
        return files::list_rule_files(&ctx.root, &general.hashcat_folder);
    }
    let mut rules = Vec::new();
    for wordlist in &ctx.wordlists {
        for program in &ctx.config.programs {
            for index in 0..program.args.len() {
                rules.push(PathBuf::from(files::rules_file_name(
                    &general.rules_file,
                    &program.program,
                    wordlist,
                    index,
                )));
            }
        }
    }
    Ok(rules)
}

struct Combination<'a> {
    attack: &'a Path,
    attack_size: u64,
    target: &'a Path,
    rule_file: &'a Path,
    size: u64,
}

pub(super) fn run(ctx: &SweepContext, sizes: &[u64], summary: &mut SweepSummary) -> Result<()> {
    let rules = rule_files(ctx)?;
    let runner = ProcessRunner::new(&ctx.root);

    for attack in &ctx.attacks {
        let attack_size = files::count_lines(&ctx.resolve(attack))?;
        for target in &ctx.targets {
            for rule_file in &rules {
                if !ctx.resolve(rule_file).is_file() {
                    bail!("rule file not found: {}", rule_file.display());
                }
                for &size in sizes {
                    let combination = Combination {
                        attack,
                        attack_size,
                        target,
                        rule_file,
                        size,
                    };
                    process(ctx, &runner, &combination, summary)?;
                }
            }
        }
    }
    Ok(())
}

fn process(
    ctx: &SweepContext,
    runner: &ProcessRunner,
    combo: &Combination<'_>,
    summary: &mut SweepSummary,
) -> Result<()> {
    let stats_cfg = &ctx.config.stats;
    let attack = files::display(combo.attack);
    let target = files::display(combo.target);
    let rule_name = files::display(combo.rule_file);
    let full = combo.size == 0;

    let truncated = if full {
        None
    } else {
        match files::truncated_rule_file(&ctx.root, combo.rule_file, &ctx.temp_dir, combo.size)? {
            Some(temp) => Some(temp),
            None => {
                summary.skipped += 1;
                return Ok(());
            }
        }
    };
    let rules_arg = truncated
        .as_ref()
        .map(|temp| temp.arg().to_string())
        .unwrap_or_else(|| rule_name.clone());
    let rule_size = if full {
        files::count_lines(&ctx.resolve(combo.rule_file))?
    } else {
        combo.size
    };

    let command =
        ctx.config
            .cracker
            .command(&target, &attack, &rules_arg, full.then_some(RECOVERED_FILE));
    let strength_command = strength::rule_strength_command(&rule_name, &attack, &target);
    let mut unit = WorkUnit::new(command, rule_name.clone());
    unit.attack = Some(attack.clone());
    unit.target = Some(target.clone());
    unit.size = combo.size;

    if let Some((stats, _)) = cached(ctx, &unit.command) {
        info!("ALREADY RUN {}", unit.command);
        summary.cached += 1;
        if stats_cfg.recovered_guesses
            && !ctx
                .tables
                .cracker_row_exists(&rule_name, rule_size, &attack, &target)?
        {
            let row = CrackerRow {
                rule_file: rule_name.clone(),
                rule_size,
                attack: stats.attack.unwrap_or_else(|| attack.clone()),
                attack_size: combo.attack_size,
                target: stats.target.unwrap_or_else(|| target.clone()),
                progress: stats.progress,
                recovered: stats.recovered,
            };
            ctx.tables.append_row(TableKind::Cracker, &row.to_record())?;
            info!("cracker statistics for '{}' retrieved from ledger", unit.command);
            summary.replayed += 1;
        }
        if full && stats_cfg.strength_enabled() {
            strength::replay_rule(ctx, &strength_command, &rule_name, summary)?;
        }
        return Ok(());
    }

    info!("RUN: {}", unit.command);
    let recovered_guard = if full {
        // A leftover outfile would be scored as this run's output.
        match fs::remove_file(ctx.recovered_file()) {
            Ok(()) => debug!("removed stale {}", RECOVERED_FILE),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Some(TempFile::new(ctx.recovered_file(), RECOVERED_FILE))
    } else {
        None
    };

    let base = RecordStats {
        attack: Some(attack.clone()),
        target: Some(target.clone()),
        rule_size: Some(rule_size),
        ..RecordStats::default()
    };
    let output = match runner.run(&unit.command, None) {
        Ok(outcome) => outcome.output,
        Err(RunError::NonZeroExit { code, output, .. }) if ctx.config.cracker.is_success(code) => {
            output
        }
        Err(err) => return record_failure(ctx, summary, &unit, base, &err),
    };
    summary.executed += 1;

    let found = metrics::extract(&output);
    let stats = RecordStats {
        progress: found.progress.clone(),
        recovered: found.recovered.clone(),
        ..base
    };
    record(
        ctx,
        LedgerRecord::done(unit.command.clone(), Some(rule_name.clone()), stats),
    )?;

    if stats_cfg.recovered_guesses
        && !ctx
            .tables
            .cracker_row_exists(&rule_name, rule_size, &attack, &target)?
    {
        let row = CrackerRow {
            rule_file: rule_name.clone(),
            rule_size,
            attack: attack.clone(),
            attack_size: combo.attack_size,
            target: target.clone(),
            progress: found.progress,
            recovered: found.recovered.clone(),
        };
        ctx.tables.append_row(TableKind::Cracker, &row.to_record())?;
    }

    if full && stats_cfg.strength_enabled() {
        strength::score_recovered(
            ctx,
            &strength_command,
            &rule_name,
            found.recovered.as_deref(),
            summary,
        )?;
    }

    drop(recovered_guard);
    drop(truncated);
    Ok(())
}
