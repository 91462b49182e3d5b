// SPDX-License-Identifier: PMPL-1.0-or-later

//! Rule-generating programs, each run measured in its own subprocess.

use super::{cached, record, record_failure, SweepSummary};
use crate::config::ProgramConfig;
use crate::context::SweepContext;
use crate::files;
use crate::ledger::{LedgerRecord, RecordStats};
use crate::runner::{measure_in_subprocess, MeasureRequest};
use crate::table::{ProgramRow, TableKind};
use crate::types::WorkUnit;
use anyhow::Result;
use std::fs;
use tracing::{info, warn};

pub(super) fn run(ctx: &SweepContext, summary: &mut SweepSummary) -> Result<()> {
    let template = &ctx.config.general.rules_file;
    let mut rng = files::sampling_rng(ctx.config.input.seed)?;

    for wordlist in &ctx.wordlists {
        let variants = files::wordlist_variants(
            &ctx.root,
            wordlist,
            &ctx.config.input.wordlist_size,
            &mut rng,
        )?;
        for variant in &variants {
            let wordlist_arg = files::display(&variant.path);
            for program in &ctx.config.programs {
                for (index, args) in program.args.iter().enumerate() {
                    let rule_file =
                        files::rules_file_name(template, &program.program, &variant.path, index);
                    let command = program.command(args, &wordlist_arg, &rule_file);
                    let mut unit = WorkUnit::new(command, rule_file);
                    unit.wordlist = Some(wordlist_arg.clone());
                    unit.size = variant.size;
                    process(ctx, program, index, &unit, summary)?;
                }
            }
        }
    }
    Ok(())
}

fn process(
    ctx: &SweepContext,
    program: &ProgramConfig,
    index: usize,
    unit: &WorkUnit,
    summary: &mut SweepSummary,
) -> Result<()> {
    let wordlist = unit.wordlist.clone().unwrap_or_default();

    if let Some((stats, stored_rule)) = cached(ctx, &unit.command) {
        info!("ALREADY RUN {}", unit.command);
        summary.cached += 1;
        let rule_file = stored_rule.unwrap_or_else(|| unit.rule_file.clone());
        if !ctx.tables.program_row_exists(&rule_file, &wordlist)? {
            let row = ProgramRow {
                program: program.program.clone(),
                run_index: index,
                rule_file,
                wordlist: stats.wordlist.unwrap_or(wordlist),
                size: stats.wordlist_size.unwrap_or(unit.size),
                time: stats.time.unwrap_or_default(),
                memory: stats.memory.unwrap_or_default(),
                cpu: stats.cpu.unwrap_or_default(),
                rules: stats.rule_size.unwrap_or_default(),
            };
            ctx.tables.append_row(TableKind::Program, &row.to_record())?;
            info!("program statistics for '{}' retrieved from ledger", unit.command);
            summary.replayed += 1;
        }
        return Ok(());
    }

    info!("RUN: {}", unit.command);
    let rule_path = ctx.resolve(&unit.rule_file);
    if let Some(parent) = rule_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let base = RecordStats {
        wordlist: Some(wordlist.clone()),
        wordlist_size: Some(unit.size),
        ..RecordStats::default()
    };
    let request = MeasureRequest {
        command: &unit.command,
        workdir: &ctx.root,
        stop_marker: program.stop_marker(),
    };
    let measured = match measure_in_subprocess(&ctx.measure_exe, &request) {
        Ok(measured) => measured,
        Err(err) => return record_failure(ctx, summary, unit, base, &err),
    };
    summary.executed += 1;

    let rule_size = if rule_path.is_file() {
        files::count_lines(&rule_path)?
    } else {
        warn!("'{}' produced no rule file {}", unit.command, unit.rule_file);
        0
    };

    let stats = RecordStats {
        time: Some(measured.elapsed_secs),
        memory: Some(measured.peak_memory_mb),
        cpu: Some(measured.avg_cpu),
        rule_size: Some(rule_size),
        ..base
    };
    record(
        ctx,
        LedgerRecord::done(unit.command.clone(), Some(unit.rule_file.clone()), stats),
    )?;

    if !ctx.tables.program_row_exists(&unit.rule_file, &wordlist)? {
        let row = ProgramRow {
            program: program.program.clone(),
            run_index: index,
            rule_file: unit.rule_file.clone(),
            wordlist,
            size: unit.size,
            time: measured.elapsed_secs,
            memory: measured.peak_memory_mb,
            cpu: measured.avg_cpu,
            rules: rule_size,
        };
        ctx.tables.append_row(TableKind::Program, &row.to_record())?;
    }
    Ok(())
}
