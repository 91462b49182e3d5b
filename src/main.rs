// SPDX-License-Identifier: PMPL-1.0-or-later

//! pwdre: cached rule-generation and cracking sweeps
//!
//! `sweep` runs the configured parameter space; `measure` is the helper the
//! sweep launches around each program so resource accounting starts fresh.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pwdre::logging::{self, Verbosity};
use pwdre::runner::{failure_report, run_measure_command, MeasureRequest, RunError};
use pwdre::{sweep, Ledger, SweepContext, SweepOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pwdre")]
#[command(version)]
#[command(about = "Cached sweeps over password rule generators and crackers")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled pass of the configured sweep
    Sweep {
        /// YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Directory commands run in (default: current directory)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Do not read or write the ledger; every unit runs
        #[arg(long)]
        no_log: bool,

        /// Delete the ledger file (after confirmation) before the sweep
        #[arg(long)]
        delete_log: bool,

        /// Ledger file, relative to the root
        #[arg(short = 'l', long = "log-file", default_value = pwdre::ledger::DEFAULT_LEDGER_FILE)]
        log_file: PathBuf,

        /// Suppress the end-of-sweep summary
        #[arg(short, long)]
        quiet: bool,

        /// Debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run one command and print `elapsed,memory,cpu`
    Measure {
        /// Working directory for the command
        #[arg(long, value_name = "DIR", default_value = ".")]
        workdir: PathBuf,

        /// Stop the command once a line containing this text appears
        #[arg(long, value_name = "TEXT")]
        stop_marker: Option<String>,

        /// Shell command to run
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep {
            config,
            root,
            no_log,
            delete_log,
            log_file,
            quiet,
            verbose,
        } => {
            logging::init(if verbose {
                Verbosity::Verbose
            } else {
                Verbosity::Normal
            });

            let measure_exe =
                std::env::current_exe().context("locating the pwdre executable")?;
            let mut options = SweepOptions::new(config, measure_exe);
            options.root = root;
            options.use_ledger = !no_log;
            options.ledger_file = log_file;

            if delete_log {
                let ledger = Ledger::new(options.ledger_path()?);
                ledger.delete_confirmed(&mut io::stdin().lock(), &mut io::stdout())?;
            }

            let ctx = SweepContext::from_options(&options)?;
            let summary = sweep::run(&ctx)?;
            sweep::print_summary(&summary, quiet);
            println!("The entire process has been completed.");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Measure {
            workdir,
            stop_marker,
            command,
        } => {
            logging::init(Verbosity::Quiet);
            let command = command.join(" ");
            let request = MeasureRequest {
                command: &command,
                workdir: &workdir,
                stop_marker: stop_marker.as_deref(),
            };
            match run_measure_command(&request) {
                Ok(stats) => {
                    let mut stdout = io::stdout();
                    write!(stdout, "{}", stats)?;
                    stdout.flush()?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(RunError::NonZeroExit { code, output, .. }) => {
                    eprint!("{}", failure_report(code, output.trim_end()));
                    Ok(exit_code(code))
                }
                Err(err) => {
                    eprintln!("{}", err);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Exit statuses outside 1..=255 collapse to 1.
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) if code != 0 => ExitCode::from(code),
        _ => ExitCode::FAILURE,
    }
}
