// SPDX-License-Identifier: PMPL-1.0-or-later

//! The `measure` boundary.
//!
//! Peak-memory accounting for terminated children is cumulative over the
//! lifetime of a process, so each measured command runs inside a fresh
//! `pwdre measure` process. That process prints a single
//! `elapsed,memory,cpu` line on stdout, or exits non-zero with the
//! diagnostic on stderr.

use super::{ProcessRunner, RunError};
use crate::types::RunStats;
use std::path::Path;
use std::process::{Command, Stdio};

const FAILURE_BANNER: &str = "Returned non-zero exit status";

#[derive(Debug, Clone, Copy)]
pub struct MeasureRequest<'a> {
    pub command: &'a str,
    pub workdir: &'a Path,
    pub stop_marker: Option<&'a str>,
}

/// Body of the `measure` subcommand: run in-process and return the stats.
pub fn run_measure_command(request: &MeasureRequest<'_>) -> Result<RunStats, RunError> {
    let runner = ProcessRunner::new(request.workdir);
    let outcome = match request.stop_marker {
        Some(marker) => {
            let stop = |line: &str| line.contains(marker);
            runner.run(request.command, Some(&stop))?
        }
        None => runner.run(request.command, None)?,
    };
    Ok(outcome.stats)
}

/// Text the `measure` subcommand writes to stderr for a failed command.
pub fn failure_report(code: i32, output: &str) -> String {
    format!("{} {}.\nOutput:\n{}\n", FAILURE_BANNER, code, output)
}

/// Runs `exe measure ... -- <command>` and parses its stats line.
pub fn measure_in_subprocess(
    exe: &Path,
    request: &MeasureRequest<'_>,
) -> Result<RunStats, RunError> {
    let mut cmd = Command::new(exe);
    cmd.arg("measure").arg("--workdir").arg(request.workdir);
    if let Some(marker) = request.stop_marker {
        cmd.arg("--stop-marker").arg(marker);
    }
    cmd.arg("--").arg(request.command).stdin(Stdio::null());

    let output = cmd.output().map_err(|source| RunError::Spawn {
        command: request.command.to_string(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RunError::NonZeroExit {
            command: request.command.to_string(),
            code: output.status.code().unwrap_or(1),
            output: strip_failure_banner(&stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .trim()
        .parse::<RunStats>()
        .map_err(|detail| RunError::MalformedStats {
            command: request.command.to_string(),
            detail,
        })
}

fn strip_failure_banner(stderr: &str) -> &str {
    match stderr.find(FAILURE_BANNER) {
        Some(pos) => {
            let rest = &stderr[pos..];
            rest.find("Output:\n")
                .map(|idx| &rest[idx + "Output:\n".len()..])
                .unwrap_or(rest)
        }
        None => stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn banner_is_stripped_from_forwarded_output() {
        let report = failure_report(2, "hashcat: no such file");
        assert_eq!(strip_failure_banner(&report), "hashcat: no such file\n");
        assert_eq!(strip_failure_banner("plain text"), "plain text");
    }

    #[test]
    fn in_process_measure_honours_stop_marker() {
        let dir = TempDir::new().unwrap();
        let request = MeasureRequest {
            command: "echo start; echo STOP; exec sleep 30",
            workdir: dir.path(),
            stop_marker: Some("STOP"),
        };
        let stats = run_measure_command(&request).unwrap();
        assert!(stats.elapsed_secs < 10.0);
    }
}
