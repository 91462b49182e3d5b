// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core type definitions shared by the ledger, runner and sweep layers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution status stored in a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Done,
    Error,
}

/// Resource usage of one external invocation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunStats {
    /// Wall-clock seconds from launch to exit detection
    pub elapsed_secs: f64,
    /// Peak resident set of the process subtree in MB (reaped children only)
    pub peak_memory_mb: f64,
    /// Mean of all CPU percentage samples, 0 when none were taken
    pub avg_cpu: f64,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2},{:.2},{:.2}",
            self.elapsed_secs, self.peak_memory_mb, self.avg_cpu
        )
    }
}

impl FromStr for RunStats {
    type Err = String;

    /// Parses the `elapsed,memory,cpu` line printed by `pwdre measure`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() != 3 {
            return Err(format!("expected 3 comma-separated fields, got '{}'", line.trim()));
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number '{}': {}", s, e))
        };
        Ok(RunStats {
            elapsed_secs: parse(fields[0])?,
            peak_memory_mb: parse(fields[1])?,
            avg_cpu: parse(fields[2])?,
        })
    }
}

/// How a monitored invocation ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The process exited on its own with an accepted status
    Completed,
    /// The early-stop predicate fired and the process was terminated
    Terminated,
}

/// One fully-resolved external invocation.
///
/// Two units are the same iff their command strings are byte-identical; the
/// remaining fields are context carried into ledger records and table rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub command: String,
    pub rule_file: String,
    pub wordlist: Option<String>,
    pub attack: Option<String>,
    pub target: Option<String>,
    /// Requested size variant (0 = full file)
    pub size: u64,
}

impl WorkUnit {
    pub fn new(command: impl Into<String>, rule_file: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            rule_file: rule_file.into(),
            wordlist: None,
            attack: None,
            target: None,
            size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_stats_line_matches_measure_format() {
        let stats = RunStats {
            elapsed_secs: 1.234,
            peak_memory_mb: 10.0,
            avg_cpu: 99.999,
        };
        assert_eq!(stats.to_string(), "1.23,10.00,100.00");
    }

    #[test]
    fn run_stats_parse_rejects_garbage() {
        assert!("1.0,2.0".parse::<RunStats>().is_err());
        assert!("a,b,c".parse::<RunStats>().is_err());
        let stats: RunStats = " 0.50,3.25,0.00\n".parse().unwrap();
        assert_eq!(stats.peak_memory_mb, 3.25);
    }
}
