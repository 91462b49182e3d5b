// SPDX-License-Identifier: PMPL-1.0-or-later

use thiserror::Error;

/// Failures surfaced by the process runner.
///
/// `NonZeroExit` is a per-unit failure the sweep records and moves past;
/// `Spawn` means the command could not be started at all.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Returned non-zero exit status {code}.")]
    NonZeroExit {
        command: String,
        code: i32,
        output: String,
    },

    #[error("malformed measurement from '{command}': {detail}")]
    MalformedStats { command: String, detail: String },

    #[error("process I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Message stored in the ledger for a failed unit, including any
    /// captured output.
    pub fn ledger_message(&self) -> String {
        match self {
            RunError::NonZeroExit { output, .. } if !output.trim().is_empty() => {
                format!("{}\nOutput:\n{}", self, output.trim_end())
            }
            _ => self.to_string(),
        }
    }
}
