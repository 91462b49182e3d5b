// SPDX-License-Identifier: PMPL-1.0-or-later

//! pwdre: cached parameter sweeps for password rule generators and crackers.
//!
//! Every external invocation is identified by the SHA-256 of its command
//! line. A JSON ledger remembers which commands already ran and what they
//! measured; append-only CSV tables hold the observations. Re-running a
//! sweep never repeats finished work, and tables missing a row get it back
//! from the ledger.
//!
//! PIECES:
//! 1. **Runner**: spawns a shell command on one merged output pipe, polls it,
//!    samples CPU over the process subtree and reports time, peak memory and
//!    mean CPU. Supports stopping early on an output marker.
//! 2. **Ledger**: fingerprint → record map, rewritten atomically.
//! 3. **Tables**: header-first CSV files with duplicate checks before append.
//! 4. **Sweep**: walks wordlists, programs, attacks, targets and rule sizes,
//!    consulting the ledger before every run.

pub mod config;
pub mod context;
pub mod files;
pub mod fingerprint;
pub mod ledger;
pub mod logging;
pub mod runner;
pub mod strength;
pub mod sweep;
pub mod table;
pub mod types;

pub use context::{SweepContext, SweepOptions};
pub use fingerprint::{fingerprint, Fingerprint};
pub use ledger::{Ledger, LedgerRecord, RecordStats};
pub use runner::{ProcessRunner, RunError, RunOutcome};
pub use sweep::SweepSummary;
pub use types::{RunState, RunStats, Status, WorkUnit};
