// SPDX-License-Identifier: PMPL-1.0-or-later

//! Durable command ledger.
//!
//! One JSON object maps command fingerprints to [`LedgerRecord`]s. Every
//! mutation is a whole-file read-modify-write: the map is loaded, changed and
//! written to a sibling temp file which is then renamed over the original, so
//! a crash never leaves a half-written ledger behind. There is no locking;
//! one sweep process owns the file at a time.

mod record;

pub use record::{Histogram, LedgerRecord, RecordStats};

use crate::fingerprint::{fingerprint, Fingerprint};
use crate::types::Status;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub type LedgerMap = BTreeMap<Fingerprint, LedgerRecord>;

/// Default ledger location relative to the sweep root
pub const DEFAULT_LEDGER_FILE: &str = "log/log.json";

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Asks on `output` whether to delete the ledger file and removes it on
    /// a `y` answer. Returns true if the file was deleted.
    pub fn delete_confirmed(
        &self,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        write!(
            output,
            "The file '{}' exists. Do you really want to delete it? [Y/N]: ",
            self.path.display()
        )?;
        output.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        if answer.trim().eq_ignore_ascii_case("y") {
            fs::remove_file(&self.path)
                .with_context(|| format!("deleting ledger {}", self.path.display()))?;
            writeln!(output, "Deletion completed.")?;
            Ok(true)
        } else {
            writeln!(output, "Deletion canceled.")?;
            Ok(false)
        }
    }

    /// Reads the whole ledger. A missing, empty or unparsable file is
    /// treated as an empty history.
    pub fn load(&self) -> LedgerMap {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("ledger {} unreadable, starting empty: {}", self.path.display(), err);
                }
                return LedgerMap::new();
            }
        };
        if content.trim().is_empty() {
            return LedgerMap::new();
        }
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(err) => {
                warn!(
                    "ledger {} is malformed, treating history as empty: {}",
                    self.path.display(),
                    err
                );
                LedgerMap::new()
            }
        }
    }

    /// Serializes `map` and atomically replaces the ledger file.
    pub fn save(&self, map: &LedgerMap) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        atomic_write(&self.path, json.as_bytes())
            .with_context(|| format!("writing ledger {}", self.path.display()))
    }

    /// Stores `record` under the fingerprint of its command (last write wins).
    pub fn upsert(&self, mut record: LedgerRecord) -> Result<()> {
        let mut map = self.load();
        let key = fingerprint(&record.command);
        record.updated_at = Some(Utc::now().to_rfc3339());
        debug!("ledger upsert {} ({:?})", key, record.status);
        map.insert(key, record);
        self.save(&map)
    }

    pub fn get(&self, command: &str) -> Option<LedgerRecord> {
        self.load().remove(&fingerprint(command))
    }

    /// True only when a record exists for `command` with status `done`.
    pub fn has_run(&self, command: &str) -> bool {
        matches!(self.get(command), Some(record) if record.status == Status::Done)
    }

    /// Stored stats and rule file for a successfully run command. Records
    /// with status `error` are never replayed.
    pub fn stats_for(&self, command: &str) -> Option<(RecordStats, Option<String>)> {
        match self.get(command) {
            Some(record) if record.status == Status::Done => Some((record.stats, record.rule_file)),
            _ => None,
        }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("ledger");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}
