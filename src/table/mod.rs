// SPDX-License-Identifier: PMPL-1.0-or-later

//! Append-only observation tables.
//!
//! Each table is a header-first CSV file. Rows are only ever appended; the
//! no-duplicate invariant is kept by callers checking [`TableStore::row_exists`]
//! (a linear scan) before appending.

mod rows;

pub use rows::{CrackerRow, ProgramRow, StrengthRecoveredRows, StrengthScoreRow};

use anyhow::{Context, Result};
use csv::StringRecord;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Program,
    Cracker,
    StrengthRecovered,
    StrengthScore,
}

impl TableKind {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            TableKind::Program => &[
                "program",
                "run_index",
                "rule_file",
                "wordlist",
                "size",
                "time",
                "memory",
                "cpu",
                "rules",
            ],
            TableKind::Cracker => &[
                "rule_file",
                "rule_size",
                "attack",
                "attack_size",
                "target",
                "progress",
                "recovered",
            ],
            TableKind::StrengthRecovered => &["file_name", "recovered", "guesses_log10", "n"],
            TableKind::StrengthScore => &[
                "file_name",
                "recovered",
                "score_0",
                "score_1",
                "score_2",
                "score_3",
                "score_4",
            ],
        }
    }
}

/// Read-only view of one data row, addressed by column name
pub struct RowView<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.headers.iter().position(|h| h == column)?;
        self.record.get(index)
    }
}

#[derive(Debug, Clone)]
pub struct TableStore {
    program: PathBuf,
    cracker: PathBuf,
    strength_recovered: PathBuf,
    strength_score: PathBuf,
}

impl TableStore {
    pub fn new(
        program: impl Into<PathBuf>,
        cracker: impl Into<PathBuf>,
        strength_recovered: impl Into<PathBuf>,
        strength_score: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            cracker: cracker.into(),
            strength_recovered: strength_recovered.into(),
            strength_score: strength_score.into(),
        }
    }

    pub fn path(&self, kind: TableKind) -> &Path {
        match kind {
            TableKind::Program => &self.program,
            TableKind::Cracker => &self.cracker,
            TableKind::StrengthRecovered => &self.strength_recovered,
            TableKind::StrengthScore => &self.strength_score,
        }
    }

    /// Appends `row`, writing the table header first when the file is
    /// missing or empty.
    pub fn append_row(&self, kind: TableKind, row: &[String]) -> Result<()> {
        append_with_header(self.path(kind), kind.header(), row)
    }

    pub fn append_rows(&self, kind: TableKind, rows: &[Vec<String>]) -> Result<()> {
        for row in rows {
            self.append_row(kind, row)?;
        }
        Ok(())
    }

    pub fn row_exists(&self, kind: TableKind, column: &str, value: &str) -> Result<bool> {
        self.row_exists_composite(kind, |row| row.get(column) == Some(value))
    }

    /// Linear scan; true on the first row satisfying `predicate`.
    pub fn row_exists_composite<F>(&self, kind: TableKind, predicate: F) -> Result<bool>
    where
        F: Fn(&RowView<'_>) -> bool,
    {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(false);
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening table {}", path.display()))?;
        let headers = reader.headers()?.clone();
        for record in reader.records() {
            let record = record.with_context(|| format!("reading table {}", path.display()))?;
            let view = RowView {
                headers: &headers,
                record: &record,
            };
            if predicate(&view) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn program_row_exists(&self, rule_file: &str, wordlist: &str) -> Result<bool> {
        self.row_exists_composite(TableKind::Program, |row| {
            row.get("rule_file") == Some(rule_file) && row.get("wordlist") == Some(wordlist)
        })
    }

    pub fn cracker_row_exists(
        &self,
        rule_file: &str,
        rule_size: u64,
        attack: &str,
        target: &str,
    ) -> Result<bool> {
        let rule_size = rule_size.to_string();
        self.row_exists_composite(TableKind::Cracker, |row| {
            row.get("rule_file") == Some(rule_file)
                && row.get("rule_size") == Some(rule_size.as_str())
                && row.get("attack") == Some(attack)
                && row.get("target") == Some(target)
        })
    }

    pub fn file_row_exists(&self, kind: TableKind, file_name: &str) -> Result<bool> {
        self.row_exists(kind, "file_name", file_name)
    }
}

fn append_with_header(path: &Path, header: &[&str], row: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let is_empty = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening table {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    if is_empty {
        writer.write_record(header)?;
    }
    writer.write_record(row)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &Path) -> TableStore {
        TableStore::new(
            dir.join("program_stats.csv"),
            dir.join("hashcat_stats.csv"),
            dir.join("zxcvbn_recovered_stats.csv"),
            dir.join("zxcvbn_score_stats.csv"),
        )
    }

    fn cracker_row(rule_size: u64) -> CrackerRow {
        CrackerRow {
            rule_file: "rules/a, b.rule".to_string(),
            rule_size,
            attack: "attack.txt".to_string(),
            attack_size: 10,
            target: "target.txt".to_string(),
            progress: Some("500".to_string()),
            recovered: None,
        }
    }

    #[test]
    fn header_written_once() {
        let dir = TempDir::new().unwrap();
        let tables = store(dir.path());
        tables
            .append_row(TableKind::Cracker, &cracker_row(10).to_record())
            .unwrap();
        tables
            .append_row(TableKind::Cracker, &cracker_row(20).to_record())
            .unwrap();

        let content = fs::read_to_string(tables.path(TableKind::Cracker)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "rule_file,rule_size,attack,attack_size,target,progress,recovered"
        );
        assert_eq!(lines[1], "\"rules/a, b.rule\",10,attack.txt,10,target.txt,500,");
    }

    #[test]
    fn header_written_into_empty_existing_file() {
        let dir = TempDir::new().unwrap();
        let tables = store(dir.path());
        fs::write(tables.path(TableKind::Program), "").unwrap();
        let row = ProgramRow {
            program: "pack".to_string(),
            run_index: 0,
            rule_file: "rules/pack_rockyou_0.rule".to_string(),
            wordlist: "wl/rockyou.txt".to_string(),
            size: 1000,
            time: 1.5,
            memory: 12.25,
            cpu: 97.0,
            rules: 42,
        };
        tables.append_row(TableKind::Program, &row.to_record()).unwrap();
        let content = fs::read_to_string(tables.path(TableKind::Program)).unwrap();
        assert!(content.starts_with("program,run_index,rule_file"));
        assert!(tables
            .program_row_exists("rules/pack_rockyou_0.rule", "wl/rockyou.txt")
            .unwrap());
        assert!(!tables
            .program_row_exists("rules/pack_rockyou_0.rule", "wl/other.txt")
            .unwrap());
    }

    #[test]
    fn composite_key_matches_all_columns() {
        let dir = TempDir::new().unwrap();
        let tables = store(dir.path());
        assert!(!tables
            .cracker_row_exists("rules/a, b.rule", 10, "attack.txt", "target.txt")
            .unwrap());

        tables
            .append_row(TableKind::Cracker, &cracker_row(10).to_record())
            .unwrap();
        assert!(tables
            .cracker_row_exists("rules/a, b.rule", 10, "attack.txt", "target.txt")
            .unwrap());
        assert!(!tables
            .cracker_row_exists("rules/a, b.rule", 20, "attack.txt", "target.txt")
            .unwrap());
        assert!(!tables
            .cracker_row_exists("rules/a, b.rule", 10, "attack.txt", "other.txt")
            .unwrap());
    }

    #[test]
    fn single_column_lookup() {
        let dir = TempDir::new().unwrap();
        let tables = store(dir.path());
        let hist = [("3.5".to_string(), 2u64)].into_iter().collect();
        let rows = StrengthRecoveredRows {
            file_name: "rules/a.rule",
            recovered: "50.00",
            guesses_log10: &hist,
        };
        tables
            .append_rows(TableKind::StrengthRecovered, &rows.to_records())
            .unwrap();
        assert!(tables
            .file_row_exists(TableKind::StrengthRecovered, "rules/a.rule")
            .unwrap());
        assert!(!tables
            .file_row_exists(TableKind::StrengthScore, "rules/a.rule")
            .unwrap());
    }
}
