// SPDX-License-Identifier: PMPL-1.0-or-later

//! Everything one sweep needs, built once at startup and passed down.

use crate::config::Config;
use crate::files;
use crate::ledger::{Ledger, DEFAULT_LEDGER_FILE};
use crate::strength::{StrengthScorer, ZxcvbnScorer};
use crate::table::TableStore;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cracker outfile, relative to the sweep root
pub const RECOVERED_FILE: &str = "recovered.potfile";

/// How the command line asked for the sweep to be set up
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub config: PathBuf,
    /// Directory commands run in and relative paths resolve against
    pub root: Option<PathBuf>,
    pub ledger_file: PathBuf,
    pub use_ledger: bool,
    /// Binary providing the `measure` subcommand
    pub measure_exe: PathBuf,
}

impl SweepOptions {
    pub fn new(config: impl Into<PathBuf>, measure_exe: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
            root: None,
            ledger_file: PathBuf::from(DEFAULT_LEDGER_FILE),
            use_ledger: true,
            measure_exe: measure_exe.into(),
        }
    }

    /// Sweep root: the explicit one, or the current directory.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("resolving current directory"),
        }
    }

    pub fn ledger_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_root()?.join(&self.ledger_file))
    }
}

pub struct SweepContext {
    pub root: PathBuf,
    pub config: Config,
    /// `None` when the ledger is disabled
    pub ledger: Option<Ledger>,
    pub tables: TableStore,
    pub wordlists: Vec<PathBuf>,
    pub attacks: Vec<PathBuf>,
    pub targets: Vec<PathBuf>,
    /// Temp folder as commands see it (relative to `root`)
    pub temp_dir: PathBuf,
    pub measure_exe: PathBuf,
    pub scorer: Box<dyn StrengthScorer>,
}

impl SweepContext {
    pub fn from_options(options: &SweepOptions) -> Result<Self> {
        let config = Config::load(&options.config)?;
        let root = options.resolve_root()?;
        let ledger = options
            .use_ledger
            .then(|| Ledger::new(root.join(&options.ledger_file)));
        Self::new(root, config, ledger, options.measure_exe.clone())
    }

    /// Discovers the configured inputs under `root`. Missing inputs are fatal.
    pub fn new(
        root: impl Into<PathBuf>,
        config: Config,
        ledger: Option<Ledger>,
        measure_exe: impl Into<PathBuf>,
    ) -> Result<Self> {
        let root = root.into();
        let general = &config.general;
        let wordlists = files::get_files(&root, &general.wordlist).context("wordlist input")?;
        let attacks = files::get_files(&root, &general.attack).context("attack input")?;
        let targets = files::get_files(&root, &general.target).context("target input")?;
        debug!(
            "inputs: {} wordlists, {} attacks, {} targets",
            wordlists.len(),
            attacks.len(),
            targets.len()
        );

        let stats_dir = root.join(&general.stats_folder);
        let stats = &config.stats;
        let tables = TableStore::new(
            stats_dir.join(&stats.program_csv_file),
            stats_dir.join(&stats.hashcat_csv_file),
            stats_dir.join(&stats.zxcvbn_recovered_csv_file),
            stats_dir.join(&stats.zxcvbn_score_csv_file),
        );
        let temp_dir = PathBuf::from(&general.temp_folder);

        Ok(Self {
            root,
            config,
            ledger,
            tables,
            wordlists,
            attacks,
            targets,
            temp_dir,
            measure_exe: measure_exe.into(),
            scorer: Box::new(ZxcvbnScorer),
        })
    }

    pub fn with_scorer(mut self, scorer: Box<dyn StrengthScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub fn recovered_file(&self) -> PathBuf {
        self.resolve(RECOVERED_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discovers_inputs_and_resolves_tables() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("targets")).unwrap();
        fs::write(dir.path().join("targets/t1.txt"), "a\n").unwrap();
        fs::write(dir.path().join("attack.txt"), "a\n").unwrap();
        let config = Config::from_yaml(
            "general:\n  attack: attack.txt\n  target: targets\n  stats_folder: out\n",
        )
        .unwrap();

        let ctx = SweepContext::new(dir.path(), config, None, "pwdre").unwrap();
        assert!(ctx.wordlists.is_empty());
        assert_eq!(ctx.attacks, vec![PathBuf::from("attack.txt")]);
        assert_eq!(ctx.targets, vec![PathBuf::from("targets/t1.txt")]);
        assert_eq!(
            ctx.tables.path(crate::table::TableKind::Cracker),
            dir.path().join("out/hashcat_stats.csv")
        );
        assert_eq!(ctx.recovered_file(), dir.path().join(RECOVERED_FILE));
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_yaml("general:\n  target: nope.txt\n").unwrap();
        let err = SweepContext::new(dir.path(), config, None, "pwdre")
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("nope.txt"));
    }
}
