// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sweep configuration loaded from YAML.
//!
//! Every section is optional. Keys this crate does not use (report file
//! names and the like) are ignored so one config file can serve several
//! tools.

use crate::runner::RULEGEN_STOP_MARKER;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub programs: Vec<ProgramConfig>,
    pub general: GeneralConfig,
    pub stats: StatsConfig,
    pub input: InputConfig,
    pub cracker: CrackerConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("parsing yaml config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stats.program_stats_enabled() && self.general.rules_file.is_empty() {
            bail!("general.rules_file must be set when program statistics are enabled");
        }
        for program in &self.programs {
            if program.program.trim().is_empty() {
                bail!("every entry in programs needs a non-empty 'program' name");
            }
        }
        Ok(())
    }
}

/// One rule-generation program; each entry of `args` is a separate run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub program: String,
    #[serde(default)]
    pub run: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_marker: Option<String>,
}

impl ProgramConfig {
    /// `run args` with `<wordlist>` and `<rules>` filled in.
    pub fn command(&self, args: &str, wordlist: &str, rules: &str) -> String {
        let args = args.replace("<wordlist>", wordlist).replace("<rules>", rules);
        if args.is_empty() {
            self.run.clone()
        } else {
            format!("{} {}", self.run, args)
        }
    }

    /// Output marker after which the program may be stopped early.
    pub fn stop_marker(&self) -> Option<&str> {
        match &self.stop_marker {
            Some(marker) if !marker.is_empty() => Some(marker),
            Some(_) => None,
            None if self.run.contains("rulegen.py") => Some(RULEGEN_STOP_MARKER),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub wordlist: String,
    pub attack: String,
    pub target: String,
    /// Rule file name template with `<program>`, `<wordlist>` and `<argsN>`
    pub rules_file: String,
    pub hashcat_folder: String,
    pub stats_folder: String,
    pub temp_folder: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            wordlist: String::new(),
            attack: String::new(),
            target: String::new(),
            rules_file: String::new(),
            hashcat_folder: String::new(),
            stats_folder: "results".to_string(),
            temp_folder: "temp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub time_passwords: bool,
    pub memory_passwords: bool,
    pub cpu_passwords: bool,
    pub rules_passwords: bool,
    pub recovered_guesses: bool,
    pub zxcvbn_recovered: bool,
    pub zxcvbn_score: bool,

    pub program_csv_file: String,
    pub hashcat_csv_file: String,
    pub zxcvbn_recovered_csv_file: String,
    pub zxcvbn_score_csv_file: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            time_passwords: false,
            memory_passwords: false,
            cpu_passwords: false,
            rules_passwords: false,
            recovered_guesses: false,
            zxcvbn_recovered: false,
            zxcvbn_score: false,
            program_csv_file: "program_stats.csv".to_string(),
            hashcat_csv_file: "hashcat_stats.csv".to_string(),
            zxcvbn_recovered_csv_file: "zxcvbn_recovered_stats.csv".to_string(),
            zxcvbn_score_csv_file: "zxcvbn_score_stats.csv".to_string(),
        }
    }
}

impl StatsConfig {
    pub fn program_stats_enabled(&self) -> bool {
        self.time_passwords || self.memory_passwords || self.cpu_passwords || self.rules_passwords
    }

    pub fn strength_enabled(&self) -> bool {
        self.zxcvbn_recovered || self.zxcvbn_score
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Wordlist sample sizes; 0 is the whole wordlist
    pub wordlist_size: Vec<u64>,
    /// Rule file prefixes; 0 is the whole rule file
    pub rules_size: Vec<u64>,
    /// Fixes the wordlist sampling when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrackerConfig {
    /// Template with `<target>`, `<attack>` and `<rules>`
    pub command: String,
    /// Appended to full-size runs; `<outfile>` is the recovered-password file
    pub outfile_args: String,
    /// Exit codes treated as a finished run (hashcat uses 1 for "exhausted")
    pub success_codes: Vec<i32>,
}

impl Default for CrackerConfig {
    fn default() -> Self {
        Self {
            command: "hashcat -a 0 -m 99999 <target> <attack> -r <rules> --potfile-disable"
                .to_string(),
            outfile_args: "-o <outfile> --outfile-format=1".to_string(),
            success_codes: vec![0, 1],
        }
    }
}

impl CrackerConfig {
    pub fn command(
        &self,
        target: &str,
        attack: &str,
        rules: &str,
        outfile: Option<&str>,
    ) -> String {
        let base = self
            .command
            .replace("<target>", target)
            .replace("<attack>", attack)
            .replace("<rules>", rules);
        match outfile {
            Some(outfile) if !self.outfile_args.is_empty() => {
                format!("{} {}", base, self.outfile_args.replace("<outfile>", outfile))
            }
            _ => base,
        }
    }

    pub fn is_success(&self, code: i32) -> bool {
        self.success_codes.contains(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_default_when_missing() {
        let config = Config::from_yaml("general:\n  wordlist: wl/rockyou.txt\n").unwrap();
        assert_eq!(config.general.wordlist, "wl/rockyou.txt");
        assert_eq!(config.general.stats_folder, "results");
        assert_eq!(config.stats.hashcat_csv_file, "hashcat_stats.csv");
        assert!(config.programs.is_empty());
        assert_eq!(config.cracker.success_codes, vec![0, 1]);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let yaml = "stats:\n  recovered_guesses: true\n  recovered_guesses_file: g.tex\n  analyze_rules: true\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.stats.recovered_guesses);
    }

    #[test]
    fn program_stats_require_rules_template() {
        let err = Config::from_yaml("stats:\n  time_passwords: true\n").unwrap_err();
        assert!(err.to_string().contains("rules_file"));

        let ok = Config::from_yaml(
            "general:\n  rules_file: rules/<program>_<wordlist>_<argsN>.rule\nstats:\n  time_passwords: true\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn negative_sizes_are_rejected() {
        assert!(Config::from_yaml("input:\n  wordlist_size: [100, -1]\n").is_err());
    }

    #[test]
    fn program_command_substitution() {
        let program = ProgramConfig {
            program: "pack".to_string(),
            run: "python3 rulegen.py".to_string(),
            args: vec![],
            stop_marker: None,
        };
        assert_eq!(
            program.command("<wordlist> --basename <rules>", "wl/a.txt", "rules/a.rule"),
            "python3 rulegen.py wl/a.txt --basename rules/a.rule"
        );
        assert_eq!(program.stop_marker(), Some(RULEGEN_STOP_MARKER));

        let quiet = ProgramConfig {
            stop_marker: Some(String::new()),
            ..program
        };
        assert_eq!(quiet.stop_marker(), None);
    }

    #[test]
    fn outfile_args_only_for_full_runs() {
        let cracker = CrackerConfig::default();
        assert_eq!(
            cracker.command("t.txt", "a.txt", "r.rule", None),
            "hashcat -a 0 -m 99999 t.txt a.txt -r r.rule --potfile-disable"
        );
        assert!(cracker
            .command("t.txt", "a.txt", "r.rule", Some("recovered.potfile"))
            .ends_with("--potfile-disable -o recovered.potfile --outfile-format=1"));
        assert!(cracker.is_success(1));
        assert!(!cracker.is_success(255));
    }
}
