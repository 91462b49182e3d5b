// SPDX-License-Identifier: PMPL-1.0-or-later

//! Password-strength histograms.

use crate::ledger::Histogram;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// zxcvbn gets slow and meaningless past this length.
pub const MAX_PASSWORD_CHARS: usize = 72;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PasswordStrength {
    pub guesses_log10: f64,
    /// 0 (weakest) to 4
    pub score: u8,
}

pub trait StrengthScorer {
    /// `None` when the password cannot be scored.
    fn score(&self, password: &str) -> Option<PasswordStrength>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZxcvbnScorer;

impl StrengthScorer for ZxcvbnScorer {
    fn score(&self, password: &str) -> Option<PasswordStrength> {
        let entropy = zxcvbn::zxcvbn(password, &[]).ok()?;
        Some(PasswordStrength {
            guesses_log10: entropy.guesses_log10(),
            score: entropy.score(),
        })
    }
}

/// Histograms over one password file
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthStats {
    /// Bucket label (`"7.5"`) to count
    pub guesses_log10: Histogram,
    /// `"0"`..`"4"` to count, all five keys present
    pub score: Histogram,
}

impl Default for StrengthStats {
    fn default() -> Self {
        Self {
            guesses_log10: Histogram::new(),
            score: (0..5).map(|s| (s.to_string(), 0)).collect(),
        }
    }
}

impl StrengthStats {
    pub fn add(&mut self, strength: PasswordStrength) {
        *self
            .guesses_log10
            .entry(bucket(strength.guesses_log10))
            .or_insert(0) += 1;
        *self.score.entry(strength.score.to_string()).or_insert(0) += 1;
    }
}

/// Nearest half step, ties to even, as `"{:.1}"`.
pub fn bucket(guesses_log10: f64) -> String {
    format!("{:.1}", (guesses_log10 * 2.0).round_ties_even() / 2.0)
}

/// Scores every password in `path`. Blank lines and passwords over
/// [`MAX_PASSWORD_CHARS`] are skipped; a missing file yields empty stats.
pub fn analyze_file(path: &Path, scorer: &dyn StrengthScorer) -> Result<StrengthStats> {
    let mut stats = StrengthStats::default();
    if !path.exists() {
        return Ok(stats);
    }
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let content = String::from_utf8_lossy(&bytes);
    for line in content.lines() {
        let password = line.trim();
        if password.is_empty() || password.chars().count() > MAX_PASSWORD_CHARS {
            continue;
        }
        if let Some(strength) = scorer.score(password) {
            stats.add(strength);
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct LengthScorer;

    impl StrengthScorer for LengthScorer {
        fn score(&self, password: &str) -> Option<PasswordStrength> {
            let len = password.len();
            Some(PasswordStrength {
                guesses_log10: len as f64 * 0.6,
                score: (len / 4).min(4) as u8,
            })
        }
    }

    #[test]
    fn buckets_round_half_to_even() {
        assert_eq!(bucket(3.24), "3.0");
        assert_eq!(bucket(3.25), "3.0");
        assert_eq!(bucket(3.26), "3.5");
        assert_eq!(bucket(3.75), "4.0");
        assert_eq!(bucket(0.0), "0.0");
    }

    #[test]
    fn analyze_skips_blank_and_overlong() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recovered.txt");
        let long = "x".repeat(MAX_PASSWORD_CHARS + 1);
        fs::write(&path, format!("abc\n\n   \n{}\nabcdefgh\n", long)).unwrap();

        let stats = analyze_file(&path, &LengthScorer).unwrap();
        assert_eq!(stats.guesses_log10.values().sum::<u64>(), 2);
        assert_eq!(stats.guesses_log10.get("2.0"), Some(&1));
        assert_eq!(stats.guesses_log10.get("5.0"), Some(&1));
        assert_eq!(stats.score.get("0"), Some(&1));
        assert_eq!(stats.score.get("2"), Some(&1));
        assert_eq!(stats.score.get("4"), Some(&0));
    }

    #[test]
    fn missing_file_gives_empty_stats() {
        let dir = TempDir::new().unwrap();
        let stats = analyze_file(&dir.path().join("none"), &LengthScorer).unwrap();
        assert!(stats.guesses_log10.is_empty());
        assert_eq!(stats.score.len(), 5);
    }

    #[test]
    fn zxcvbn_orders_passwords_sensibly() {
        let weak = ZxcvbnScorer.score("password").unwrap();
        let strong = ZxcvbnScorer.score("correct-horse-battery-staple-91!").unwrap();
        assert!(weak.score <= 1);
        assert!(strong.guesses_log10 > weak.guesses_log10);
    }
}
