// SPDX-License-Identifier: PMPL-1.0-or-later

//! Typed rows for each observation table

use crate::ledger::Histogram;

/// One measured run of a rule-generation program
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRow {
    pub program: String,
    pub run_index: usize,
    pub rule_file: String,
    pub wordlist: String,
    pub size: u64,
    pub time: f64,
    pub memory: f64,
    pub cpu: f64,
    pub rules: u64,
}

impl ProgramRow {
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.program.clone(),
            self.run_index.to_string(),
            self.rule_file.clone(),
            self.wordlist.clone(),
            self.size.to_string(),
            format!("{:.2}", self.time),
            format!("{:.2}", self.memory),
            format!("{:.2}", self.cpu),
            self.rules.to_string(),
        ]
    }
}

/// One cracker attack of a (possibly truncated) rule file
#[derive(Debug, Clone, PartialEq)]
pub struct CrackerRow {
    pub rule_file: String,
    pub rule_size: u64,
    pub attack: String,
    pub attack_size: u64,
    pub target: String,
    pub progress: Option<String>,
    pub recovered: Option<String>,
}

impl CrackerRow {
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.rule_file.clone(),
            self.rule_size.to_string(),
            self.attack.clone(),
            self.attack_size.to_string(),
            self.target.clone(),
            self.progress.clone().unwrap_or_default(),
            self.recovered.clone().unwrap_or_default(),
        ]
    }
}

/// Guess-count histogram of one file, one table row per bucket
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthRecoveredRows<'a> {
    pub file_name: &'a str,
    pub recovered: &'a str,
    pub guesses_log10: &'a Histogram,
}

impl StrengthRecoveredRows<'_> {
    /// Rows ordered by numeric bucket value.
    pub fn to_records(&self) -> Vec<Vec<String>> {
        let mut buckets: Vec<(&String, &u64)> = self.guesses_log10.iter().collect();
        buckets.sort_by(|a, b| {
            let x = a.0.parse::<f64>().unwrap_or(f64::MAX);
            let y = b.0.parse::<f64>().unwrap_or(f64::MAX);
            x.total_cmp(&y)
        });
        buckets
            .into_iter()
            .map(|(bucket, count)| {
                vec![
                    self.file_name.to_string(),
                    self.recovered.to_string(),
                    bucket.clone(),
                    count.to_string(),
                ]
            })
            .collect()
    }
}

/// Score distribution (0..=4) of one file
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthScoreRow<'a> {
    pub file_name: &'a str,
    pub recovered: &'a str,
    pub score: &'a Histogram,
}

impl StrengthScoreRow<'_> {
    pub fn to_record(&self) -> Vec<String> {
        let mut record = vec![self.file_name.to_string(), self.recovered.to_string()];
        record.extend((0..5).map(|i| {
            self.score
                .get(&i.to_string())
                .copied()
                .unwrap_or(0)
                .to_string()
        }));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_buckets_sort_numerically() {
        let hist: Histogram = [("10.0", 1), ("3.5", 4), ("4.0", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let rows = StrengthRecoveredRows {
            file_name: "rules/a.rule",
            recovered: "12.50",
            guesses_log10: &hist,
        };
        let buckets: Vec<String> = rows.to_records().into_iter().map(|r| r[2].clone()).collect();
        assert_eq!(buckets, vec!["3.5", "4.0", "10.0"]);
    }

    #[test]
    fn score_row_fills_missing_scores() {
        let hist: Histogram = [("1".to_string(), 3), ("4".to_string(), 1)].into_iter().collect();
        let row = StrengthScoreRow {
            file_name: "t.txt",
            recovered: "100.0",
            score: &hist,
        };
        assert_eq!(row.to_record(), vec!["t.txt", "100.0", "0", "3", "0", "0", "1"]);
    }
}
