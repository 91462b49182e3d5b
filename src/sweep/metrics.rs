// SPDX-License-Identifier: PMPL-1.0-or-later

use regex::Regex;
use std::sync::OnceLock;

/// Figures pulled out of a cracker's status output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrackerMetrics {
    /// Candidates tried (`Progress.........: 1234/5678 ...`)
    pub progress: Option<String>,
    /// Percentage recovered (`Recovered........: 3/10 (30.00%) ...`)
    pub recovered: Option<String>,
}

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Progress\.+:\s(\d+)").expect("static regex"))
}

fn recovered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d+\.\d+)%\)").expect("static regex"))
}

/// Scans labelled lines; the last match of each kind wins and a missing
/// line leaves the metric unset.
pub fn extract(output: &str) -> CrackerMetrics {
    let mut metrics = CrackerMetrics::default();
    for line in output.lines() {
        if line.starts_with("Progress") {
            if let Some(caps) = progress_re().captures(line) {
                metrics.progress = Some(caps[1].to_string());
            }
        }
        if line.starts_with("Recovered") {
            if let Some(caps) = recovered_re().captures(line) {
                metrics.recovered = Some(caps[1].to_string());
            }
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_status_block_wins() {
        let output = "\
Session..........: hashcat
Progress.........: 1000/40000 (2.50%)
Recovered........: 1/10 (10.00%) Digests
Progress.........: 40000/40000 (100.00%)
Recovered........: 4/10 (40.00%) Digests (total), 4/10 (40.00%) Digests (new)
";
        let metrics = extract(output);
        assert_eq!(metrics.progress.as_deref(), Some("40000"));
        assert_eq!(metrics.recovered.as_deref(), Some("40.00"));
    }

    #[test]
    fn unlabelled_or_missing_lines_leave_metrics_unset() {
        let metrics = extract("  Progress.........: 5/5\nnothing (12.50%) here\n");
        assert_eq!(metrics, CrackerMetrics::default());
    }
}
