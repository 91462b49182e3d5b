// SPDX-License-Identifier: PMPL-1.0-or-later

//! CPU sampling over a process subtree, read from `/proc/<pid>/stat`.
//!
//! The subtree is the root's descendants by parent link plus every member of
//! the root's process group, so background processes reparented after their
//! parent exited are still counted.
//!
//! Utilisation is the delta of `utime + stime` between two snapshots divided
//! by the wall time between them, so 100.0 means one fully busy core.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct ProcStat {
    ppid: u32,
    pgrp: u32,
    ticks: u64,
}

pub struct CpuSampler {
    root: u32,
    clock_ticks: f64,
    prev: HashMap<u32, ProcStat>,
    prev_at: Instant,
}

impl CpuSampler {
    /// Takes the baseline snapshot; the first sample measures from here.
    pub fn new(root_pid: u32) -> Self {
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        Self {
            root: root_pid,
            clock_ticks: if clock_ticks > 0 { clock_ticks as f64 } else { 100.0 },
            prev: snapshot(),
            prev_at: Instant::now(),
        }
    }

    /// Waits `window`, then returns one utilisation percentage per live
    /// process in the subtree (root first), measured since the previous
    /// snapshot.
    pub fn sample(&mut self, window: Duration) -> Vec<f64> {
        thread::sleep(window);
        let current = snapshot();
        let now = Instant::now();
        let elapsed = now.duration_since(self.prev_at).as_secs_f64();

        let samples = if elapsed > 0.0 {
            subtree(&current, self.root)
                .into_iter()
                .filter_map(|pid| {
                    let stat = current.get(&pid)?;
                    let before = self.prev.get(&pid).map(|p| p.ticks).unwrap_or(0);
                    let delta = stat.ticks.saturating_sub(before) as f64;
                    Some(delta / self.clock_ticks / elapsed * 100.0)
                })
                .collect()
        } else {
            Vec::new()
        };

        self.prev = current;
        self.prev_at = now;
        samples
    }

    /// Live descendants of the root, excluding the root itself.
    pub fn descendants(&self) -> Vec<u32> {
        subtree(&snapshot(), self.root)
            .into_iter()
            .filter(|pid| *pid != self.root)
            .collect()
    }
}

fn snapshot() -> HashMap<u32, ProcStat> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return HashMap::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter_map(|pid| {
            let content = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
            parse_stat(&content).map(|stat| (pid, stat))
        })
        .collect()
}

/// Format: `pid (comm) state ppid ... utime stime ...`; comm may contain
/// spaces and parentheses, so fields are counted from the last ')'.
fn parse_stat(content: &str) -> Option<ProcStat> {
    let end = content.rfind(')')?;
    let fields: Vec<&str> = content.get(end + 1..)?.split_whitespace().collect();
    if fields.len() < 13 {
        return None;
    }
    let ppid = fields[1].parse().ok()?;
    let pgrp = fields[2].parse().ok()?;
    let utime: u64 = fields[11].parse().ok()?;
    let stime: u64 = fields[12].parse().ok()?;
    Some(ProcStat {
        ppid,
        pgrp,
        ticks: utime + stime,
    })
}

fn subtree(stats: &HashMap<u32, ProcStat>, root: u32) -> Vec<u32> {
    if !stats.contains_key(&root) {
        return Vec::new();
    }
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, stat) in stats {
        children.entry(stat.ppid).or_default().push(*pid);
    }
    let mut seen = HashSet::from([root]);
    let mut order = vec![root];
    let mut queue = VecDeque::from([root]);
    let mut group: Vec<u32> = stats
        .iter()
        .filter(|(pid, stat)| stat.pgrp == root && **pid != root)
        .map(|(pid, _)| *pid)
        .collect();
    group.sort_unstable();
    for pid in group {
        seen.insert(pid);
        order.push(pid);
        queue.push_back(pid);
    }
    while let Some(parent) = queue.pop_front() {
        for child in children.get(&parent).into_iter().flatten() {
            if seen.insert(*child) {
                order.push(*child);
                queue.push_back(*child);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stat_handles_parens_in_comm() {
        let line = "4242 (my (odd) prog) S 17 4242 4242 0 -1 4194560 100 0 0 0 25 7 0 0 20 0 1 0 1234 0 0";
        let stat = parse_stat(line).unwrap();
        assert_eq!(stat.ppid, 17);
        assert_eq!(stat.pgrp, 4242);
        assert_eq!(stat.ticks, 32);
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn subtree_walks_descendants_only() {
        let stats: HashMap<u32, ProcStat> = [(1, 0), (10, 1), (11, 10), (12, 11), (20, 1)]
            .into_iter()
            .map(|(pid, ppid)| (pid, ProcStat { ppid, pgrp: pid, ticks: 0 }))
            .collect();
        let mut tree = subtree(&stats, 10);
        tree.sort();
        assert_eq!(tree, vec![10, 11, 12]);
        assert!(subtree(&stats, 99).is_empty());
    }

    #[test]
    fn subtree_includes_reparented_group_members() {
        // 13 was started by 11 in group 10, then reparented to init; 14 is its child.
        let procs = [(1, 0, 1), (10, 1, 10), (13, 1, 10), (14, 13, 14), (20, 1, 20)];
        let stats: HashMap<u32, ProcStat> = procs
            .into_iter()
            .map(|(pid, ppid, pgrp)| (pid, ProcStat { ppid, pgrp, ticks: 0 }))
            .collect();
        let mut tree = subtree(&stats, 10);
        tree.sort();
        assert_eq!(tree, vec![10, 13, 14]);
    }

    #[test]
    fn missing_root_yields_no_samples() {
        // Far above any pid_max, so no such process exists.
        let mut sampler = CpuSampler::new(u32::MAX - 1);
        assert!(sampler.sample(Duration::from_millis(10)).is_empty());
        assert!(sampler.descendants().is_empty());
    }
}
