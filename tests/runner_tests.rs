// SPDX-License-Identifier: PMPL-1.0-or-later

//! Process runner and `measure` subcommand behaviour

use pwdre::runner::{measure_in_subprocess, MeasureRequest, ProcessRunner, RunError};
use pwdre::RunState;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn measure_exe() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_pwdre"))
}

#[test]
fn test_sleeping_child_is_timed_and_idle() {
    let dir = TempDir::new().unwrap();
    let outcome = ProcessRunner::new(dir.path())
        .run("sleep 1", None)
        .expect("sleep should succeed");
    assert_eq!(outcome.state, RunState::Completed);
    assert!(
        outcome.stats.elapsed_secs >= 0.9 && outcome.stats.elapsed_secs < 3.0,
        "elapsed {}",
        outcome.stats.elapsed_secs
    );
    assert!(outcome.stats.avg_cpu < 25.0, "cpu {}", outcome.stats.avg_cpu);
}

#[test]
fn test_busy_child_shows_cpu_load() {
    let dir = TempDir::new().unwrap();
    let outcome = ProcessRunner::new(dir.path())
        .run("i=0; while [ $i -lt 1000000 ]; do i=$((i+1)); done", None)
        .expect("busy loop should succeed");
    assert!(outcome.stats.avg_cpu > 10.0, "cpu {}", outcome.stats.avg_cpu);
}

#[test]
fn test_busy_grandchild_is_counted() {
    let dir = TempDir::new().unwrap();
    let outcome = ProcessRunner::new(dir.path())
        .run("sh -c 'i=0; while [ $i -lt 1000000 ]; do i=$((i+1)); done'; true", None)
        .expect("nested busy loop should succeed");
    assert!(outcome.stats.avg_cpu > 10.0, "cpu {}", outcome.stats.avg_cpu);
}

#[test]
fn test_early_stop_returns_promptly() {
    let dir = TempDir::new().unwrap();
    let script = "i=0; while [ $i -lt 50 ]; do echo \"word $i\"; i=$((i+1)); done; \
                  echo '[*] Top 10 words'; while true; do sleep 1; done";
    let stop = |line: &str| line.contains("[*] Top 10 words");
    let started = Instant::now();
    let outcome = ProcessRunner::new(dir.path())
        .with_grace_period(Duration::from_secs(1))
        .run(script, Some(&stop))
        .expect("early stop is not a failure");
    assert_eq!(outcome.state, RunState::Terminated);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.output.contains("word 49"));
}

/// Running or stopped; zombies and reaped pids count as gone.
fn is_alive(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X') | None)
}

#[test]
fn test_background_grandchild_dies_with_the_run() {
    let dir = TempDir::new().unwrap();
    let started = Instant::now();
    let outcome = ProcessRunner::new(dir.path())
        .run("sleep 30 & echo $!", None)
        .expect("the shell itself exits cleanly");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome.state, RunState::Completed);

    let pid: u32 = outcome.output.trim().parse().expect("background pid");
    let deadline = Instant::now() + Duration::from_secs(5);
    while is_alive(pid) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(!is_alive(pid), "background sleep {pid} outlived the run");
}

#[test]
fn test_measure_subcommand_reports_stats() {
    let dir = TempDir::new().unwrap();
    let request = MeasureRequest {
        command: "sleep 0.5",
        workdir: dir.path(),
        stop_marker: None,
    };
    let stats = measure_in_subprocess(measure_exe(), &request).expect("measure should succeed");
    assert!(stats.elapsed_secs >= 0.4, "elapsed {}", stats.elapsed_secs);
    assert!(stats.peak_memory_mb > 0.0);
}

#[test]
fn test_measure_subcommand_forwards_failure() {
    let dir = TempDir::new().unwrap();
    let request = MeasureRequest {
        command: "echo oops; exit 4",
        workdir: dir.path(),
        stop_marker: None,
    };
    let err = measure_in_subprocess(measure_exe(), &request).expect_err("exit 4 is a failure");
    match &err {
        RunError::NonZeroExit { code, output, .. } => {
            assert_eq!(*code, 4);
            assert_eq!(output.trim(), "oops");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let message = err.ledger_message();
    assert_eq!(message, "Returned non-zero exit status 4.\nOutput:\noops");
}

#[test]
fn test_measure_subcommand_honours_stop_marker() {
    let dir = TempDir::new().unwrap();
    let request = MeasureRequest {
        command: "echo ready; echo DONE; exec sleep 60",
        workdir: dir.path(),
        stop_marker: Some("DONE"),
    };
    let started = Instant::now();
    measure_in_subprocess(measure_exe(), &request).expect("stopped run is still measured");
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[test]
fn test_measure_binary_output_format() {
    let dir = TempDir::new().unwrap();
    let output = std::process::Command::new(measure_exe())
        .args(["measure", "--workdir"])
        .arg(dir.path())
        .args(["--", "true"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let line = String::from_utf8(output.stdout).unwrap();
    assert!(!line.ends_with('\n'));
    let fields: Vec<&str> = line.split(',').collect();
    assert_eq!(fields.len(), 3);
    for field in fields {
        let (_, decimals) = field.split_once('.').expect("two decimals");
        assert_eq!(decimals.len(), 2);
    }
}
