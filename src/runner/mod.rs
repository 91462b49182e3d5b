// SPDX-License-Identifier: PMPL-1.0-or-later

//! Process runner: launch a shell command, watch it, measure it.
//!
//! Standard output and standard error share one pipe. A reader thread turns
//! the pipe into lines on a channel; the monitoring loop alternates between a
//! bounded wait on that channel (evaluating the early-stop predicate) and a
//! CPU sample window over the process subtree, until the child exits or is
//! terminated. The child leads its own process group, so background
//! processes it leaves behind are signalled with it. The child is owned by a
//! guard that kills and reaps it on any exit path, including unwinding.

mod error;
mod measure;
mod sampler;

pub use error::RunError;
pub use measure::{failure_report, measure_in_subprocess, run_measure_command, MeasureRequest};
pub use sampler::CpuSampler;

use crate::types::{RunState, RunStats};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Marker printed by PACK's rulegen.py once its useful output is complete
pub const RULEGEN_STOP_MARKER: &str = "[*] Top 10 words";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_millis(100);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a run that did not fail
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: RunStats,
    pub exit_code: Option<i32>,
    pub output: String,
    pub state: RunState,
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    workdir: PathBuf,
    poll_interval: Duration,
    sample_window: Duration,
    grace_period: Duration,
}

impl ProcessRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            sample_window: DEFAULT_SAMPLE_WINDOW,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Runs `command` through `sh -c` in the working directory.
    ///
    /// A non-zero exit is returned as [`RunError::NonZeroExit`] unless the
    /// early-stop predicate fired, in which case the run ends in
    /// [`RunState::Terminated`] whatever the exit status.
    pub fn run(
        &self,
        command: &str,
        early_stop: Option<&dyn Fn(&str) -> bool>,
    ) -> Result<RunOutcome, RunError> {
        let (read_end, write_end) = pipe()?;
        let start = Instant::now();
        let child = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(command)
                .current_dir(&self.workdir)
                .stdin(Stdio::null())
                .process_group(0)
                .stdout(Stdio::from(write_end.try_clone()?))
                .stderr(Stdio::from(write_end));
            // `cmd` owns our copies of the write end; it must drop before we
            // can observe EOF.
            cmd.spawn().map_err(|source| RunError::Spawn {
                command: command.to_string(),
                source,
            })?
        };
        debug!("spawned pid {} for '{}'", child.id(), command);

        let mut guard = ChildGuard::new(child);
        let (lines, reader) = spawn_reader(read_end);
        let mut sampler = CpuSampler::new(guard.pid());
        let mut cpu_samples: Vec<f64> = Vec::new();
        let mut output = String::new();
        let mut stopped = false;

        let status = loop {
            if let Some(status) = guard.try_wait()? {
                break status;
            }

            match lines.recv_timeout(self.poll_interval) {
                Ok(line) => {
                    stopped = consume_line(&line, &mut output, early_stop);
                    while !stopped {
                        match lines.try_recv() {
                            Ok(line) => stopped = consume_line(&line, &mut output, early_stop),
                            Err(_) => break,
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }

            if stopped {
                debug!("early-stop predicate fired for '{}'", command);
                guard.set_descendants(sampler.descendants());
                break guard.terminate(self.grace_period)?;
            }

            cpu_samples.extend(sampler.sample(self.sample_window));
        };
        let elapsed = start.elapsed();

        // Output written between the last poll and exit is still in flight,
        // and may carry the stop marker.
        let mut closed = drain(&lines, &mut output, early_stop, &mut stopped);
        if !closed {
            warn!("output pipe of '{}' still open after exit; killing leftovers", command);
            guard.kill_leftovers();
            closed = drain(&lines, &mut output, early_stop, &mut stopped);
        }
        guard.kill_leftovers();
        if closed {
            let _ = reader.join();
        } else {
            warn!("output pipe of '{}' is held outside its process group", command);
        }

        let stats = RunStats {
            elapsed_secs: elapsed.as_secs_f64(),
            peak_memory_mb: children_peak_rss_mb(),
            avg_cpu: mean(&cpu_samples),
        };
        let exit_code = exit_code(&status);

        if stopped {
            return Ok(RunOutcome {
                stats,
                exit_code: Some(exit_code),
                output,
                state: RunState::Terminated,
            });
        }
        if !status.success() {
            return Err(RunError::NonZeroExit {
                command: command.to_string(),
                code: exit_code,
                output,
            });
        }
        Ok(RunOutcome {
            stats,
            exit_code: Some(exit_code),
            output,
            state: RunState::Completed,
        })
    }
}

/// Owns the child for the duration of one run.
struct ChildGuard {
    child: Child,
    reaped: bool,
    descendants: Vec<u32>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
            descendants: Vec::new(),
        }
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn set_descendants(&mut self, pids: Vec<u32>) {
        self.descendants = pids;
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// SIGTERM to the child's process group and its known descendants,
    /// escalating to SIGKILL once the grace period runs out.
    fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        signal(&self.descendants, libc::SIGTERM);
        signal_group(self.pid(), libc::SIGTERM);

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = self.try_wait()? {
                self.kill_leftovers();
                return Ok(status);
            }
            thread::sleep(Duration::from_millis(20));
        }

        warn!("pid {} ignored SIGTERM, sending SIGKILL", self.pid());
        self.kill_leftovers();
        let _ = self.child.kill();
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    /// SIGKILL to whatever is left of the process group, including members
    /// reparented away from the child, and to descendants that left it.
    fn kill_leftovers(&self) {
        signal(&self.descendants, libc::SIGKILL);
        signal_group(self.pid(), libc::SIGKILL);
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        self.kill_leftovers();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ESRCH for already-exited processes is expected and ignored.
fn signal(pids: &[u32], sig: libc::c_int) {
    for pid in pids {
        let Ok(pid) = libc::pid_t::try_from(*pid) else {
            continue;
        };
        unsafe {
            libc::kill(pid, sig);
        }
    }
}

fn signal_group(pgid: u32, sig: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    unsafe {
        libc::killpg(pgid, sig);
    }
}

/// Anonymous pipe with both ends close-on-exec.
fn pipe() -> io::Result<(File, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    #[cfg(target_os = "linux")]
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    #[cfg(not(target_os = "linux"))]
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    #[cfg(not(target_os = "linux"))]
    {
        use std::os::fd::AsRawFd;
        for fd in [&read, &write] {
            unsafe {
                libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
    }
    Ok((File::from(read), write))
}

fn spawn_reader(read_end: File) -> (Receiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut reader = BufReader::new(read_end);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    (rx, handle)
}

/// Appends `line` to the captured output; true if the predicate fires on it.
fn consume_line(
    line: &str,
    output: &mut String,
    early_stop: Option<&dyn Fn(&str) -> bool>,
) -> bool {
    output.push_str(line);
    early_stop.is_some_and(|stop| stop(line.trim_end_matches(['\r', '\n'])))
}

/// Collects remaining lines until the writer side closes, setting `stopped`
/// if the predicate fires on one. False if the pipe stayed open past the
/// drain timeout.
fn drain(
    lines: &Receiver<String>,
    output: &mut String,
    early_stop: Option<&dyn Fn(&str) -> bool>,
    stopped: &mut bool,
) -> bool {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match lines.recv_timeout(remaining) {
            Ok(line) => {
                if consume_line(&line, output, early_stop) {
                    *stopped = true;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}

fn exit_code(status: &ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Largest resident set among all reaped children of this process, in MB.
fn children_peak_rss_mb() -> f64 {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, &mut usage) } != 0 {
        return 0.0;
    }
    let maxrss = usage.ru_maxrss as f64;
    // Linux reports kilobytes, macOS bytes.
    if cfg!(target_os = "macos") {
        maxrss / (1024.0 * 1024.0)
    } else {
        maxrss / 1024.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner(dir: &TempDir) -> ProcessRunner {
        ProcessRunner::new(dir.path())
    }

    #[test]
    fn captures_interleaved_stdout_and_stderr() {
        let dir = TempDir::new().unwrap();
        let outcome = runner(&dir)
            .run("echo one; echo two >&2; echo three", None)
            .unwrap();
        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.output, "one\ntwo\nthree\n");
    }

    #[test]
    fn runs_in_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here\n").unwrap();
        let outcome = runner(&dir).run("cat marker.txt", None).unwrap();
        assert_eq!(outcome.output, "here\n");
    }

    #[test]
    fn non_zero_exit_is_typed_failure() {
        let dir = TempDir::new().unwrap();
        let err = runner(&dir).run("echo failing; exit 3", None).unwrap_err();
        match err {
            RunError::NonZeroExit { code, output, .. } => {
                assert_eq!(code, 3);
                assert_eq!(output, "failing\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_working_directory_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(dir.path().join("nope"));
        assert!(matches!(
            runner.run("true", None),
            Err(RunError::Spawn { .. })
        ));
    }

    #[test]
    fn instant_exit_has_zero_cpu() {
        let dir = TempDir::new().unwrap();
        let outcome = runner(&dir).run("exit 0", None).unwrap();
        assert!(outcome.stats.avg_cpu >= 0.0);
        assert!(outcome.stats.elapsed_secs < 2.0);
    }

    #[test]
    fn early_stop_terminates_long_running_child() {
        let dir = TempDir::new().unwrap();
        let script = "for i in 1 2 3 4 5; do echo \"line $i\"; done; \
                      echo '[*] Top 10 words'; exec sleep 60";
        let stop = |line: &str| line.contains(RULEGEN_STOP_MARKER);
        let started = Instant::now();
        let outcome = runner(&dir).run(script, Some(&stop)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(15));
        assert_eq!(outcome.state, RunState::Terminated);
        assert!(outcome.output.contains("line 5"));
        assert!(outcome.output.contains(RULEGEN_STOP_MARKER));
    }

    #[test]
    fn early_stop_ignores_exit_status() {
        let dir = TempDir::new().unwrap();
        let stop = |line: &str| line == "done";
        let outcome = runner(&dir)
            .run("echo done; sleep 1; exit 7", Some(&stop))
            .unwrap();
        assert_eq!(outcome.state, RunState::Terminated);
    }

    #[test]
    fn stop_marker_seen_after_exit_still_counts() {
        let dir = TempDir::new().unwrap();
        let stop = |line: &str| line.contains(RULEGEN_STOP_MARKER);
        let outcome = runner(&dir)
            .run("echo '[*] Top 10 words'; exit 3", Some(&stop))
            .expect("a run that printed the marker is not a failure");
        assert_eq!(outcome.state, RunState::Terminated);
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[test]
    fn large_output_does_not_block_child() {
        let dir = TempDir::new().unwrap();
        let outcome = runner(&dir)
            .run("i=0; while [ $i -lt 20000 ]; do echo \"row $i\"; i=$((i+1)); done", None)
            .unwrap();
        assert_eq!(outcome.output.lines().count(), 20000);
    }
}
