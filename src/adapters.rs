//! The three external collaborator interfaces (§6): workspace I/O, process
//! execution, and clock/environment. The pipeline depends only on these
//! traits; real filesystem/process implementations live here, in-memory
//! fakes live in [`crate::test_support`], adapted from the teacher's
//! `ProcessBuilder`/`util::fs` pattern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};

/// Result of a `workspace_io.read_file` call: CMake's `include()`/
/// `add_subdirectory()`/`find_*` flows all treat a missing file as an
/// ordinary, recoverable condition rather than an I/O error.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Found(Vec<u8>),
    NotFound,
}

/// Filesystem access required by `include()`, `add_subdirectory()`, and the
/// `find_*` command family.
pub trait WorkspaceIo {
    fn read_file(&self, path: &Path) -> Result<ReadOutcome>;
    fn file_exists(&self, path: &Path) -> bool;
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;
    fn canonical_path(&self, path: &Path) -> Result<PathBuf>;
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn make_directory(&self, path: &Path) -> Result<()>;
}

/// Outcome of one external-process invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Process execution required by `execute_process`/`exec_program` and
/// probe-based `find_*` resolution.
pub trait ProcessRunner {
    fn run(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome>;
}

/// Clock and environment-variable access. `SOURCE_DATE_EPOCH` must be
/// honored wherever timestamps are embedded, for reproducible output.
pub trait ClockEnv {
    fn now_epoch_seconds(&self) -> u64;
    fn env_get(&self, name: &str) -> Option<String>;
    fn env_set(&mut self, name: &str, value: &str);
    fn env_unset(&mut self, name: &str);
}

/// Real filesystem-backed [`WorkspaceIo`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RealWorkspaceIo;

impl WorkspaceIo for RealWorkspaceIo {
    fn read_file(&self, path: &Path) -> Result<ReadOutcome> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(ReadOutcome::Found(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ReadOutcome::NotFound),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = std::fs::read_dir(path)
            .with_context(|| format!("failed to list directory {}", path.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn canonical_path(&self, path: &Path) -> Result<PathBuf> {
        std::fs::canonicalize(path).with_context(|| format!("failed to canonicalize {}", path.display()))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
    }

    fn make_directory(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).with_context(|| format!("failed to create directory {}", path.display()))
    }
}

/// Real process-spawning [`ProcessRunner`]. Timeouts are best-effort: a
/// plain `std::process::Command` has no native timeout, so one is
/// approximated by polling `try_wait` and killing the child on expiry.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealProcessRunner;

impl ProcessRunner for RealProcessRunner {
    fn run(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome> {
        let Some((program, args)) = argv.split_first() else {
            anyhow::bail!("empty argv passed to process runner");
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (k, v) in env {
            cmd.env(k, v);
        }
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().with_context(|| format!("failed to spawn `{program}`"))?;

        if let Some(limit) = timeout {
            let start = std::time::Instant::now();
            loop {
                if let Some(status) = child.try_wait()? {
                    let output = child.wait_with_output()?;
                    return Ok(finish(status.code(), output, false));
                }
                if start.elapsed() >= limit {
                    let _ = child.kill();
                    let output = child.wait_with_output()?;
                    return Ok(finish(None, output, true));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        let output = child.wait_with_output().with_context(|| format!("failed to wait for `{program}`"))?;
        let code = output.status.code();
        Ok(finish(code, output, false))
    }
}

fn finish(code: Option<i32>, output: std::process::Output, timed_out: bool) -> ProcessOutcome {
    ProcessOutcome {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: code,
        timed_out,
    }
}

/// Real system-clock/environment [`ClockEnv`], honoring `SOURCE_DATE_EPOCH`.
#[derive(Debug, Default, Clone)]
pub struct RealClockEnv {
    overlay: HashMap<String, Option<String>>,
}

impl ClockEnv for RealClockEnv {
    fn now_epoch_seconds(&self) -> u64 {
        if let Some(fixed) = self.env_get("SOURCE_DATE_EPOCH").and_then(|v| v.parse::<u64>().ok()) {
            return fixed;
        }
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn env_get(&self, name: &str) -> Option<String> {
        match self.overlay.get(name) {
            Some(Some(v)) => Some(v.clone()),
            Some(None) => None,
            None => std::env::var(name).ok(),
        }
    }

    fn env_set(&mut self, name: &str, value: &str) {
        self.overlay.insert(name.to_string(), Some(value.to_string()));
    }

    fn env_unset(&mut self, name: &str) {
        self.overlay.insert(name.to_string(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn real_workspace_io_reports_not_found() {
        let io = RealWorkspaceIo;
        let outcome = io.read_file(Path::new("/nonexistent/path/CMakeLists.txt")).unwrap();
        assert!(matches!(outcome, ReadOutcome::NotFound));
    }

    #[test]
    fn real_workspace_io_round_trips_a_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        let io = RealWorkspaceIo;
        io.write_file(&path, b"hello").unwrap();
        match io.read_file(&path).unwrap() {
            ReadOutcome::Found(bytes) => assert_eq!(bytes, b"hello"),
            ReadOutcome::NotFound => panic!("expected Found"),
        }
    }

    #[test]
    fn real_clock_env_honors_source_date_epoch_override() {
        let mut clock = RealClockEnv::default();
        clock.env_set("SOURCE_DATE_EPOCH", "1700000000");
        assert_eq!(clock.now_epoch_seconds(), 1_700_000_000);
    }

    #[test]
    fn real_clock_env_unset_shadows_process_environment() {
        let mut clock = RealClockEnv::default();
        clock.env_set("CMK2BP_TEST_VAR", "x");
        assert_eq!(clock.env_get("CMK2BP_TEST_VAR"), Some("x".to_string()));
        clock.env_unset("CMK2BP_TEST_VAR");
        assert_eq!(clock.env_get("CMK2BP_TEST_VAR"), None);
    }
}
