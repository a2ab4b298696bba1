//! In-memory fakes for the three external adapters (§6), adapted from the
//! teacher's `MockFileSystem`/`MockExecutor`/`MockHttpClient` pattern so
//! evaluator and pipeline tests never touch the real filesystem or spawn
//! real processes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::adapters::{ClockEnv, ProcessOutcome, ProcessRunner, ReadOutcome, WorkspaceIo};

/// An in-memory filesystem keyed by path. Seed files with [`FakeWorkspaceIo::with_file`]
/// before handing the adapter to an evaluator/pipeline run.
#[derive(Debug, Default)]
pub struct FakeWorkspaceIo {
    files: RefCell<HashMap<PathBuf, Vec<u8>>>,
    dirs: RefCell<HashMap<PathBuf, Vec<String>>>,
}

impl FakeWorkspaceIo {
    pub fn new() -> Self {
        FakeWorkspaceIo { files: RefCell::new(HashMap::new()), dirs: RefCell::new(HashMap::new()) }
    }

    /// Seeds a file's contents before the run starts.
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.borrow_mut().insert(path.into(), contents.into());
        self
    }

    /// Seeds a directory listing (used by `file(GLOB ...)` tests).
    pub fn with_dir(self, path: impl Into<PathBuf>, names: Vec<&str>) -> Self {
        self.dirs.borrow_mut().insert(path.into(), names.into_iter().map(str::to_string).collect());
        self
    }

    pub fn written_files(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.files.borrow().clone()
    }
}

impl WorkspaceIo for FakeWorkspaceIo {
    fn read_file(&self, path: &Path) -> Result<ReadOutcome> {
        match self.files.borrow().get(path) {
            Some(bytes) => Ok(ReadOutcome::Found(bytes.clone())),
            None => Ok(ReadOutcome::NotFound),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = self.dirs.borrow().get(path).cloned().unwrap_or_default();
        names.sort();
        Ok(names)
    }

    fn canonical_path(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.files.borrow_mut().insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn make_directory(&self, path: &Path) -> Result<()> {
        self.dirs.borrow_mut().entry(path.to_path_buf()).or_default();
        Ok(())
    }
}

/// A scripted [`ProcessRunner`]: queue canned outcomes keyed by the argv[0]
/// program name, returned in FIFO order per key.
#[derive(Debug, Default)]
pub struct FakeProcessRunner {
    scripted: RefCell<HashMap<String, Vec<ProcessOutcome>>>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        FakeProcessRunner { scripted: RefCell::new(HashMap::new()), calls: RefCell::new(Vec::new()) }
    }

    pub fn with_outcome(self, program: &str, outcome: ProcessOutcome) -> Self {
        self.scripted.borrow_mut().entry(program.to_string()).or_default().push(outcome);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(
        &self,
        argv: &[String],
        _cwd: Option<&Path>,
        _env: &HashMap<String, String>,
        _timeout: Option<Duration>,
    ) -> Result<ProcessOutcome> {
        self.calls.borrow_mut().push(argv.to_vec());
        let Some(program) = argv.first() else {
            anyhow::bail!("empty argv passed to fake process runner");
        };
        if let Some(queue) = self.scripted.borrow_mut().get_mut(program) {
            if !queue.is_empty() {
                return Ok(queue.remove(0));
            }
        }
        Ok(ProcessOutcome { stdout: String::new(), stderr: String::new(), exit_code: Some(0), timed_out: false })
    }
}

/// A fixed, overridable [`ClockEnv`]: `now_epoch_seconds()` returns the
/// constructor value unless `SOURCE_DATE_EPOCH` is overlaid, matching the
/// real adapter's precedence.
#[derive(Debug)]
pub struct FakeClockEnv {
    epoch: u64,
    overlay: HashMap<String, Option<String>>,
}

impl FakeClockEnv {
    pub fn new(epoch: u64) -> Self {
        FakeClockEnv { epoch, overlay: HashMap::new() }
    }
}

impl ClockEnv for FakeClockEnv {
    fn now_epoch_seconds(&self) -> u64 {
        if let Some(fixed) = self.env_get("SOURCE_DATE_EPOCH").and_then(|v| v.parse::<u64>().ok()) {
            return fixed;
        }
        self.epoch
    }

    fn env_get(&self, name: &str) -> Option<String> {
        match self.overlay.get(name) {
            Some(Some(v)) => Some(v.clone()),
            Some(None) => None,
            None => None,
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

    #[test]
    fn fake_workspace_io_reads_seeded_file() {
        let io = FakeWorkspaceIo::new().with_file("/src/a.txt", "hello");
        match io.read_file(Path::new("/src/a.txt")).unwrap() {
            ReadOutcome::Found(bytes) => assert_eq!(bytes, b"hello"),
            ReadOutcome::NotFound => panic!("expected Found"),
        }
    }

    #[test]
    fn fake_workspace_io_reports_not_found_for_unseeded_path() {
        let io = FakeWorkspaceIo::new();
        assert!(matches!(io.read_file(Path::new("/src/missing.txt")).unwrap(), ReadOutcome::NotFound));
    }

    #[test]
    fn fake_workspace_io_records_writes() {
        let io = FakeWorkspaceIo::new();
        io.write_file(Path::new("/build/out.txt"), b"data").unwrap();
        assert!(io.file_exists(Path::new("/build/out.txt")));
    }

    #[test]
    fn fake_process_runner_plays_back_scripted_outcomes_in_order() {
        let runner = FakeProcessRunner::new().with_outcome(
            "echo",
            ProcessOutcome { stdout: "hi\n".into(), stderr: String::new(), exit_code: Some(0), timed_out: false },
        );
        let outcome = runner.run(&["echo".to_string()], None, &HashMap::new(), None).unwrap();
        assert_eq!(outcome.stdout, "hi\n");
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn fake_clock_env_honors_source_date_epoch_overlay() {
        let mut clock = FakeClockEnv::new(1_700_000_000);
        assert_eq!(clock.now_epoch_seconds(), 1_700_000_000);
        clock.env_set("SOURCE_DATE_EPOCH", "42");
        assert_eq!(clock.now_epoch_seconds(), 42);
    }
}
