//! Diagnostics sink: warnings/errors, strict-mode promotion, unsupported-command
//! telemetry. Carried as an explicit context value rather than a process-wide
//! global, per the crate's "no leaked evaluator/builder state into globals" rule.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

/// Severity of a single diagnostic record. Ordered so that promotion under
/// strict mode is a simple comparison (`Warning` promotes to `Error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Help,
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Help => "help",
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Origin of a diagnostic: the source position it was raised at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Origin {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub col: usize,
}

/// A single diagnostic record collected by the sink.
///
/// Plain data, not a `thiserror` error type: many diagnostics coexist per
/// run, so they are collected rather than thrown.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub component: String,
    pub origin: Origin,
    pub command: Option<String>,
    pub cause: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, component: impl Into<String>, cause: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            component: component.into(),
            origin: Origin::default(),
            command: None,
            cause: cause.into(),
            hint: None,
        }
    }

    pub fn with_origin(mut self, file: Option<PathBuf>, line: usize, col: usize) -> Self {
        self.origin = Origin { file, line, col };
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn format(&self) -> String {
        let loc = match &self.origin.file {
            Some(f) => format!("{}:{}:{}", f.display(), self.origin.line, self.origin.col),
            None => "<unknown>".to_string(),
        };
        let mut out = format!("{}: [{}] {} ({})", self.severity, self.component, self.cause, loc);
        if let Some(cmd) = &self.command {
            out.push_str(&format!(" in `{cmd}`"));
        }
        if let Some(hint) = &self.hint {
            out.push_str(&format!("\n  hint: {hint}"));
        }
        out
    }
}

/// Growable per-name counter table for unsupported-command telemetry.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    counts: HashMap<String, usize>,
    total: usize,
}

impl Telemetry {
    pub fn record(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn unique(&self) -> usize {
        self.counts.len()
    }

    pub fn count_for(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Render the append-only report body for one run: a header line and one
    /// indented `cmd=<name> count=<n>` line per distinct unsupported command,
    /// sorted by name for determinism.
    pub fn render_report(&self, run_ts: u64, source: &str) -> String {
        let mut out = format!(
            "run_ts={run_ts} source={source} total={} unique={}\n",
            self.total,
            self.unique()
        );
        let mut names: Vec<&String> = self.counts.keys().collect();
        names.sort();
        for name in names {
            out.push_str(&format!("  cmd={name} count={}\n", self.counts[name]));
        }
        out
    }
}

/// The diagnostics sink. Constructed once per pipeline run and threaded by
/// reference to every stage.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    strict: bool,
    records: Vec<Diagnostic>,
    warning_count: usize,
    error_count: usize,
    telemetry: Telemetry,
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink {
            strict: false,
            records: Vec::new(),
            warning_count: 0,
            error_count: 0,
            telemetry: Telemetry::default(),
        }
    }

    pub fn reset(&mut self) {
        *self = DiagnosticSink::new();
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Log a diagnostic. Under strict mode, WARNING is promoted to ERROR
    /// before counting; both the original-severity and effective-severity
    /// counters are incremented (a promoted warning counts once as a warning
    /// and once as an error), matching the reference sink's double-counting.
    pub fn log(&mut self, mut diag: Diagnostic) {
        let original = diag.severity;
        if original == Severity::Warning {
            self.warning_count += 1;
        }
        let effective = if self.strict && original == Severity::Warning {
            Severity::Error
        } else {
            original
        };
        diag.severity = effective;
        if effective == Severity::Error {
            self.error_count += 1;
        }
        self.records.push(diag);
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn telemetry_reset(&mut self) {
        self.telemetry = Telemetry::default();
    }

    pub fn record_unsupported(&mut self, command: &str) {
        self.telemetry.record(command);
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn emit_summary(&self) -> String {
        format!(
            "{} error(s), {} warning(s), {} unsupported command invocation(s) across {} distinct command(s)",
            self.error_count,
            self.warning_count,
            self.telemetry.total(),
            self.telemetry.unique()
        )
    }

    /// Append a telemetry report to `path`, creating it if necessary.
    pub fn write_report(&self, path: &Path, run_ts: u64, source: &str) -> std::io::Result<()> {
        use std::fs::OpenOptions;
        use std::io::Write;
        let body = self.telemetry.render_report(run_ts, source);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(body.as_bytes())
    }
}

/// Structured pipeline-phase errors (§7 taxonomy), richly diagnosed via
/// `miette` for CLI rendering. Distinct from [`Diagnostic`]: these abort a
/// phase outright rather than being collected alongside other records.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum PipelineError {
    #[error("lexical error: {0}")]
    #[diagnostic(code(cmk2bp::lexical), help("check for unterminated strings, brackets, or generator expressions"))]
    Lexical(String),

    #[error("syntax error: {0}")]
    #[diagnostic(code(cmk2bp::syntax), help("check for mismatched parentheses or missing end* keywords"))]
    Syntactic(String),

    #[error("semantic error: {0}")]
    #[diagnostic(code(cmk2bp::semantic))]
    Semantic(String),

    #[error("runtime error: {0}")]
    #[diagnostic(code(cmk2bp::runtime))]
    Runtime(String),

    #[error("resource error: {0}")]
    #[diagnostic(code(cmk2bp::resource), help("the pipeline aborts unconditionally on resource errors"))]
    Resource(String),

    #[error("phase aborted: {error_count} error(s) reported")]
    #[diagnostic(code(cmk2bp::phase_aborted))]
    PhaseAborted { error_count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_promotes_and_double_counts() {
        let mut sink = DiagnosticSink::new();
        sink.set_strict(true);
        sink.log(Diagnostic::new(Severity::Warning, "evaluator", "unknown keyword"));
        assert_eq!(sink.warning_count(), 1);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.records()[0].severity, Severity::Error);
    }

    #[test]
    fn lenient_mode_keeps_warning_as_warning() {
        let mut sink = DiagnosticSink::new();
        sink.log(Diagnostic::new(Severity::Warning, "evaluator", "unknown keyword"));
        assert_eq!(sink.warning_count(), 1);
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn telemetry_report_format() {
        let mut sink = DiagnosticSink::new();
        sink.record_unsupported("load_cache");
        sink.record_unsupported("load_cache");
        sink.record_unsupported("build_name");
        let report = sink.telemetry().render_report(1_700_000_000, "CMakeLists.txt");
        assert!(report.starts_with("run_ts=1700000000 source=CMakeLists.txt total=3 unique=2\n"));
        assert!(report.contains("  cmd=build_name count=1\n"));
        assert!(report.contains("  cmd=load_cache count=2\n"));
    }

    #[test]
    fn has_errors_tracks_error_count() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        sink.log(Diagnostic::new(Severity::Error, "builder", "duplicate target"));
        assert!(sink.has_errors());
    }
}
