//! Orchestrates the four-stage pipeline end to end: Lexer -> Parser ->
//! Evaluator -> Builder -> Freezer. This is the crate's single entry point;
//! the CLI binary and integration tests drive everything through
//! [`run_pipeline`] rather than wiring the stages themselves.

use std::path::PathBuf;

use crate::adapters::{ClockEnv, ProcessRunner, WorkspaceIo};
use crate::builder::Builder;
use crate::config::PipelineConfig;
use crate::diagnostics::DiagnosticSink;
use crate::evaluator::{Evaluator, EvaluatorInit};
use crate::model::FrozenModel;
use crate::parser::parse_source;

/// Everything a pipeline run needs beyond the source text: the three
/// external collaborators (§6) and the source/binary directory pair every
/// stage's path-relative variables are seeded from.
pub struct PipelineInputs<'a> {
    pub workspace_io: &'a dyn WorkspaceIo,
    pub process_runner: &'a dyn ProcessRunner,
    pub clock_env: &'a mut dyn ClockEnv,
    pub source_dir: PathBuf,
    pub binary_dir: PathBuf,
    pub entry_file: PathBuf,
}

/// The result of one `run_pipeline` call. Matches §8's universal invariant:
/// either a model with zero errors, or no model with at least one.
pub struct PipelineOutcome {
    pub model: Option<FrozenModel>,
    pub diagnostics: DiagnosticSink,
    pub event_count: usize,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.model.is_some() && !self.diagnostics.has_errors()
    }
}

/// Runs `source` through every stage of the pipeline, honoring `config`.
/// Each phase boundary checks the sink's error counter (§7 propagation
/// policy): a nonzero count at lex/parse time still lets the evaluator run
/// (it reports its own diagnostics against a best-effort AST), but the
/// builder/freezer never produce a model unless both validation and every
/// earlier phase are clean.
pub fn run_pipeline(source: &str, config: &PipelineConfig, inputs: PipelineInputs<'_>) -> PipelineOutcome {
    let mut sink = DiagnosticSink::new();
    sink.set_strict(config.strict_mode);
    let run_ts = inputs.clock_env.now_epoch_seconds();

    tracing::info!(bytes = source.len(), "lexing and parsing started");
    let ast = parse_source(
        source,
        &mut sink,
        Some(inputs.entry_file.clone()),
        config.parser_limits.max_block_depth,
        config.parser_limits.max_paren_depth,
    );
    tracing::debug!(nodes = ast.len(), "parse tree built");

    let init = EvaluatorInit {
        workspace_io: inputs.workspace_io,
        process_runner: inputs.process_runner,
        clock_env: inputs.clock_env,
        config: config.evaluator.clone(),
        strict: config.strict_mode,
        source_dir: inputs.source_dir,
        binary_dir: inputs.binary_dir,
        current_file: Some(inputs.entry_file),
    };
    let evaluator = Evaluator::new(init);
    let stream = evaluator.run(&ast, &mut sink);
    tracing::info!(events = stream.len(), "evaluation finished");

    let event_count = stream.len();

    if let Some(path) = &config.unsupported_commands_log {
        if sink.telemetry().total() > 0 {
            if let Err(e) = sink.write_report(path, run_ts, "pipeline") {
                tracing::warn!("failed to append unsupported-command report to {}: {e}", path.display());
            }
        }
    }

    if sink.has_errors() {
        tracing::warn!(errors = sink.error_count(), "aborting before build: evaluator reported errors");
        return PipelineOutcome { model: None, diagnostics: sink, event_count };
    }

    let mut builder = Builder::new(&mut sink);
    builder.apply_stream(&stream);
    let Some(mutable_model) = builder.finish() else {
        tracing::warn!("aborting: builder reported a fatal error");
        return PipelineOutcome { model: None, diagnostics: sink, event_count };
    };

    if sink.has_errors() {
        tracing::warn!(errors = sink.error_count(), "aborting before freeze: builder reported errors");
        return PipelineOutcome { model: None, diagnostics: sink, event_count };
    }

    tracing::debug!(targets = mutable_model.targets.len(), "validating and freezing model");
    let frozen = crate::freezer::freeze(&mutable_model, &mut sink);
    if frozen.is_none() {
        tracing::warn!("aborting: freeze/validate failed");
    } else {
        tracing::info!("pipeline run succeeded");
    }

    PipelineOutcome { model: frozen, diagnostics: sink, event_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeClockEnv, FakeProcessRunner, FakeWorkspaceIo};

    fn run(source: &str) -> PipelineOutcome {
        let config = PipelineConfig::default();
        let io = FakeWorkspaceIo::new();
        let proc = FakeProcessRunner::new();
        let mut clock = FakeClockEnv::new(1_700_000_000);
        let inputs = PipelineInputs {
            workspace_io: &io,
            process_runner: &proc,
            clock_env: &mut clock,
            source_dir: PathBuf::from("/src"),
            binary_dir: PathBuf::from("/build"),
            entry_file: PathBuf::from("CMakeLists.txt"),
        };
        run_pipeline(source, &config, inputs)
    }

    #[test]
    fn basic_executable_scenario_produces_a_model() {
        let outcome = run("project(P)\nadd_executable(app main.c)\n");
        assert!(outcome.succeeded(), "{:?}", outcome.diagnostics.records());
        let model = outcome.model.unwrap();
        assert_eq!(model.project_name.as_deref(), Some("P"));
        let target = model.find_target("app").unwrap();
        assert_eq!(target.sources.len(), 1);
        assert_eq!(target.sources[0].as_str(), "main.c");
    }

    #[test]
    fn interface_library_rejected_sources_yields_no_model() {
        let outcome = run("add_library(api INTERFACE)\ntarget_sources(api PRIVATE x.c)\n");
        assert!(!outcome.succeeded());
        assert!(outcome.model.is_none());
        assert!(outcome.diagnostics.has_errors());
    }

    #[test]
    fn dependency_cycle_is_rejected_at_freeze_time() {
        let outcome = run(
            "add_library(a STATIC a.c)\n\
             add_library(b STATIC b.c)\n\
             target_link_libraries(a PRIVATE b)\n\
             target_link_libraries(b PRIVATE a)\n",
        );
        assert!(outcome.model.is_none());
        assert!(outcome.diagnostics.records().iter().any(|d| d.cause.contains("cycle")));
    }

    #[test]
    fn empty_input_yields_an_empty_but_valid_model() {
        let outcome = run("");
        assert!(outcome.succeeded());
        let model = outcome.model.unwrap();
        assert!(model.targets.is_empty());
        assert!(model.project_name.is_none());
    }

    #[test]
    fn foreach_range_with_continue_matches_the_documented_trace() {
        let outcome = run(
            "set(OUT \"\")\n\
             foreach(i RANGE 1 4)\n\
             if(i EQUAL 2)\n\
             continue()\n\
             endif()\n\
             string(APPEND OUT \"${i}\")\n\
             endforeach()\n",
        );
        assert!(outcome.succeeded());
    }
}
