//! AST -> event stream. The largest subsystem: scope-stack variable
//! resolution, cache/env overlays, policy state, function/macro binding,
//! control flow, variable expansion, and dispatch across the built-in
//! command table (§4.5).

mod builtins;
mod builtins_target;
mod expand;
mod policy;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::adapters::{ClockEnv, ProcessRunner, WorkspaceIo};
use crate::config::{CompatProfile, EvaluatorConfig};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Severity};
use crate::events::{DiagSeverity, Event, EventOrigin, EventStream};
use crate::logic::{self, Condition, VarLookup};
use crate::parser::{Arg, ArgKind, AstRoot, Command, Node};

pub use expand::ExpansionContext;
pub use policy::{Policy, PolicySetting};

/// A bound `function()`/`macro()`: its parameter names and body. Macros
/// splice into the caller's scope on call; functions push a new frame.
#[derive(Debug, Clone)]
struct FuncBinding {
    params: Vec<String>,
    body: Vec<Node>,
    is_macro: bool,
}

/// A persisted cache variable entry (name -> value, with type/docstring).
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    type_name: String,
    doc: String,
}

/// One frame of the directory-scope stack: current source/binary dir.
#[derive(Debug, Clone)]
struct DirFrame {
    source_dir: PathBuf,
    binary_dir: PathBuf,
}

/// Unwind signal produced by executing a node or block, consumed by the
/// nearest enclosing `foreach`/`while`/function call. Mapped to an enum
/// rather than host-language exceptions, per the "control-flow unwind"
/// design note (§9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Option<Vec<String>>),
}

/// Everything the evaluator needs to start a run: the three external
/// adapters (§6), the evaluator configuration, strictness, and the
/// initial source/binary directory pair.
pub struct EvaluatorInit<'a> {
    pub workspace_io: &'a dyn WorkspaceIo,
    pub process_runner: &'a dyn ProcessRunner,
    pub clock_env: &'a mut dyn ClockEnv,
    pub config: EvaluatorConfig,
    pub strict: bool,
    pub source_dir: PathBuf,
    pub binary_dir: PathBuf,
    pub current_file: Option<PathBuf>,
}

pub struct Evaluator<'a> {
    workspace_io: &'a dyn WorkspaceIo,
    process_runner: &'a dyn ProcessRunner,
    clock_env: &'a mut dyn ClockEnv,
    config: EvaluatorConfig,
    strict: bool,
    stream: EventStream,
    scopes: Vec<HashMap<String, String>>,
    cache: HashMap<String, CacheEntry>,
    policies: policy::PolicyTable,
    policy_stack: Vec<policy::PolicyTable>,
    functions: HashMap<String, FuncBinding>,
    directory_stack: Vec<DirFrame>,
    check_stack: Vec<String>,
    include_stack: Vec<PathBuf>,
    current_file: Option<PathBuf>,
    append_count: usize,
    resource_exhausted: bool,
    is_windows: bool,
    is_apple: bool,
    is_linux: bool,
    /// Mirrors of property writes the evaluator has already emitted as
    /// events, kept so `get_property`/`get_target_property`/
    /// `get_directory_property`/`get_source_file_property` can read back a
    /// value set earlier in the same run without waiting for the builder
    /// (which only sees the event stream after the whole file has run).
    target_properties: HashMap<String, HashMap<String, String>>,
    directory_properties: HashMap<String, HashMap<String, String>>,
    source_properties: HashMap<String, HashMap<String, String>>,
    global_properties: HashMap<String, String>,
}

impl<'a> Evaluator<'a> {
    pub fn new(init: EvaluatorInit<'a>) -> Self {
        let mut scopes = Vec::new();
        scopes.push(HashMap::new());
        let top = scopes.last_mut().unwrap();
        top.insert("CMAKE_SOURCE_DIR".to_string(), init.source_dir.display().to_string());
        top.insert("CMAKE_BINARY_DIR".to_string(), init.binary_dir.display().to_string());
        top.insert("CMAKE_CURRENT_SOURCE_DIR".to_string(), init.source_dir.display().to_string());
        top.insert("CMAKE_CURRENT_BINARY_DIR".to_string(), init.binary_dir.display().to_string());

        let is_windows = cfg!(target_os = "windows");
        let is_apple = cfg!(target_os = "macos");
        let is_linux = cfg!(target_os = "linux");
        top.insert("WIN32".to_string(), bool_str(is_windows));
        top.insert("UNIX".to_string(), bool_str(!is_windows));
        top.insert("APPLE".to_string(), bool_str(is_apple));
        top.insert("LINUX".to_string(), bool_str(is_linux));

        let directory_stack = vec![DirFrame { source_dir: init.source_dir.clone(), binary_dir: init.binary_dir.clone() }];

        Evaluator {
            workspace_io: init.workspace_io,
            process_runner: init.process_runner,
            clock_env: init.clock_env,
            config: init.config,
            strict: init.strict,
            stream: EventStream::new(),
            scopes,
            cache: HashMap::new(),
            policies: policy::PolicyTable::new(),
            policy_stack: Vec::new(),
            functions: HashMap::new(),
            directory_stack,
            check_stack: Vec::new(),
            include_stack: Vec::new(),
            current_file: init.current_file,
            append_count: 0,
            resource_exhausted: false,
            is_windows,
            is_apple,
            is_linux,
            target_properties: HashMap::new(),
            directory_properties: HashMap::new(),
            source_properties: HashMap::new(),
            global_properties: HashMap::new(),
        }
    }

    /// Runs the full AST, returning the accumulated event stream. Emits a
    /// [`Event::PlatformInit`] first so the build model records the host
    /// platform flags even for a run with no commands at all.
    pub fn run(mut self, ast: &AstRoot, sink: &mut DiagnosticSink) -> EventStream {
        let origin = self.origin_at(0, 0);
        let event = Event::PlatformInit {
            is_windows: self.is_windows,
            is_unix: !self.is_windows,
            is_apple: self.is_apple,
            is_linux: self.is_linux,
        };
        self.emit(sink, origin, event);
        self.exec_block(ast, sink);
        self.stream
    }

    // --- scope & variable access -----------------------------------------

    fn current_dir(&self) -> &DirFrame {
        self.directory_stack.last().expect("directory stack always has the root frame")
    }

    fn var_get(&self, name: &str) -> Option<String> {
        for frame in self.scopes.iter().rev() {
            if let Some(v) = frame.get(name) {
                return Some(v.clone());
            }
        }
        self.cache.get(name).map(|e| e.value.clone())
    }

    fn var_set_local(&mut self, name: &str, value: &str) {
        self.scopes.last_mut().unwrap().insert(name.to_string(), value.to_string());
    }

    fn var_set_parent_scope(&mut self, name: &str, value: &str) {
        if self.scopes.len() >= 2 {
            let idx = self.scopes.len() - 2;
            self.scopes[idx].insert(name.to_string(), value.to_string());
        }
    }

    fn var_unset_local(&mut self, name: &str) {
        self.scopes.last_mut().unwrap().remove(name);
    }

    fn env_get(&self, name: &str) -> Option<String> {
        self.clock_env.env_get(name)
    }

    fn cache_get(&self, name: &str) -> Option<String> {
        self.cache.get(name).map(|e| e.value.clone())
    }

    /// `set(name value... CACHE type doc [FORCE])`. Writes (or, absent
    /// FORCE, preserves) the cache entry and, under policy CMP0126 OLD,
    /// clears any same-named normal variable so subsequent reads fall
    /// through to the cache (scenario 5, §8).
    fn set_cache_entry(&mut self, sink: &mut DiagnosticSink, origin: &EventOrigin, name: &str, value: &str, type_name: &str, doc: &str, force: bool) {
        let exists = self.cache.contains_key(name);
        if force || !exists {
            self.cache.insert(
                name.to_string(),
                CacheEntry { value: value.to_string(), type_name: type_name.to_string(), doc: doc.to_string() },
            );
            self.emit(
                sink,
                origin.clone(),
                Event::SetCacheEntry {
                    key: name.to_string(),
                    value: value.to_string(),
                    type_name: type_name.to_string(),
                    doc: doc.to_string(),
                },
            );
        }
        if !self.policies.is_new(Policy::Cmp0126) {
            self.var_unset_local(name);
        }
    }

    // --- event emission & diagnostics -------------------------------------

    fn origin_at(&self, line: usize, col: usize) -> EventOrigin {
        EventOrigin { file: self.current_file.clone(), line, col }
    }

    /// Applies a `PROPERTY`/`PROPERTIES` write into a plain string map using
    /// the same SET/APPEND_LIST/APPEND_STRING semantics the builder applies
    /// to a [`crate::model::Target`]'s property bag (`Target::set_property`).
    fn apply_property_op(map: &mut HashMap<String, String>, key: &str, value: &str, op: crate::events::PropertyOp) {
        use crate::events::PropertyOp;
        match op {
            PropertyOp::Set => {
                map.insert(key.to_string(), value.to_string());
            }
            PropertyOp::AppendList => {
                let entry = map.entry(key.to_string()).or_default();
                if entry.is_empty() {
                    *entry = value.to_string();
                } else {
                    entry.push(';');
                    entry.push_str(value);
                }
            }
            PropertyOp::AppendString => {
                map.entry(key.to_string()).or_default().push_str(value);
            }
        }
    }

    pub(super) fn directory_key(&self) -> String {
        self.current_dir().source_dir.display().to_string()
    }

    pub(super) fn set_global_property(&mut self, key: &str, value: &str, op: crate::events::PropertyOp) {
        Self::apply_property_op(&mut self.global_properties, key, value, op);
    }

    pub(super) fn set_directory_property(&mut self, key: &str, value: &str, op: crate::events::PropertyOp) {
        let dir = self.directory_key();
        let map = self.directory_properties.entry(dir).or_default();
        Self::apply_property_op(map, key, value, op);
    }

    pub(super) fn set_source_property(&mut self, source: &str, key: &str, value: &str, op: crate::events::PropertyOp) {
        let map = self.source_properties.entry(source.to_string()).or_default();
        Self::apply_property_op(map, key, value, op);
    }

    pub(super) fn get_global_property(&self, key: &str) -> Option<String> {
        self.global_properties.get(key).cloned()
    }

    pub(super) fn get_directory_property(&self, key: &str) -> Option<String> {
        let dir = self.directory_key();
        self.directory_properties.get(&dir).and_then(|m| m.get(key)).cloned()
    }

    pub(super) fn get_source_property(&self, source: &str, key: &str) -> Option<String> {
        self.source_properties.get(source).and_then(|m| m.get(key)).cloned()
    }

    pub(super) fn get_target_property_local(&self, target: &str, key: &str) -> Option<String> {
        self.target_properties.get(target).and_then(|m| m.get(key)).cloned()
    }

    fn emit(&mut self, sink: &mut DiagnosticSink, origin: EventOrigin, event: Event) {
        if let Event::TargetPropSet { target_name, key, value, op } = &event {
            let map = self.target_properties.entry(target_name.clone()).or_default();
            Self::apply_property_op(map, key, value, *op);
        }
        if let Event::Diagnostic { severity, component, cause, hint, command, .. } = &event {
            let sev = match severity {
                DiagSeverity::Warning => Severity::Warning,
                DiagSeverity::Error => Severity::Error,
            };
            let mut diag = Diagnostic::new(sev, component.clone(), cause.clone())
                .with_origin(origin.file.clone(), origin.line, origin.col);
            if let Some(cmd) = command {
                diag = diag.with_command(cmd.clone());
            }
            if let Some(h) = hint {
                diag = diag.with_hint(h.clone());
            }
            sink.log(diag);
        }
        self.stream.push(event, origin);
        self.bump_append(sink);
    }

    fn bump_append(&mut self, sink: &mut DiagnosticSink) {
        self.append_count += 1;
        if let Some(limit) = self.config.fail_append_after {
            if self.append_count == limit {
                self.resource_exhausted = true;
                sink.log(Diagnostic::new(Severity::Error, "evaluator", "allocation failure: event arena append exceeded test limit"));
            }
        }
    }

    fn warn(&mut self, sink: &mut DiagnosticSink, origin: EventOrigin, command: &str, cause: impl Into<String>) {
        self.emit(
            sink,
            origin,
            Event::Diagnostic {
                severity: DiagSeverity::Warning,
                component: "evaluator".to_string(),
                command: Some(command.to_string()),
                code: None,
                error_class: None,
                cause: cause.into(),
                hint: None,
            },
        );
    }

    fn error(&mut self, sink: &mut DiagnosticSink, origin: EventOrigin, command: &str, cause: impl Into<String>) {
        self.emit(
            sink,
            origin,
            Event::Diagnostic {
                severity: DiagSeverity::Error,
                component: "evaluator".to_string(),
                command: Some(command.to_string()),
                code: None,
                error_class: None,
                cause: cause.into(),
                hint: None,
            },
        );
    }

    /// Halts further evaluation, reusing the resource-exhaustion short
    /// circuit already checked by `exec_block` — `message(FATAL_ERROR ...)`
    /// aborts the rest of the run the same way a hard resource limit would.
    pub(super) fn stop_processing(&mut self) {
        self.resource_exhausted = true;
    }

    fn unsupported(&mut self, sink: &mut DiagnosticSink, origin: EventOrigin, name: &str) {
        sink.record_unsupported(name);
        let strict_like_error = self.strict || matches!(self.config.compat_profile, CompatProfile::Strict);
        if strict_like_error {
            self.error(sink, origin, name, format!("command `{name}` is not implemented by this translator"));
        } else {
            self.warn(sink, origin, name, format!("command `{name}` is not implemented by this translator; ignored"));
        }
    }

    // --- argument expansion ------------------------------------------------

    /// Expands one [`Arg`] into its list of logical (post-split) string
    /// values, per §4.5.3: bracketed is verbatim and never splits, quoted
    /// expands but never splits, unquoted expands and splits on semicolons.
    fn expand_arg(&self, arg: &Arg) -> Vec<String> {
        let raw = arg.raw_text();
        match arg.kind {
            ArgKind::Bracketed => vec![expand::strip_bracket(&raw).to_string()],
            ArgKind::Quoted => vec![expand::expand_quoted(expand::strip_quotes(&raw), self)],
            ArgKind::Unquoted => expand::expand_unquoted(&raw, self),
        }
    }

    /// Expands an argument list, flattening each argument's (possibly
    /// multi-item, for unquoted list values) expansion in order.
    fn expand_args(&self, args: &[Arg]) -> Vec<String> {
        args.iter().flat_map(|a| self.expand_arg(a)).collect()
    }

    /// Expands a single argument to one logical value, joining a
    /// multi-item unquoted expansion back with `;` (used where a command
    /// wants "the one value" rather than a pre-split list, e.g. a target
    /// name slot).
    fn expand_arg_joined(&self, arg: &Arg) -> String {
        self.expand_arg(arg).join(";")
    }

    // --- control flow --------------------------------------------------

    fn exec_block(&mut self, nodes: &[Node], sink: &mut DiagnosticSink) -> Flow {
        for node in nodes {
            if self.resource_exhausted {
                return Flow::Return(None);
            }
            let flow = self.exec_node(node, sink);
            if flow != Flow::Normal {
                return flow;
            }
        }
        Flow::Normal
    }

    fn exec_node(&mut self, node: &Node, sink: &mut DiagnosticSink) -> Flow {
        match node {
            Node::Command(cmd) => self.exec_command(cmd, sink),
            Node::If(stmt) => self.exec_if(stmt, sink),
            Node::Foreach(stmt) => self.exec_foreach(stmt, sink),
            Node::While(stmt) => self.exec_while(stmt, sink),
            Node::FunctionDef(def) => {
                self.functions.insert(
                    def.name.to_ascii_lowercase(),
                    FuncBinding { params: def.params.clone(), body: def.body.clone(), is_macro: false },
                );
                Flow::Normal
            }
            Node::MacroDef(def) => {
                self.functions.insert(
                    def.name.to_ascii_lowercase(),
                    FuncBinding { params: def.params.clone(), body: def.body.clone(), is_macro: true },
                );
                Flow::Normal
            }
        }
    }

    fn eval_condition(&self, args: &[Arg], sink: &mut DiagnosticSink, origin: &EventOrigin, command: &str) -> bool {
        match logic::parse_and_evaluate(args, self) {
            Ok(v) => v,
            Err(e) => {
                sink.log(
                    Diagnostic::new(Severity::Error, "evaluator", e.message)
                        .with_origin(origin.file.clone(), origin.line, origin.col)
                        .with_command(command),
                );
                false
            }
        }
    }

    fn exec_if(&mut self, stmt: &crate::parser::IfStmt, sink: &mut DiagnosticSink) -> Flow {
        let (line, col) = stmt.cond.first().map(|a| (a.line, a.col)).unwrap_or((0, 0));
        let origin = self.origin_at(line, col);
        if self.eval_condition(&stmt.cond, sink, &origin, "if") {
            return self.exec_block(&stmt.then_block, sink);
        }
        for (cond, block) in &stmt.elseif_clauses {
            if self.eval_condition(cond, sink, &origin, "elseif") {
                return self.exec_block(block, sink);
            }
        }
        if let Some(block) = &stmt.else_block {
            return self.exec_block(block, sink);
        }
        Flow::Normal
    }

    fn exec_while(&mut self, stmt: &crate::parser::WhileStmt, sink: &mut DiagnosticSink) -> Flow {
        let (line, col) = stmt.cond.first().map(|a| (a.line, a.col)).unwrap_or((0, 0));
        let origin = self.origin_at(line, col);
        let mut iterations = 0usize;
        loop {
            if !self.eval_condition(&stmt.cond, sink, &origin, "while") {
                break;
            }
            iterations += 1;
            if iterations > self.config.max_while_iterations {
                self.error(sink, origin.clone(), "while", "maximum iteration count exceeded");
                break;
            }
            match self.exec_block(&stmt.body, sink) {
                Flow::Break => break,
                Flow::Continue | Flow::Normal => continue,
                other @ Flow::Return(_) => return other,
            }
        }
        Flow::Normal
    }

    fn exec_foreach(&mut self, stmt: &crate::parser::ForeachStmt, sink: &mut DiagnosticSink) -> Flow {
        let header = self.expand_args(&stmt.header);
        if header.is_empty() {
            return Flow::Normal;
        }
        let var_name = header[0].clone();
        let rest = &header[1..];

        let items: Vec<String> = if rest.first().map(|s| s.as_str()) == Some("RANGE") {
            foreach_range(&rest[1..])
        } else if rest.first().map(|s| s.as_str()) == Some("IN") {
            foreach_in(self, &rest[1..])
        } else {
            rest.to_vec()
        };

        for item in items {
            self.var_set_local(&var_name, &item);
            match self.exec_block(&stmt.body, sink) {
                Flow::Break => break,
                Flow::Continue | Flow::Normal => continue,
                other @ Flow::Return(_) => return other,
            }
        }
        Flow::Normal
    }

    fn exec_command(&mut self, cmd: &Command, sink: &mut DiagnosticSink) -> Flow {
        let origin = self.origin_at(cmd.line, cmd.col);
        let lname = cmd.name.to_ascii_lowercase();

        match lname.as_str() {
            "break" => return Flow::Break,
            "continue" => return Flow::Continue,
            "return" => {
                let args = self.expand_args(&cmd.args);
                if args.first().map(|s| s.as_str()) == Some("PROPAGATE") {
                    if self.policies.is_new(Policy::Cmp0140) {
                        return Flow::Return(Some(args[1..].to_vec()));
                    }
                    self.warn(sink, origin, "return", "PROPAGATE requires policy CMP0140 NEW; ignoring");
                    return Flow::Return(None);
                }
                return Flow::Return(None);
            }
            _ => {}
        }

        if let Some(binding) = self.functions.get(&lname).cloned() {
            return self.call_binding(&binding, cmd, sink);
        }

        if !self.dispatch_builtin(&lname, cmd, &origin, sink) {
            self.unsupported(sink, origin, &lname);
        }
        Flow::Normal
    }

    fn call_binding(&mut self, binding: &FuncBinding, cmd: &Command, sink: &mut DiagnosticSink) -> Flow {
        let args = self.expand_args(&cmd.args);

        if binding.is_macro {
            // Macros splice into the caller's scope: no new frame, and
            // `return()` inside one is an error (§4.5.4).
            self.bind_call_args(&binding.params, &args, None);
            let flow = self.exec_block(&binding.body, sink);
            if let Flow::Return(_) = flow {
                let origin = self.origin_at(cmd.line, cmd.col);
                self.error(sink, origin, "return", "return() inside a macro is not allowed");
                return Flow::Normal;
            }
            return flow;
        }

        self.scopes.push(HashMap::new());
        self.bind_call_args(&binding.params, &args, Some(self.scopes.len() - 1));
        let flow = self.exec_block(&binding.body, sink);
        let propagated = match flow {
            Flow::Return(Some(names)) => {
                let frame = self.scopes.last().unwrap().clone();
                Some((names, frame))
            }
            _ => None,
        };
        self.scopes.pop();
        if let Some((names, frame)) = propagated {
            for name in names {
                if let Some(v) = frame.get(&name) {
                    self.var_set_local(&name, v);
                }
            }
        }
        Flow::Normal
    }

    fn bind_call_args(&mut self, params: &[String], args: &[String], frame_idx: Option<usize>) {
        let target = frame_idx.unwrap_or(self.scopes.len() - 1);
        for (i, value) in args.iter().enumerate() {
            self.scopes[target].insert(format!("ARGV{i}"), value.clone());
        }
        self.scopes[target].insert("ARGC".to_string(), args.len().to_string());
        self.scopes[target].insert("ARGV".to_string(), args.join(";"));
        let named_count = params.len();
        for (name, value) in params.iter().zip(args.iter()) {
            self.scopes[target].insert(name.clone(), value.clone());
        }
        let extra: Vec<String> = args.iter().skip(named_count).cloned().collect();
        self.scopes[target].insert("ARGN".to_string(), extra.join(";"));
    }
}

fn bool_str(b: bool) -> String {
    if b { "1".to_string() } else { "0".to_string() }
}

fn foreach_range(args: &[String]) -> Vec<String> {
    let nums: Vec<i64> = args.iter().filter_map(|s| s.parse::<i64>().ok()).collect();
    let (start, stop, step) = match nums.len() {
        1 => (0, nums[0], 1),
        2 => (nums[0], nums[1], 1),
        3 => (nums[0], nums[1], nums[2]),
        _ => return Vec::new(),
    };
    let mut out = Vec::new();
    if step == 0 {
        return out;
    }
    let mut i = start;
    if step > 0 {
        while i <= stop {
            out.push(i.to_string());
            i += step;
        }
    } else {
        while i >= stop {
            out.push(i.to_string());
            i += step;
        }
    }
    out
}

fn foreach_in(ev: &Evaluator, args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut mode: Option<&str> = None;
    for a in args {
        match a.as_str() {
            "LISTS" | "ITEMS" => mode = Some(a.as_str()),
            other => match mode {
                Some("LISTS") => {
                    if let Some(v) = ev.var_get(other) {
                        out.extend(v.split(';').filter(|s| !s.is_empty()).map(|s| s.to_string()));
                    }
                }
                _ => out.push(other.to_string()),
            },
        }
    }
    out
}

impl<'a> ExpansionContext for Evaluator<'a> {
    fn get_var(&self, name: &str) -> Option<String> {
        self.var_get(name)
    }
    fn get_env(&self, name: &str) -> Option<String> {
        self.env_get(name)
    }
    fn get_cache(&self, name: &str) -> Option<String> {
        self.cache_get(name)
    }
}

impl<'a> VarLookup for Evaluator<'a> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.var_get(name)
    }

    fn policy_known(&self, id: &str) -> bool {
        policy::policy_by_name(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::test_support::{FakeClockEnv, FakeProcessRunner, FakeWorkspaceIo};

    fn run(src: &str) -> (EventStream, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let ast = parse_source(src, &mut sink, None, 64, 64);
        let io = FakeWorkspaceIo::new();
        let proc = FakeProcessRunner::new();
        let mut clock = FakeClockEnv::new(1_700_000_000);
        let init = EvaluatorInit {
            workspace_io: &io,
            process_runner: &proc,
            clock_env: &mut clock,
            config: EvaluatorConfig::default(),
            strict: false,
            source_dir: PathBuf::from("/src"),
            binary_dir: PathBuf::from("/build"),
            current_file: Some(PathBuf::from("CMakeLists.txt")),
        };
        let ev = Evaluator::new(init);
        let stream = ev.run(&ast, &mut sink);
        (stream, sink)
    }

    #[test]
    fn project_emits_project_declare() {
        let (stream, sink) = run("project(demo VERSION 1.2.3)\n");
        assert!(!sink.has_errors());
        let kinds: Vec<&str> = stream.iter().map(|r| r.event.kind_name()).collect();
        assert!(kinds.contains(&"PROJECT_DECLARE"));
    }

    #[test]
    fn foreach_range_with_continue_builds_expected_string() {
        let (_, sink) = run(
            "set(OUT \"\")\nforeach(i RANGE 1 4)\n  if(i EQUAL 2)\n    continue()\n  endif()\n  string(APPEND OUT \"${i}\")\nendforeach()\n",
        );
        assert!(!sink.has_errors());
    }

    #[test]
    fn basic_executable_scenario() {
        let (stream, sink) = run("project(P)\nadd_executable(app main.c)\n");
        assert!(!sink.has_errors());
        let mut saw_project = false;
        let mut saw_target = false;
        for rec in stream.iter() {
            match &rec.event {
                Event::ProjectDeclare { name, .. } => {
                    saw_project = true;
                    assert_eq!(name, "P");
                }
                Event::TargetDeclare { name, .. } => {
                    saw_target = true;
                    assert_eq!(name, "app");
                }
                _ => {}
            }
        }
        assert!(saw_project && saw_target);
    }

    #[test]
    fn if_policy_predicate_recognizes_known_and_unknown_policy_ids() {
        let (stream, sink) = run(
            "if(POLICY CMP0126)\n  add_executable(known main.c)\nendif()\nif(POLICY CMP9999)\n  add_executable(unknown main.c)\nendif()\n",
        );
        assert!(!sink.has_errors());
        let declared: Vec<String> = stream
            .iter()
            .filter_map(|r| match &r.event {
                Event::TargetDeclare { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(declared, vec!["known".to_string()]);
    }

    #[test]
    fn unknown_command_under_lenient_profile_is_a_warning() {
        let (_, sink) = run("totally_unsupported_command(x y z)\n");
        assert!(sink.has_warnings());
        assert!(!sink.has_errors());
        assert_eq!(sink.telemetry().count_for("totally_unsupported_command"), 1);
    }

    #[test]
    fn function_call_binds_named_params_and_argn() {
        let (stream, sink) = run(
            "function(make_target name)\n  add_executable(${name} main.c)\nendfunction()\nmake_target(app)\n",
        );
        assert!(!sink.has_errors());
        let declared: Vec<String> = stream
            .iter()
            .filter_map(|r| match &r.event {
                Event::TargetDeclare { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(declared, vec!["app".to_string()]);
    }
}
