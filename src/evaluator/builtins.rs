//! General-purpose built-ins (§4.5.5): project/variable/policy/control
//! commands, `list`/`string`/`math`, file inclusion, and the installation
//! and package-discovery family. Target-specific built-ins live in
//! [`super::builtins_target`].

use crate::diagnostics::{Diagnostic, DiagnosticSink, Severity};
use crate::events::{Event, EventOrigin, InstallRuleType};
use crate::parser::{parse_source, Command};

use super::policy::{policy_by_name, Policy, PolicySetting};
use super::{DirFrame, Evaluator};

impl<'a> Evaluator<'a> {
    /// Tries every general-purpose built-in, falling back to the
    /// target-property family, then to the caller's unsupported-command path.
    pub(super) fn dispatch_builtin(&mut self, name: &str, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        if self.dispatch_general_builtin(name, cmd, origin, sink) {
            return true;
        }
        self.dispatch_target_builtin(name, cmd, origin, sink)
    }

    fn note(&mut self, sink: &mut DiagnosticSink, origin: EventOrigin, command: &str, cause: impl Into<String>) {
        sink.log(
            Diagnostic::new(Severity::Note, "evaluator", cause.into())
                .with_origin(origin.file, origin.line, origin.col)
                .with_command(command),
        );
    }

    fn dispatch_general_builtin(&mut self, name: &str, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        match name {
            "project" => self.do_project(cmd, origin, sink),
            "set" => self.do_set(cmd, origin, sink),
            "unset" => self.do_unset(cmd, origin, sink),
            "option" => self.do_option(cmd, origin, sink),
            "cmake_minimum_required" => self.do_cmake_minimum_required(cmd, origin, sink),
            "cmake_policy" => self.do_cmake_policy(cmd, origin, sink),
            "message" => self.do_message(cmd, origin, sink),
            "list" => self.do_list(cmd, origin, sink),
            "string" => self.do_string(cmd, origin, sink),
            "math" => self.do_math(cmd, origin, sink),
            "include" => self.do_include(cmd, origin, sink),
            "add_subdirectory" => self.do_add_subdirectory(cmd, origin, sink),
            "enable_testing" => {
                self.emit(sink, origin.clone(), Event::TestingEnable { enabled: true });
                true
            }
            "add_test" => self.do_add_test(cmd, origin, sink),
            "install" => self.do_install(cmd, origin, sink),
            "find_package" => self.do_find_package(cmd, origin, sink),
            "execute_process" => self.do_execute_process(cmd, origin, sink),
            "exec_program" => self.do_exec_program(cmd, origin, sink),
            "find_program" => self.do_find_x(cmd, origin, sink, FindKind::Program),
            "find_library" => self.do_find_x(cmd, origin, sink, FindKind::Library),
            "find_file" => self.do_find_x(cmd, origin, sink, FindKind::File),
            "find_path" => self.do_find_x(cmd, origin, sink, FindKind::Path),
            "file" => self.do_file(cmd, origin, sink),
            "configure_file" => self.do_configure_file(cmd, origin, sink),
            "get_filename_component" => self.do_get_filename_component(cmd, origin, sink),
            "cmake_path" => self.do_cmake_path(cmd, origin, sink),
            "if" | "elseif" | "else" | "endif" | "foreach" | "endforeach" | "while" | "endwhile" | "function"
            | "endfunction" | "macro" | "endmacro" => true, // structural keywords never reach here as commands
            _ => false,
        }
    }

    // --- project / variables ------------------------------------------------

    fn do_project(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(name) = args.first().cloned() else {
            self.error(sink, origin.clone(), "project", "project() requires a name");
            return true;
        };
        let mut version = None;
        let mut description = None;
        let mut languages = Vec::new();
        let mut mode: Option<&str> = None;
        for a in args.iter().skip(1) {
            match a.as_str() {
                "VERSION" => mode = Some("VERSION"),
                "DESCRIPTION" => mode = Some("DESCRIPTION"),
                "HOMEPAGE_URL" => mode = Some("HOMEPAGE_URL"),
                "LANGUAGES" => mode = Some("LANGUAGES"),
                other => match mode {
                    Some("VERSION") => {
                        version = Some(other.to_string());
                        mode = None;
                    }
                    Some("DESCRIPTION") => {
                        description = Some(other.to_string());
                        mode = None;
                    }
                    Some("HOMEPAGE_URL") => mode = None,
                    Some("LANGUAGES") => languages.push(other.to_string()),
                    _ => {}
                },
            }
        }

        if version.is_none() && !self.policies.is_new(Policy::Cmp0048) {
            // OLD: project() without VERSION leaves prior *_VERSION variables
            // untouched; nothing to clear since we never set them here.
        }

        self.var_set_local("PROJECT_NAME", &name);
        self.var_set_local("CMAKE_PROJECT_NAME", &name);
        self.var_set_local(&format!("{name}_IS_TOP_LEVEL"), if self.directory_stack.len() == 1 { "ON" } else { "OFF" });
        if let Some(v) = &version {
            self.var_set_local("PROJECT_VERSION", v);
            self.var_set_local("CMAKE_PROJECT_VERSION", v);
            let parts: Vec<&str> = v.split('.').collect();
            for (i, key) in ["MAJOR", "MINOR", "PATCH", "TWEAK"].iter().enumerate() {
                let value = parts.get(i).copied().unwrap_or("0");
                self.var_set_local(&format!("PROJECT_VERSION_{key}"), value);
                self.var_set_local(&format!("{name}_VERSION_{key}"), value);
            }
            self.var_set_local(&format!("{name}_VERSION"), v);
        } else if self.policies.is_new(Policy::Cmp0048) {
            for key in ["PROJECT_VERSION", "PROJECT_VERSION_MAJOR", "PROJECT_VERSION_MINOR", "PROJECT_VERSION_PATCH", "PROJECT_VERSION_TWEAK"] {
                self.var_set_local(key, "");
            }
        }
        if let Some(d) = &description {
            self.var_set_local("PROJECT_DESCRIPTION", d);
        }

        self.emit(sink, origin.clone(), Event::ProjectDeclare { name, version, description, languages });
        true
    }

    fn do_set(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(name) = args.first().cloned() else {
            self.error(sink, origin.clone(), "set", "set() requires a variable name");
            return true;
        };
        let rest = &args[1..];
        if let Some(cache_pos) = rest.iter().position(|a| a == "CACHE") {
            let value = rest[..cache_pos].join(";");
            let type_name = rest.get(cache_pos + 1).cloned().unwrap_or_else(|| "STRING".to_string());
            let doc = rest.get(cache_pos + 2).cloned().unwrap_or_default();
            let force = rest.get(cache_pos + 3).map(|s| s == "FORCE").unwrap_or(false);
            self.set_cache_entry(sink, origin, &name, &value, &type_name, &doc, force);
            return true;
        }
        if rest.last().map(|s| s.as_str()) == Some("PARENT_SCOPE") {
            let value = rest[..rest.len() - 1].join(";");
            self.var_set_parent_scope(&name, &value);
            self.emit(sink, origin.clone(), Event::VarSet { key: name, value });
            return true;
        }
        let value = rest.join(";");
        if value.is_empty() {
            self.var_unset_local(&name);
        } else {
            self.var_set_local(&name, &value);
        }
        self.emit(sink, origin.clone(), Event::VarSet { key: name, value });
        true
    }

    fn do_unset(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(name) = args.first() else { return true };
        if args.get(1).map(|s| s.as_str()) == Some("CACHE") {
            self.cache.remove(name);
        } else {
            self.var_unset_local(name);
        }
        self.emit(sink, origin.clone(), Event::VarSet { key: name.clone(), value: String::new() });
        true
    }

    fn do_option(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(name) = args.first() else {
            self.error(sink, origin.clone(), "option", "option() requires a variable name");
            return true;
        };
        let doc = args.get(1).cloned().unwrap_or_default();
        let default = args.get(2).map(|v| v.as_str()).unwrap_or("OFF");
        let value = if default.eq_ignore_ascii_case("on") || default == "1" { "ON" } else { "OFF" };
        self.set_cache_entry(sink, origin, name, value, "BOOL", &doc, false);
        true
    }

    fn do_cmake_minimum_required(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(pos) = args.iter().position(|a| a == "VERSION") else {
            self.error(sink, origin.clone(), "cmake_minimum_required", "missing VERSION keyword");
            return true;
        };
        let Some(version) = args.get(pos + 1) else {
            self.error(sink, origin.clone(), "cmake_minimum_required", "missing version value");
            return true;
        };
        if let Some((major, minor)) = parse_major_minor(version) {
            self.policies.set_baseline(major, minor);
        }
        true
    }

    fn do_cmake_policy(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        match args.first().map(|s| s.as_str()) {
            Some("VERSION") => {
                if let Some(version) = args.get(1) {
                    if let Some((major, minor)) = parse_major_minor(version) {
                        self.policies.set_baseline(major, minor);
                    }
                }
            }
            Some("SET") => {
                let (Some(id), Some(setting)) = (args.get(1), args.get(2)) else {
                    self.error(sink, origin.clone(), "cmake_policy", "SET requires a policy id and NEW|OLD");
                    return true;
                };
                let Some(policy) = policy_by_name(id) else {
                    self.unsupported(sink, origin.clone(), &format!("cmake_policy(SET {id})"));
                    return true;
                };
                let value = match setting.as_str() {
                    "NEW" => PolicySetting::New,
                    "OLD" => PolicySetting::Old,
                    _ => {
                        self.error(sink, origin.clone(), "cmake_policy", "expected NEW or OLD");
                        return true;
                    }
                };
                self.policies.set(policy, value);
            }
            Some("GET") => {
                let (Some(id), Some(out)) = (args.get(1), args.get(2)) else {
                    self.error(sink, origin.clone(), "cmake_policy", "GET requires a policy id and output variable");
                    return true;
                };
                let Some(policy) = policy_by_name(id) else {
                    self.unsupported(sink, origin.clone(), &format!("cmake_policy(GET {id})"));
                    return true;
                };
                let text = if self.policies.is_new(policy) { "NEW" } else { "OLD" };
                self.var_set_local(out, text);
            }
            Some("PUSH") => {
                self.policy_stack.push(self.policies.clone());
            }
            Some("POP") => {
                if let Some(prev) = self.policy_stack.pop() {
                    self.policies = prev;
                } else {
                    self.error(sink, origin.clone(), "cmake_policy", "POP with no matching PUSH");
                }
            }
            _ => {
                self.error(sink, origin.clone(), "cmake_policy", "expected VERSION|SET|GET|PUSH|POP");
            }
        }
        true
    }

    fn do_message(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        const MODES: &[&str] = &[
            "FATAL_ERROR", "SEND_ERROR", "WARNING", "AUTHOR_WARNING", "DEPRECATION", "NOTICE", "STATUS", "VERBOSE",
            "DEBUG", "TRACE", "CHECK_START", "CHECK_PASS", "CHECK_FAIL", "CONFIGURE_LOG",
        ];
        let (mode, rest) = match args.first().map(|s| s.as_str()) {
            Some(m) if MODES.contains(&m) => (m, &args[1..]),
            _ => ("NOTICE", &args[..]),
        };
        let text = rest.concat();
        match mode {
            "FATAL_ERROR" => {
                self.error(sink, origin.clone(), "message", text);
                if !self.config.continue_on_fatal_error {
                    self.stop_processing();
                }
            }
            "SEND_ERROR" => self.error(sink, origin.clone(), "message", text),
            "WARNING" | "AUTHOR_WARNING" | "DEPRECATION" => self.warn(sink, origin.clone(), "message", text),
            "CHECK_START" => {
                self.check_stack.push(text.clone());
                self.note(sink, origin.clone(), "message", format!("-- {text}"));
            }
            "CHECK_PASS" | "CHECK_FAIL" => match self.check_stack.pop() {
                Some(prefix) => self.note(sink, origin.clone(), "message", format!("-- {prefix} - {text}")),
                None => self.error(
                    sink,
                    origin.clone(),
                    "message",
                    format!("{mode} has no matching CHECK_START on the stack"),
                ),
            },
            _ => self.note(sink, origin.clone(), "message", text),
        }
        true
    }

    // --- list() --------------------------------------------------------------

    fn do_list(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(op) = args.first().cloned() else { return true };
        let Some(list_name) = args.get(1).cloned() else {
            self.error(sink, origin.clone(), "list", "missing list variable name");
            return true;
        };
        let mut items: Vec<String> = self.var_get(&list_name).map(|v| split_list(&v)).unwrap_or_default();
        let rest = &args[2..];

        match op.as_str() {
            "LENGTH" => {
                if let Some(out) = rest.first() {
                    self.var_set_local(out, &items.len().to_string());
                }
            }
            "GET" => {
                let (idx_args, out) = rest.split_at(rest.len().saturating_sub(1));
                let values: Vec<String> = idx_args
                    .iter()
                    .filter_map(|i| i.parse::<i64>().ok())
                    .filter_map(|i| resolve_index(items.len(), i).and_then(|i| items.get(i).cloned()))
                    .collect();
                if let Some(out) = out.first() {
                    self.var_set_local(out, &values.join(";"));
                }
                return true;
            }
            "APPEND" => {
                items.extend(rest.iter().cloned());
                self.set_list(&list_name, &items, sink, origin);
            }
            "PREPEND" => {
                let mut new_items = rest.to_vec();
                new_items.extend(items);
                self.set_list(&list_name, &new_items, sink, origin);
            }
            "INSERT" => {
                if let Some((idx, values)) = rest.split_first() {
                    if let Some(i) = idx.parse::<i64>().ok().and_then(|i| resolve_index(items.len() + 1, i)) {
                        for (offset, v) in values.iter().enumerate() {
                            items.insert(i + offset, v.clone());
                        }
                        self.set_list(&list_name, &items, sink, origin);
                    }
                }
            }
            "REMOVE_ITEM" => {
                items.retain(|i| !rest.contains(i));
                self.set_list(&list_name, &items, sink, origin);
            }
            "REMOVE_AT" => {
                let mut indices: Vec<usize> =
                    rest.iter().filter_map(|i| i.parse::<i64>().ok()).filter_map(|i| resolve_index(items.len(), i)).collect();
                indices.sort_unstable_by(|a, b| b.cmp(a));
                indices.dedup();
                for i in indices {
                    if i < items.len() {
                        items.remove(i);
                    }
                }
                self.set_list(&list_name, &items, sink, origin);
            }
            "REMOVE_DUPLICATES" => {
                let mut seen = std::collections::HashSet::new();
                items.retain(|i| seen.insert(i.clone()));
                self.set_list(&list_name, &items, sink, origin);
            }
            "REVERSE" => {
                items.reverse();
                self.set_list(&list_name, &items, sink, origin);
            }
            "SORT" => {
                items.sort();
                self.set_list(&list_name, &items, sink, origin);
            }
            "FILTER" => {
                let Some(mode) = rest.first() else { return true };
                let include = mode == "INCLUDE";
                if rest.get(1).map(|s| s.as_str()) == Some("REGEX") {
                    if let Some(pattern) = rest.get(2) {
                        if let Ok(re) = regex::Regex::new(pattern) {
                            items.retain(|i| re.is_match(i) == include);
                            self.set_list(&list_name, &items, sink, origin);
                        }
                    }
                }
            }
            "FIND" => {
                if let (Some(item), Some(out)) = (rest.first(), rest.get(1)) {
                    let pos = items.iter().position(|i| i == item).map(|i| i as i64).unwrap_or(-1);
                    self.var_set_local(out, &pos.to_string());
                }
            }
            "JOIN" => {
                if let (Some(glue), Some(out)) = (rest.first(), rest.get(1)) {
                    self.var_set_local(out, &items.join(glue));
                }
            }
            "SUBLIST" => {
                if let (Some(begin), Some(length), Some(out)) = (rest.first(), rest.get(1), rest.get(2)) {
                    let begin: usize = begin.parse().unwrap_or(0);
                    let length: i64 = length.parse().unwrap_or(-1);
                    let end = if length < 0 { items.len() } else { (begin + length as usize).min(items.len()) };
                    let slice = items.get(begin.min(items.len())..end).unwrap_or(&[]);
                    self.var_set_local(out, &slice.join(";"));
                }
            }
            "TRANSFORM" => {
                let Some(action) = rest.first().cloned() else {
                    self.error(sink, origin.clone(), "list", "TRANSFORM requires an action");
                    return true;
                };
                let mut cursor = 1usize;
                let mut replace_args: Vec<String> = Vec::new();
                if action == "REPLACE" {
                    replace_args = rest[cursor..].iter().take(2).cloned().collect();
                    cursor += replace_args.len();
                }
                let mut selection: Option<(String, Vec<i64>)> = None;
                let mut output_var: Option<String> = None;
                while cursor < rest.len() {
                    match rest[cursor].as_str() {
                        "AT" => {
                            let mut indices = Vec::new();
                            cursor += 1;
                            while cursor < rest.len() {
                                match rest[cursor].parse::<i64>() {
                                    Ok(i) => {
                                        indices.push(i);
                                        cursor += 1;
                                    }
                                    Err(_) => break,
                                }
                            }
                            selection = Some(("AT".to_string(), indices));
                        }
                        "FOR" => {
                            let start = rest.get(cursor + 1).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
                            let stop = rest.get(cursor + 2).and_then(|s| s.parse::<i64>().ok()).unwrap_or(start);
                            selection = Some(("FOR".to_string(), vec![start, stop]));
                            cursor += 3;
                        }
                        "OUTPUT_VARIABLE" => {
                            output_var = rest.get(cursor + 1).cloned();
                            cursor += 2;
                        }
                        _ => cursor += 1,
                    }
                }
                let selected: std::collections::HashSet<usize> = match &selection {
                    Some((kind, idx)) if kind == "AT" => {
                        idx.iter().filter_map(|i| resolve_index(items.len(), *i)).collect()
                    }
                    Some((kind, bounds)) if kind == "FOR" => {
                        let start = resolve_index(items.len(), bounds[0]).unwrap_or(0);
                        let stop = resolve_index(items.len(), bounds[1]).unwrap_or(items.len().saturating_sub(1));
                        (start..=stop.min(items.len().saturating_sub(1))).collect()
                    }
                    _ => (0..items.len()).collect(),
                };
                let transformed: Vec<String> = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        if !selected.contains(&i) {
                            return v.clone();
                        }
                        match action.as_str() {
                            "TOUPPER" => v.to_uppercase(),
                            "TOLOWER" => v.to_lowercase(),
                            "STRIP" => v.trim().to_string(),
                            "GENEX_STRIP" => strip_genex(v),
                            "APPEND" => format!("{v}{}", replace_args.first().map(String::as_str).unwrap_or("")),
                            "PREPEND" => format!("{}{v}", replace_args.first().map(String::as_str).unwrap_or("")),
                            "REPLACE" => {
                                if let (Some(pat), Some(repl)) = (replace_args.first(), replace_args.get(1)) {
                                    regex::Regex::new(pat).map(|re| re.replace_all(v, repl.as_str()).into_owned()).unwrap_or_else(|_| v.clone())
                                } else {
                                    v.clone()
                                }
                            }
                            _ => v.clone(),
                        }
                    })
                    .collect();
                if let Some(out) = output_var {
                    self.var_set_local(&out, &transformed.join(";"));
                } else {
                    self.set_list(&list_name, &transformed, sink, origin);
                }
            }
            _ => {
                self.unsupported(sink, origin.clone(), &format!("list({op})"));
            }
        }
        true
    }

    fn set_list(&mut self, name: &str, items: &[String], sink: &mut DiagnosticSink, origin: &EventOrigin) {
        let value = items.join(";");
        self.var_set_local(name, &value);
        self.emit(sink, origin.clone(), Event::VarSet { key: name.to_string(), value });
    }

    // --- string() --------------------------------------------------------------

    fn do_string(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(op) = args.first().cloned() else { return true };
        let rest = &args[1..];
        match op.as_str() {
            "APPEND" => {
                let Some((out, inputs)) = rest.split_first() else { return true };
                let mut current = self.var_get(out).unwrap_or_default();
                current.push_str(&inputs.concat());
                self.var_set_local(out, &current);
                self.emit(sink, origin.clone(), Event::VarSet { key: out.clone(), value: current });
            }
            "PREPEND" => {
                let Some((out, inputs)) = rest.split_first() else { return true };
                let current = self.var_get(out).unwrap_or_default();
                let value = format!("{}{current}", inputs.concat());
                self.var_set_local(out, &value);
                self.emit(sink, origin.clone(), Event::VarSet { key: out.clone(), value });
            }
            "CONCAT" => {
                let Some((out, inputs)) = rest.split_first() else { return true };
                let value = inputs.concat();
                self.var_set_local(out, &value);
                self.emit(sink, origin.clone(), Event::VarSet { key: out.clone(), value });
            }
            "JOIN" => {
                if let Some((glue, tail)) = rest.split_first() {
                    if let Some((out, inputs)) = tail.split_last().map(|(o, i)| (o, i)) {
                        self.var_set_local(out, &inputs.join(glue));
                    }
                }
            }
            "LENGTH" => {
                if let (Some(s), Some(out)) = (rest.first(), rest.get(1)) {
                    self.var_set_local(out, &s.chars().count().to_string());
                }
            }
            "SUBSTRING" => {
                if let (Some(s), Some(begin), Some(length), Some(out)) = (rest.first(), rest.get(1), rest.get(2), rest.get(3)) {
                    let chars: Vec<char> = s.chars().collect();
                    let begin: usize = begin.parse().unwrap_or(0).min(chars.len());
                    let length: i64 = length.parse().unwrap_or(-1);
                    let end = if length < 0 { chars.len() } else { (begin + length as usize).min(chars.len()) };
                    let value: String = chars.get(begin..end).unwrap_or(&[]).iter().collect();
                    self.var_set_local(out, &value);
                }
            }
            "TOLOWER" => {
                if let (Some(s), Some(out)) = (rest.first(), rest.get(1)) {
                    self.var_set_local(out, &s.to_lowercase());
                }
            }
            "TOUPPER" => {
                if let (Some(s), Some(out)) = (rest.first(), rest.get(1)) {
                    self.var_set_local(out, &s.to_uppercase());
                }
            }
            "STRIP" => {
                if let (Some(s), Some(out)) = (rest.first(), rest.get(1)) {
                    self.var_set_local(out, s.trim());
                }
            }
            "REPEAT" => {
                if let (Some(s), Some(count), Some(out)) = (rest.first(), rest.get(1), rest.get(2)) {
                    let n: usize = count.parse().unwrap_or(0);
                    self.var_set_local(out, &s.repeat(n));
                }
            }
            "COMPARE" => {
                if let (Some(kind), Some(lhs), Some(rhs), Some(out)) = (rest.first(), rest.get(1), rest.get(2), rest.get(3)) {
                    let result = match kind.as_str() {
                        "EQUAL" => lhs == rhs,
                        "NOTEQUAL" => lhs != rhs,
                        "LESS" => lhs < rhs,
                        "GREATER" => lhs > rhs,
                        "LESS_EQUAL" => lhs <= rhs,
                        "GREATER_EQUAL" => lhs >= rhs,
                        _ => false,
                    };
                    self.var_set_local(out, if result { "1" } else { "0" });
                }
            }
            "FIND" => {
                if let (Some(s), Some(sub), Some(out)) = (rest.first(), rest.get(1), rest.get(2)) {
                    let reverse = rest.get(3).map(|s| s == "REVERSE").unwrap_or(false);
                    let pos = if reverse { s.rfind(sub.as_str()) } else { s.find(sub.as_str()) };
                    self.var_set_local(out, &pos.map(|p| p as i64).unwrap_or(-1).to_string());
                }
            }
            "REPLACE" => {
                if let (Some(pat), Some(repl), Some(out)) = (rest.first(), rest.get(1), rest.get(2)) {
                    let input = rest[3..].concat();
                    self.var_set_local(out, &input.replace(pat.as_str(), repl));
                }
            }
            "MAKE_C_IDENTIFIER" => {
                if let (Some(s), Some(out)) = (rest.first(), rest.get(1)) {
                    let ident: String = s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
                    let ident = if ident.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) { format!("_{ident}") } else { ident };
                    self.var_set_local(out, &ident);
                }
            }
            "REGEX" => {
                self.do_string_regex(rest, origin, sink);
            }
            "HEX" => {
                if let (Some(s), Some(out)) = (rest.first(), rest.get(1)) {
                    self.var_set_local(out, &hex::encode(s.as_bytes()));
                }
            }
            "HASH" => {
                if let (Some(algo), Some(s), Some(out)) = (rest.first(), rest.get(1), rest.get(2)) {
                    let digest = hash_string(algo, s);
                    self.var_set_local(out, &digest);
                }
            }
            "RANDOM" => {
                let mut length = 5usize;
                let mut alphabet: Option<String> = None;
                let mut seed: Option<u64> = None;
                let mut out_idx = rest.len();
                let mut i = 0;
                while i < rest.len() {
                    match rest[i].as_str() {
                        "LENGTH" => {
                            length = rest.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(length);
                            i += 2;
                        }
                        "ALPHABET" => {
                            alphabet = rest.get(i + 1).cloned();
                            i += 2;
                        }
                        "RANDOM_SEED" => {
                            seed = rest.get(i + 1).and_then(|s| s.parse().ok());
                            i += 2;
                        }
                        _ => {
                            out_idx = i;
                            break;
                        }
                    }
                }
                if let Some(out) = rest.get(out_idx) {
                    let alphabet = alphabet.unwrap_or_else(|| {
                        "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string()
                    });
                    let value = random_string(length, &alphabet, seed);
                    self.var_set_local(out, &value);
                }
            }
            "TIMESTAMP" => {
                if let Some(out) = rest.first() {
                    let format = rest.get(1).filter(|s| !s.starts_with("UTC")).cloned();
                    let epoch = self.clock_env.now_epoch_seconds();
                    let value = format_timestamp(epoch, format.as_deref());
                    self.var_set_local(out, &value);
                }
            }
            "UUID" => {
                let mut out = None;
                let mut namespace = None;
                let mut name = None;
                let mut i = 0;
                while i < rest.len() {
                    match rest[i].as_str() {
                        "NAMESPACE" => {
                            namespace = rest.get(i + 1).cloned();
                            i += 2;
                        }
                        "NAME" => {
                            name = rest.get(i + 1).cloned();
                            i += 2;
                        }
                        "TYPE" | "UPPERCASE" => i += 1,
                        other => {
                            out = Some(other.to_string());
                            i += 1;
                        }
                    }
                }
                if let Some(out) = out {
                    let uuid = uuid_v5(namespace.as_deref().unwrap_or(""), name.as_deref().unwrap_or(""));
                    self.var_set_local(&out, &uuid);
                }
            }
            _ => {
                self.unsupported(sink, origin.clone(), &format!("string({op})"));
            }
        }
        true
    }

    fn do_string_regex(&mut self, rest: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) {
        let Some(sub) = rest.first() else { return };
        match sub.as_str() {
            "MATCH" => {
                if let (Some(pattern), Some(out), Some(input)) = (rest.get(1), rest.get(2), rest.get(3)) {
                    match regex::Regex::new(pattern) {
                        Ok(re) => {
                            let value = re.find(input).map(|m| m.as_str().to_string()).unwrap_or_default();
                            self.var_set_local(out, &value);
                        }
                        Err(e) => self.error(sink, origin.clone(), "string", format!("invalid regex: {e}")),
                    }
                }
            }
            "MATCHALL" => {
                if let (Some(pattern), Some(out), Some(input)) = (rest.get(1), rest.get(2), rest.get(3)) {
                    match regex::Regex::new(pattern) {
                        Ok(re) => {
                            let matches: Vec<String> = re.find_iter(input).map(|m| m.as_str().to_string()).collect();
                            self.var_set_local(out, &matches.join(";"));
                        }
                        Err(e) => self.error(sink, origin.clone(), "string", format!("invalid regex: {e}")),
                    }
                }
            }
            "REPLACE" => {
                if let (Some(pattern), Some(replacement), Some(out)) = (rest.get(1), rest.get(2), rest.get(3)) {
                    let input = rest[4..].concat();
                    match regex::Regex::new(pattern) {
                        Ok(re) => {
                            let cmake_repl = replacement.replace('\\', "$");
                            let value = re.replace_all(&input, cmake_repl.as_str()).into_owned();
                            self.var_set_local(out, &value);
                        }
                        Err(e) => self.error(sink, origin.clone(), "string", format!("invalid regex: {e}")),
                    }
                }
            }
            _ => self.unsupported(sink, origin.clone(), &format!("string(REGEX {sub})")),
        }
    }

    // --- math() ----------------------------------------------------------------

    fn do_math(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        if args.first().map(|s| s.as_str()) != Some("EXPR") {
            self.error(sink, origin.clone(), "math", "expected EXPR");
            return true;
        }
        let (Some(out), Some(expr)) = (args.get(1), args.get(2)) else {
            self.error(sink, origin.clone(), "math", "missing output variable or expression");
            return true;
        };
        match eval_integer_expr(expr) {
            Ok(value) => self.var_set_local(out, &value.to_string()),
            Err(msg) => self.error(sink, origin.clone(), "math", msg),
        }
        true
    }

    // --- include() / add_subdirectory() -----------------------------------

    fn do_include(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(file) = args.first().cloned() else {
            self.error(sink, origin.clone(), "include", "missing file/module name");
            return true;
        };
        let optional = args.iter().any(|a| a == "OPTIONAL");
        let result_var = args.iter().position(|a| a == "RESULT_VARIABLE").and_then(|p| args.get(p + 1).cloned());

        let path = self.current_dir().source_dir.join(&file);
        let canonical = path.clone();
        if self.include_stack.contains(&canonical) {
            self.error(sink, origin.clone(), "include", format!("recursive include of {}", canonical.display()));
            return true;
        }

        match self.workspace_io.read_file(&path) {
            Ok(crate::adapters::ReadOutcome::Found(bytes)) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.include_stack.push(canonical);
                let saved_file = self.current_file.replace(path.clone());
                let ast = parse_source(&text, sink, Some(path.clone()), 64, 64);
                self.exec_block(&ast, sink);
                self.current_file = saved_file;
                self.include_stack.pop();
                if let Some(var) = result_var {
                    self.var_set_local(&var, &path.display().to_string());
                }
            }
            Ok(crate::adapters::ReadOutcome::NotFound) => {
                if let Some(var) = result_var {
                    self.var_set_local(&var, "NOTFOUND");
                }
                if !optional {
                    self.error(sink, origin.clone(), "include", format!("file not found: {}", path.display()));
                }
            }
            Err(e) => self.error(sink, origin.clone(), "include", format!("{e}")),
        }
        true
    }

    fn do_add_subdirectory(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(dir) = args.first().cloned() else {
            self.error(sink, origin.clone(), "add_subdirectory", "missing directory");
            return true;
        };
        let bin_subdir = args.get(1).filter(|a| a.as_str() != "EXCLUDE_FROM_ALL").cloned().unwrap_or_else(|| dir.clone());

        let parent = self.current_dir().clone();
        let source_dir = parent.source_dir.join(&dir);
        let binary_dir = parent.binary_dir.join(&bin_subdir);

        self.emit(
            sink,
            origin.clone(),
            Event::DirPush { source_dir: source_dir.display().to_string(), binary_dir: binary_dir.display().to_string() },
        );
        self.directory_stack.push(DirFrame { source_dir: source_dir.clone(), binary_dir: binary_dir.clone() });
        self.scopes.push(std::collections::HashMap::new());

        let list_file = source_dir.join("CMakeLists.txt");
        match self.workspace_io.read_file(&list_file) {
            Ok(crate::adapters::ReadOutcome::Found(bytes)) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let saved_file = self.current_file.replace(list_file.clone());
                let ast = parse_source(&text, sink, Some(list_file.clone()), 64, 64);
                self.exec_block(&ast, sink);
                self.current_file = saved_file;
            }
            Ok(crate::adapters::ReadOutcome::NotFound) => {
                self.error(sink, origin.clone(), "add_subdirectory", format!("missing CMakeLists.txt in {}", source_dir.display()));
            }
            Err(e) => self.error(sink, origin.clone(), "add_subdirectory", format!("{e}")),
        }

        self.scopes.pop();
        self.directory_stack.pop();
        self.emit(sink, origin.clone(), Event::DirPop);
        true
    }

    // --- testing / install / packages --------------------------------------

    fn do_add_test(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let (name, command) = if args.first().map(|s| s.as_str()) == Some("NAME") {
            let name = args.get(1).cloned().unwrap_or_default();
            let cmd_pos = args.iter().position(|a| a == "COMMAND").unwrap_or(args.len());
            let command = args.get(cmd_pos + 1..).map(|s| s.to_vec()).unwrap_or_default();
            (name, command)
        } else {
            let name = args.first().cloned().unwrap_or_default();
            (name, args.get(1..).map(|s| s.to_vec()).unwrap_or_default())
        };
        let working_dir = args
            .iter()
            .position(|a| a == "WORKING_DIRECTORY")
            .and_then(|p| args.get(p + 1).cloned());
        let command_expand_lists = args.iter().any(|a| a == "COMMAND_EXPAND_LISTS");
        self.emit(sink, origin.clone(), Event::TestAdd { name, command, working_dir, command_expand_lists });
        true
    }

    fn do_install(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(mode) = args.first().cloned() else { return true };
        let rule_type = match mode.as_str() {
            "TARGETS" => InstallRuleType::Target,
            "FILES" => InstallRuleType::File,
            "PROGRAMS" => InstallRuleType::Program,
            "DIRECTORY" => InstallRuleType::Directory,
            _ => {
                self.unsupported(sink, origin.clone(), &format!("install({mode})"));
                return true;
            }
        };
        let dest_pos = args.iter().position(|a| a == "DESTINATION");
        let destination = dest_pos.and_then(|p| args.get(p + 1).cloned());
        let items_end = dest_pos.unwrap_or(args.len());
        for item in &args[1..items_end] {
            self.emit(
                sink,
                origin.clone(),
                Event::InstallAddRule { rule_type, item: item.clone(), destination: destination.clone() },
            );
        }
        true
    }

    fn do_find_package(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(name) = args.first().cloned() else { return true };
        let required = args.iter().any(|a| a == "REQUIRED");
        let config_only = args.iter().any(|a| a == "CONFIG" || a == "NO_MODULE");
        let module_only = args.iter().any(|a| a == "MODULE");

        // §4.5.5: default tries Module mode first, falling back to Config
        // mode; an explicit CONFIG/NO_MODULE or MODULE keyword pins it.
        let try_module = !config_only;
        let try_config = !module_only;

        let mut mode = "MODULE";
        let mut location = None;
        if try_module {
            location = self.find_module_file(&name);
        }
        if location.is_none() && try_config {
            mode = "CONFIG";
            location = self.find_package_config_file(&name);
        }

        let found = location.is_some();
        self.var_set_local(&format!("{name}_FOUND"), if found { "1" } else { "0" });
        if let Some(dir) = location.as_ref().and_then(|p| std::path::Path::new(p).parent()) {
            self.var_set_local(&format!("{name}_DIR"), &dir.display().to_string());
        }
        if required && !found {
            self.error(sink, origin.clone(), "find_package", format!("could not find package {name}"));
        }
        self.emit(
            sink,
            origin.clone(),
            Event::FindPackage { package_name: name, mode: mode.to_string(), required, found, location },
        );
        true
    }

    /// Module mode (§4.5.5, mirroring `include()`'s module search order):
    /// `CMAKE_MODULE_PATH` entries, then the built-in modules directory,
    /// each checked for `Find<name>.cmake`.
    fn find_module_file(&mut self, name: &str) -> Option<String> {
        let filename = format!("Find{name}.cmake");
        for dir in self.semicolon_list_var("CMAKE_MODULE_PATH") {
            let candidate = std::path::Path::new(&dir).join(&filename);
            if self.workspace_io.file_exists(&candidate) {
                return Some(candidate.display().to_string());
            }
        }
        if let Some(root) = self.var_get("CMAKE_ROOT") {
            let candidate = std::path::Path::new(&root).join("Modules").join(&filename);
            if self.workspace_io.file_exists(&candidate) {
                return Some(candidate.display().to_string());
            }
        }
        None
    }

    /// Config mode: an already-set `<name>_DIR` is tried first (as CMake
    /// does, so a previous search or a user cache entry short-circuits it),
    /// then every `CMAKE_PREFIX_PATH` entry is probed at the two
    /// conventional layouts CMake installs config files under.
    fn find_package_config_file(&mut self, name: &str) -> Option<String> {
        let config_names = [format!("{name}Config.cmake"), format!("{}-config.cmake", name.to_ascii_lowercase())];

        if let Some(dir) = self.var_get(&format!("{name}_DIR")).filter(|v| !v.is_empty() && v != "NOTFOUND") {
            for config_name in &config_names {
                let candidate = std::path::Path::new(&dir).join(config_name);
                if self.workspace_io.file_exists(&candidate) {
                    return Some(candidate.display().to_string());
                }
            }
        }

        for prefix in self.semicolon_list_var("CMAKE_PREFIX_PATH") {
            let prefix_path = std::path::Path::new(&prefix);
            let search_dirs = [prefix_path.join("lib").join("cmake").join(name), prefix_path.to_path_buf()];
            for dir in &search_dirs {
                for config_name in &config_names {
                    let candidate = dir.join(config_name);
                    if self.workspace_io.file_exists(&candidate) {
                        return Some(candidate.display().to_string());
                    }
                }
            }
        }
        None
    }

    fn semicolon_list_var(&mut self, name: &str) -> Vec<String> {
        self.var_get(name).map(|v| v.split(';').filter(|s| !s.is_empty()).map(str::to_string).collect()).unwrap_or_default()
    }

    fn do_find_x(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink, kind: FindKind) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(out) = args.first().cloned() else { return true };
        if self.var_get(&out).filter(|v| !v.is_empty() && v != "NOTFOUND" && !v.ends_with("-NOTFOUND")).is_some() {
            return true; // already resolved; find_* commands never re-search.
        }
        let names_end = args.iter().position(|a| matches!(a.as_str(), "PATHS" | "HINTS" | "DOC" | "REQUIRED")).unwrap_or(args.len());
        let candidates: Vec<String> = args[1..names_end].to_vec();
        let search_dirs: Vec<String> = args
            .iter()
            .position(|a| a == "PATHS" || a == "HINTS")
            .map(|p| args[p + 1..].iter().take_while(|a| !matches!(a.as_str(), "DOC" | "REQUIRED")).cloned().collect())
            .unwrap_or_default();

        let source_dir_text = self.current_dir().source_dir.display().to_string();
        let mut found = None;
        'search: for dir in search_dirs.iter().chain(std::iter::once(&source_dir_text)) {
            for name in &candidates {
                let candidate = std::path::Path::new(dir.as_str()).join(kind.decorate(name));
                if self.workspace_io.file_exists(&candidate) {
                    found = Some(candidate.display().to_string());
                    break 'search;
                }
            }
        }

        match found {
            Some(path) => self.var_set_local(&out, &path),
            None => self.var_set_local(&out, &format!("{out}-NOTFOUND")),
        }
        true
    }

    // --- execute_process() / exec_program() ---------------------------------

    /// Only the first `COMMAND` group is run; CMake's multi-`COMMAND` pipe
    /// chaining has no equivalent in the single-argv `ProcessRunner` adapter.
    fn do_execute_process(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let mut command_starts: Vec<usize> = args.iter().enumerate().filter(|(_, a)| *a == "COMMAND").map(|(i, _)| i).collect();
        command_starts.push(args.len());
        let Some(&first) = command_starts.first() else {
            self.error(sink, origin.clone(), "execute_process", "requires at least one COMMAND");
            return true;
        };
        const OPTION_KEYWORDS: &[&str] = &[
            "WORKING_DIRECTORY",
            "RESULT_VARIABLE",
            "RESULTS_VARIABLE",
            "OUTPUT_VARIABLE",
            "ERROR_VARIABLE",
            "OUTPUT_STRIP_TRAILING_WHITESPACE",
            "ERROR_STRIP_TRAILING_WHITESPACE",
            "OUTPUT_QUIET",
            "ERROR_QUIET",
            "TIMEOUT",
            "ENCODING",
            "COMMAND_ECHO",
            "ECHO_OUTPUT_VARIABLE",
            "ECHO_ERROR_VARIABLE",
        ];
        let next_command = command_starts.get(1).copied().unwrap_or(args.len());
        let first_option = args[first + 1..next_command].iter().position(|a| OPTION_KEYWORDS.contains(&a.as_str())).map(|p| first + 1 + p).unwrap_or(next_command);
        let argv: Vec<String> = args[first + 1..first_option].to_vec();
        if argv.is_empty() {
            self.error(sink, origin.clone(), "execute_process", "COMMAND requires an executable");
            return true;
        }

        let working_dir = args.iter().position(|a| a == "WORKING_DIRECTORY").and_then(|p| args.get(p + 1).cloned());
        let result_var = args.iter().position(|a| a == "RESULT_VARIABLE").and_then(|p| args.get(p + 1).cloned());
        let output_var = args.iter().position(|a| a == "OUTPUT_VARIABLE").and_then(|p| args.get(p + 1).cloned());
        let error_var = args.iter().position(|a| a == "ERROR_VARIABLE").and_then(|p| args.get(p + 1).cloned());
        let strip_output = args.iter().any(|a| a == "OUTPUT_STRIP_TRAILING_WHITESPACE");
        let strip_error = args.iter().any(|a| a == "ERROR_STRIP_TRAILING_WHITESPACE");
        let timeout = args
            .iter()
            .position(|a| a == "TIMEOUT")
            .and_then(|p| args.get(p + 1))
            .and_then(|v| v.parse::<f64>().ok())
            .map(std::time::Duration::from_secs_f64);

        let cwd = working_dir.as_ref().map(|d| self.current_dir().source_dir.join(d)).unwrap_or_else(|| self.current_dir().source_dir.clone());
        let env = std::collections::HashMap::new();
        match self.process_runner.run(&argv, Some(cwd.as_path()), &env, timeout) {
            Ok(outcome) => {
                if let Some(var) = output_var {
                    let value = if strip_output { outcome.stdout.trim().to_string() } else { outcome.stdout };
                    self.var_set_local(&var, &value);
                }
                if let Some(var) = error_var {
                    let value = if strip_error { outcome.stderr.trim().to_string() } else { outcome.stderr };
                    self.var_set_local(&var, &value);
                }
                if let Some(var) = result_var {
                    let value = if outcome.timed_out {
                        "Process terminated due to timeout".to_string()
                    } else {
                        outcome.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-1".to_string())
                    };
                    self.var_set_local(&var, &value);
                }
            }
            Err(e) => self.error(sink, origin.clone(), "execute_process", format!("{e}")),
        }
        true
    }

    fn do_exec_program(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(executable) = args.first().cloned() else {
            self.error(sink, origin.clone(), "exec_program", "requires an executable");
            return true;
        };
        let args_pos = args.iter().position(|a| a == "ARGS");
        let dir = args.get(1).filter(|a| a.as_str() != "ARGS").cloned();
        let extra_args: Vec<String> =
            args_pos.map(|p| args[p + 1..].iter().take_while(|a| !matches!(a.as_str(), "OUTPUT_VARIABLE" | "RETURN_VALUE")).cloned().collect()).unwrap_or_default();
        let mut argv = vec![executable];
        argv.extend(extra_args);

        let output_var = args.iter().position(|a| a == "OUTPUT_VARIABLE").and_then(|p| args.get(p + 1).cloned());
        let return_var = args.iter().position(|a| a == "RETURN_VALUE").and_then(|p| args.get(p + 1).cloned());
        let cwd = dir.map(|d| self.current_dir().source_dir.join(d)).unwrap_or_else(|| self.current_dir().source_dir.clone());
        let env = std::collections::HashMap::new();
        match self.process_runner.run(&argv, Some(cwd.as_path()), &env, None) {
            Ok(outcome) => {
                if let Some(var) = output_var {
                    let mut combined = outcome.stdout;
                    combined.push_str(&outcome.stderr);
                    self.var_set_local(&var, combined.trim());
                }
                if let Some(var) = return_var {
                    self.var_set_local(&var, &outcome.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-1".to_string()));
                }
            }
            Err(e) => self.error(sink, origin.clone(), "exec_program", format!("{e}")),
        }
        true
    }

    // --- file() / configure_file() / path inspection -----------------------

    fn do_file(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let Some(op) = args.first().cloned() else { return true };
        match op.as_str() {
            "WRITE" | "APPEND" => {
                let (Some(path), inputs) = (args.get(1), &args[2.min(args.len())..]) else { return true };
                let text = inputs.concat();
                let full = self.current_dir().binary_dir.join(path);
                let content = if op == "APPEND" {
                    let mut existing = match self.workspace_io.read_file(&full) {
                        Ok(crate::adapters::ReadOutcome::Found(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                        _ => String::new(),
                    };
                    existing.push_str(&text);
                    existing
                } else {
                    text
                };
                if let Err(e) = self.workspace_io.write_file(&full, content.as_bytes()) {
                    self.error(sink, origin.clone(), "file", format!("{e}"));
                }
            }
            "READ" => {
                if let (Some(path), Some(out)) = (args.get(1), args.get(2)) {
                    let full = self.current_dir().source_dir.join(path);
                    match self.workspace_io.read_file(&full) {
                        Ok(crate::adapters::ReadOutcome::Found(bytes)) => {
                            self.var_set_local(out, &String::from_utf8_lossy(&bytes));
                        }
                        Ok(crate::adapters::ReadOutcome::NotFound) => {
                            self.error(sink, origin.clone(), "file", format!("file not found: {}", full.display()));
                        }
                        Err(e) => self.error(sink, origin.clone(), "file", format!("{e}")),
                    }
                }
            }
            "GLOB" | "GLOB_RECURSE" => {
                if let Some((out, patterns)) = args.get(1..).and_then(|rest| rest.split_first()) {
                    let out = out.clone();
                    let dir = self.current_dir().source_dir.clone();
                    let mut matches = Vec::new();
                    if let Ok(entries) = self.workspace_io.list_dir(&dir) {
                        for entry in entries {
                            if patterns.iter().any(|p| glob_match(p, &entry)) {
                                matches.push(dir.join(&entry).display().to_string());
                            }
                        }
                    }
                    matches.sort();
                    self.var_set_local(&out, &matches.join(";"));
                }
            }
            "MAKE_DIRECTORY" => {
                for dir in &args[1..] {
                    let full = self.current_dir().binary_dir.join(dir);
                    if let Err(e) = self.workspace_io.make_directory(&full) {
                        self.error(sink, origin.clone(), "file", format!("{e}"));
                    }
                }
            }
            _ => self.unsupported(sink, origin.clone(), &format!("file({op})")),
        }
        true
    }

    fn do_configure_file(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let (Some(input), Some(output)) = (args.first(), args.get(1)) else {
            self.error(sink, origin.clone(), "configure_file", "requires input and output paths");
            return true;
        };
        let copy_only = args.iter().any(|a| a == "COPYONLY");
        let at_only = args.iter().any(|a| a == "@ONLY");

        let in_path = self.current_dir().source_dir.join(input);
        let out_path = self.current_dir().binary_dir.join(output);
        let text = match self.workspace_io.read_file(&in_path) {
            Ok(crate::adapters::ReadOutcome::Found(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(crate::adapters::ReadOutcome::NotFound) => {
                self.error(sink, origin.clone(), "configure_file", format!("file not found: {}", in_path.display()));
                return true;
            }
            Err(e) => {
                self.error(sink, origin.clone(), "configure_file", format!("{e}"));
                return true;
            }
        };
        let rendered = if copy_only { text } else { configure_substitute(&text, self, at_only) };
        if let Err(e) = self.workspace_io.write_file(&out_path, rendered.as_bytes()) {
            self.error(sink, origin.clone(), "configure_file", format!("{e}"));
        }
        true
    }

    fn do_get_filename_component(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        let (Some(out), Some(input), Some(component)) = (args.first(), args.get(1), args.get(2)) else {
            self.error(sink, origin.clone(), "get_filename_component", "requires <out> <input> <COMPONENT>");
            return true;
        };
        let path = std::path::Path::new(input);
        let value = match component.as_str() {
            "DIRECTORY" | "PATH" => path.parent().map(|p| p.display().to_string()).unwrap_or_default(),
            "NAME" => path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            "EXT" => path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default(),
            "NAME_WE" => path.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            "ABSOLUTE" => {
                if path.is_absolute() {
                    path.display().to_string()
                } else {
                    self.current_dir().source_dir.join(path).display().to_string()
                }
            }
            _ => {
                self.unsupported(sink, origin.clone(), &format!("get_filename_component({component})"));
                return true;
            }
        };
        self.var_set_local(out, &value);
        true
    }

    fn do_cmake_path(&mut self, cmd: &Command, origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let args = self.expand_args(&cmd.args);
        if args.first().map(|s| s.as_str()) != Some("GET") {
            self.unsupported(sink, origin.clone(), "cmake_path");
            return true;
        }
        let (Some(input), Some(component), Some(out)) = (args.get(1), args.get(2), args.get(3)) else {
            self.error(sink, origin.clone(), "cmake_path", "GET requires <path> <component> <out>");
            return true;
        };
        let path = std::path::Path::new(input);
        let value = match component.as_str() {
            "FILENAME" => path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            "STEM" => path.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            "EXTENSION" => path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default(),
            "PARENT_PATH" => path.parent().map(|p| p.display().to_string()).unwrap_or_default(),
            _ => {
                self.unsupported(sink, origin.clone(), &format!("cmake_path(GET {component})"));
                return true;
            }
        };
        self.var_set_local(out, &value);
        true
    }

}

enum FindKind {
    Program,
    Library,
    File,
    Path,
}

impl FindKind {
    fn decorate(&self, name: &str) -> String {
        match self {
            FindKind::Library => format!("lib{name}.so"),
            _ => name.to_string(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value.split(';').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
}

fn hash_string(algo: &str, input: &str) -> String {
    use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
    match algo {
        "SHA224" => hex::encode(Sha224::digest(input.as_bytes())),
        "SHA256" => hex::encode(Sha256::digest(input.as_bytes())),
        "SHA384" => hex::encode(Sha384::digest(input.as_bytes())),
        "SHA512" => hex::encode(Sha512::digest(input.as_bytes())),
        // MD5/SHA1 are not carried as dependencies; fall back to the
        // strongest available digest rather than a hand-rolled weak hash.
        _ => hex::encode(Sha256::digest(input.as_bytes())),
    }
}

fn random_string(length: usize, alphabet: &str, seed: Option<u64>) -> String {
    let letters: Vec<char> = alphabet.chars().collect();
    if letters.is_empty() {
        return String::new();
    }
    let mut state = seed.unwrap_or(0x9E3779B97F4A7C15).wrapping_mul(2685821657736338717).wrapping_add(1);
    (0..length)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            letters[(state as usize) % letters.len()]
        })
        .collect()
}

fn uuid_v5(namespace: &str, name: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let b = &digest[..16];
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-5{:01x}{:02x}-{:01x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5], b[6] & 0x0f, b[7], (b[8] & 0x3f) | 0x80, b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    )
}

fn format_timestamp(epoch: u64, format: Option<&str>) -> String {
    const DAYS_PER_400Y: i64 = 146097;
    let days = (epoch / 86_400) as i64;
    let secs_of_day = (epoch % 86_400) as i64;
    let (hour, minute, second) = (secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60);

    let z = days + 719468;
    let era = if z >= 0 { z } else { z - DAYS_PER_400Y + 1 } / DAYS_PER_400Y;
    let doe = (z - era * DAYS_PER_400Y) as i64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = if month <= 2 { year + 1 } else { year };

    let pattern = format.unwrap_or("%Y-%m-%dT%H:%M:%S");
    pattern
        .replace("%Y", &format!("{year:04}"))
        .replace("%m", &format!("{month:02}"))
        .replace("%d", &format!("{day:02}"))
        .replace("%H", &format!("{hour:02}"))
        .replace("%M", &format!("{minute:02}"))
        .replace("%S", &format!("{second:02}"))
}

fn strip_genex(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0i32;
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'<') {
            chars.next();
            depth += 1;
            continue;
        }
        if c == '>' && depth > 0 {
            depth -= 1;
            continue;
        }
        if depth == 0 {
            out.push(c);
        }
    }
    out
}

fn resolve_index(len: usize, idx: i64) -> Option<usize> {
    if idx >= 0 {
        let i = idx as usize;
        if i < len { Some(i) } else { None }
    } else {
        let back = (-idx) as usize;
        if back <= len { Some(len - back) } else { None }
    }
}

fn parse_major_minor(version: &str) -> Option<(u64, u64)> {
    let head = version.split("...").next().unwrap_or(version);
    let mut parts = head.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    Some((major, minor))
}

/// A minimal left-to-right integer expression evaluator for `math(EXPR ...)`:
/// `*`/`/`/`%` bind tighter than `+`/`-`, parentheses nest.
fn eval_integer_expr(expr: &str) -> Result<i64, String> {
    let tokens = tokenize_expr(expr)?;
    let mut pos = 0;
    let value = parse_add_sub(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(format!("unexpected trailing tokens in expression `{expr}`"));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize_expr(expr: &str) -> Result<Vec<Tok>, String> {
    let mut out = Vec::new();
    let bytes: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '-' && out.last().map(|t| matches!(t, Tok::Num(_) | Tok::RParen)).unwrap_or(false) == false && bytes.get(i + 1).map(|n| n.is_ascii_digit()).unwrap_or(false)) {
            let start = i;
            if c == '-' {
                i += 1;
            }
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            out.push(Tok::Num(text.parse().map_err(|_| format!("invalid number `{text}`"))?));
            continue;
        }
        match c {
            '+' | '-' | '*' | '/' | '%' => out.push(Tok::Op(c)),
            '(' => out.push(Tok::LParen),
            ')' => out.push(Tok::RParen),
            _ => return Err(format!("unexpected character `{c}` in expression")),
        }
        i += 1;
    }
    Ok(out)
}

fn parse_add_sub(tokens: &[Tok], pos: &mut usize) -> Result<i64, String> {
    let mut value = parse_mul_div(tokens, pos)?;
    while let Some(Tok::Op(op @ ('+' | '-'))) = tokens.get(*pos) {
        let op = *op;
        *pos += 1;
        let rhs = parse_mul_div(tokens, pos)?;
        value = if op == '+' { value + rhs } else { value - rhs };
    }
    Ok(value)
}

fn parse_mul_div(tokens: &[Tok], pos: &mut usize) -> Result<i64, String> {
    let mut value = parse_primary(tokens, pos)?;
    while let Some(Tok::Op(op @ ('*' | '/' | '%'))) = tokens.get(*pos) {
        let op = *op;
        *pos += 1;
        let rhs = parse_primary(tokens, pos)?;
        value = match op {
            '*' => value * rhs,
            '/' => value.checked_div(rhs).ok_or_else(|| "division by zero".to_string())?,
            _ => value.checked_rem(rhs).ok_or_else(|| "division by zero".to_string())?,
        };
    }
    Ok(value)
}

fn parse_primary(tokens: &[Tok], pos: &mut usize) -> Result<i64, String> {
    match tokens.get(*pos) {
        Some(Tok::Num(n)) => {
            *pos += 1;
            Ok(*n)
        }
        Some(Tok::LParen) => {
            *pos += 1;
            let value = parse_add_sub(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Tok::RParen) => {
                    *pos += 1;
                    Ok(value)
                }
                _ => Err("missing closing parenthesis".to_string()),
            }
        }
        other => Err(format!("unexpected token {other:?}")),
    }
}

fn glob_match(pattern: &str, name: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    pattern == name
}

/// Renders `configure_file`'s two substitution syntaxes: `${VAR}` always, and
/// `@VAR@` (the only form honored when `@ONLY` is given).
fn configure_substitute(text: &str, ctx: &Evaluator, at_only: bool) -> String {
    let dollar_expanded = if at_only { text.to_string() } else { super::expand::expand_text(text, ctx) };
    let mut out = String::new();
    let bytes = dollar_expanded.as_str();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes.as_bytes()[i] == b'@' {
            if let Some(end) = bytes[i + 1..].find('@') {
                let name = &bytes[i + 1..i + 1 + end];
                if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !name.is_empty() {
                    out.push_str(&ctx.var_get(name).unwrap_or_default());
                    i = i + 1 + end + 1;
                    continue;
                }
            }
        }
        let ch_len = bytes[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&bytes[i..i + ch_len]);
        i += ch_len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorConfig;
    use crate::diagnostics::DiagnosticSink;
    use crate::evaluator::EvaluatorInit;
    use crate::test_support::{FakeClockEnv, FakeProcessRunner, FakeWorkspaceIo};
    use std::path::PathBuf;

    fn run(src: &str) -> (crate::events::EventStream, DiagnosticSink) {
        run_with_config(src, EvaluatorConfig::default())
    }

    fn run_with_config(src: &str, config: EvaluatorConfig) -> (crate::events::EventStream, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let ast = parse_source(src, &mut sink, None, 64, 64);
        let io = FakeWorkspaceIo::new();
        let proc = FakeProcessRunner::new();
        let mut clock = FakeClockEnv::new(1_700_000_000);
        let init = EvaluatorInit {
            workspace_io: &io,
            process_runner: &proc,
            clock_env: &mut clock,
            config,
            strict: false,
            source_dir: PathBuf::from("/src"),
            binary_dir: PathBuf::from("/build"),
            current_file: Some(PathBuf::from("CMakeLists.txt")),
        };
        let ev = Evaluator::new(init);
        ev.run(&ast, &mut sink)
    }

    fn run_with_io(src: &str, io: FakeWorkspaceIo, proc: FakeProcessRunner) -> (crate::events::EventStream, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let ast = parse_source(src, &mut sink, None, 64, 64);
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
        ev.run(&ast, &mut sink)
    }

    #[test]
    fn project_with_version_populates_component_variables() {
        let (stream, sink) = run("project(demo VERSION 1.2.3)\n");
        assert!(!sink.has_errors());
        let found = stream.iter().any(|r| matches!(&r.event, Event::ProjectDeclare { version: Some(v), .. } if v == "1.2.3"));
        assert!(found);
    }

    #[test]
    fn cached_variable_cmp0126_old_prefers_cache_over_local() {
        let (stream, sink) = run(
            "set(X from_local)\nset(X from_cache CACHE STRING \"\")\nadd_executable(app main.c)\ntarget_compile_definitions(app PRIVATE X=${X})\n",
        );
        assert!(!sink.has_errors());
        let item = stream.iter().find_map(|r| match &r.event {
            Event::TargetCompileDefinitions { item, .. } => Some(item.value.clone()),
            _ => None,
        });
        assert_eq!(item, Some("X=from_cache".to_string()));
    }

    #[test]
    fn cached_variable_cmp0126_new_prefers_local_over_cache() {
        let (stream, sink) = run(
            "cmake_policy(SET CMP0126 NEW)\nset(X from_local)\nset(X from_cache CACHE STRING \"\")\nadd_executable(app main.c)\ntarget_compile_definitions(app PRIVATE X=${X})\n",
        );
        assert!(!sink.has_errors());
        let item = stream.iter().find_map(|r| match &r.event {
            Event::TargetCompileDefinitions { item, .. } => Some(item.value.clone()),
            _ => None,
        });
        assert_eq!(item, Some("X=from_local".to_string()));
    }

    #[test]
    fn list_append_and_join_round_trip() {
        let (stream, sink) = run("set(L a b)\nlist(APPEND L c)\nlist(JOIN L \"-\" OUT)\nmessage(STATUS \"${OUT}\")\n");
        assert!(!sink.has_errors());
        let _ = stream;
    }

    #[test]
    fn math_expr_respects_operator_precedence() {
        assert_eq!(eval_integer_expr("2 + 3 * 4").unwrap(), 14);
        assert_eq!(eval_integer_expr("(2 + 3) * 4").unwrap(), 20);
    }

    #[test]
    fn cmake_minimum_required_sets_policy_baseline_for_cmp0126() {
        let (stream, sink) = run(
            "cmake_minimum_required(VERSION 3.21)\nset(X from_local)\nset(X from_cache CACHE STRING \"\")\nadd_executable(app main.c)\ntarget_compile_definitions(app PRIVATE X=${X})\n",
        );
        assert!(!sink.has_errors());
        let item = stream.iter().find_map(|r| match &r.event {
            Event::TargetCompileDefinitions { item, .. } => Some(item.value.clone()),
            _ => None,
        });
        assert_eq!(item, Some("X=from_local".to_string()));
    }

    #[test]
    fn message_fatal_error_halts_further_processing_when_continue_is_disabled() {
        let config = EvaluatorConfig { continue_on_fatal_error: false, ..EvaluatorConfig::default() };
        let (stream, sink) =
            run_with_config("message(FATAL_ERROR \"boom\")\nadd_executable(app main.c)\n", config);
        assert!(sink.has_errors());
        let declared_target = stream.iter().any(|r| matches!(&r.event, Event::TargetDeclare { .. }));
        assert!(!declared_target);
    }

    #[test]
    fn message_fatal_error_continues_by_default() {
        let (stream, sink) = run("message(FATAL_ERROR \"boom\")\nadd_executable(app main.c)\n");
        assert!(sink.has_errors());
        let declared_target = stream.iter().any(|r| matches!(&r.event, Event::TargetDeclare { .. }));
        assert!(declared_target);
    }

    #[test]
    fn message_check_fail_without_matching_check_start_is_an_error() {
        let (_stream, sink) = run("message(CHECK_FAIL \"done\")\n");
        assert!(sink.has_errors());
    }

    #[test]
    fn message_check_pass_balances_check_start() {
        let (_stream, sink) = run("message(CHECK_START \"looking\")\nmessage(CHECK_PASS \"found it\")\n");
        assert!(!sink.has_errors());
    }

    #[test]
    fn list_transform_touppers_selected_indices_only() {
        let (_stream, sink) = run(
            "set(L aa bb cc)\nlist(TRANSFORM L TOUPPER AT 0 2)\nmessage(STATUS \"${L}\")\n",
        );
        assert!(!sink.has_errors());
        assert!(sink.records().iter().any(|d| d.cause.contains("AA;bb;CC")));
    }

    #[test]
    fn list_transform_replace_honors_output_variable() {
        let (_stream, sink) = run(
            "set(L foo.c foo.h)\nlist(TRANSFORM L REPLACE \"\\\\.c$\" \".o\" OUTPUT_VARIABLE OUT)\nmessage(STATUS \"${OUT}\")\n",
        );
        assert!(!sink.has_errors());
        assert!(sink.records().iter().any(|d| d.cause.contains("foo.o;foo.h")));
    }

    #[test]
    fn string_hash_sha256_is_stable_and_lowercase_hex() {
        let (_stream, sink) = run("string(HASH SHA256 \"hello\" OUT)\nmessage(STATUS \"${OUT}\")\n");
        assert!(!sink.has_errors());
        let found = sink
            .records()
            .iter()
            .any(|d| d.cause.contains("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"));
        assert!(found);
    }

    #[test]
    fn string_random_respects_requested_length() {
        let (_stream, sink) = run("string(RANDOM LENGTH 12 RANDOM_SEED 7 OUT)\nmessage(STATUS \"${OUT}\")\n");
        assert!(!sink.has_errors());
        let note = sink.records().iter().find(|d| d.component == "message").expect("note recorded");
        assert_eq!(note.cause.len(), 12);
    }

    #[test]
    fn string_timestamp_formats_from_clock_env() {
        let (_stream, sink) = run("string(TIMESTAMP OUT \"%Y-%m-%d\")\nmessage(STATUS \"${OUT}\")\n");
        assert!(!sink.has_errors());
        assert!(sink.records().iter().any(|d| d.cause.contains("2023-")));
    }

    #[test]
    fn find_package_prefers_module_file_over_config() {
        let io = FakeWorkspaceIo::new()
            .with_file("/opt/modules/FindZlib.cmake", "set(ZLIB_FOUND 1)")
            .with_file("/opt/prefix/lib/cmake/Zlib/ZlibConfig.cmake", "set(ZLIB_FOUND 1)");
        let (stream, sink) = run_with_io(
            "set(CMAKE_MODULE_PATH \"/opt/modules\")\nset(CMAKE_PREFIX_PATH \"/opt/prefix\")\nfind_package(Zlib REQUIRED)\n",
            io,
            FakeProcessRunner::new(),
        );
        assert!(!sink.has_errors());
        let event = stream.iter().find_map(|r| match &r.event {
            Event::FindPackage { mode, found, location, .. } => Some((mode.clone(), *found, location.clone())),
            _ => None,
        });
        assert_eq!(event, Some(("MODULE".to_string(), true, Some("/opt/modules/FindZlib.cmake".to_string()))));
    }

    #[test]
    fn find_package_falls_back_to_config_when_no_module_found() {
        let io = FakeWorkspaceIo::new().with_file("/opt/prefix/lib/cmake/Zlib/ZlibConfig.cmake", "set(ZLIB_FOUND 1)");
        let (stream, sink) = run_with_io(
            "set(CMAKE_PREFIX_PATH \"/opt/prefix\")\nfind_package(Zlib REQUIRED)\n",
            io,
            FakeProcessRunner::new(),
        );
        assert!(!sink.has_errors());
        let event = stream.iter().find_map(|r| match &r.event {
            Event::FindPackage { mode, found, .. } => Some((mode.clone(), *found)),
            _ => None,
        });
        assert_eq!(event, Some(("CONFIG".to_string(), true)));
    }

    #[test]
    fn find_package_config_keyword_skips_module_search() {
        let io = FakeWorkspaceIo::new()
            .with_file("/opt/modules/FindZlib.cmake", "set(ZLIB_FOUND 1)")
            .with_file("/opt/prefix/lib/cmake/Zlib/ZlibConfig.cmake", "set(ZLIB_FOUND 1)");
        let (stream, sink) = run_with_io(
            "set(CMAKE_MODULE_PATH \"/opt/modules\")\nset(CMAKE_PREFIX_PATH \"/opt/prefix\")\nfind_package(Zlib CONFIG REQUIRED)\n",
            io,
            FakeProcessRunner::new(),
        );
        assert!(!sink.has_errors());
        let event = stream.iter().find_map(|r| match &r.event {
            Event::FindPackage { mode, location, .. } => Some((mode.clone(), location.clone())),
            _ => None,
        });
        assert_eq!(event, Some(("CONFIG".to_string(), Some("/opt/prefix/lib/cmake/Zlib/ZlibConfig.cmake".to_string()))));
    }

    #[test]
    fn find_package_required_missing_is_an_error() {
        let (_stream, sink) = run("find_package(Doesnotexist REQUIRED)\n");
        assert!(sink.has_errors());
    }

    #[test]
    fn execute_process_captures_stdout_and_result() {
        let proc = FakeProcessRunner::new().with_outcome(
            "git",
            crate::adapters::ProcessOutcome {
                stdout: "abc123\n".into(),
                stderr: String::new(),
                exit_code: Some(0),
                timed_out: false,
            },
        );
        let (_stream, sink) = run_with_io(
            "execute_process(COMMAND git rev-parse HEAD OUTPUT_VARIABLE REV RESULT_VARIABLE RC OUTPUT_STRIP_TRAILING_WHITESPACE)\nmessage(STATUS \"${RC}:${REV}\")\n",
            FakeWorkspaceIo::new(),
            proc,
        );
        assert!(!sink.has_errors());
        assert!(sink.records().iter().any(|d| d.cause.contains("0:abc123")));
    }

    #[test]
    fn exec_program_populates_output_and_return_value() {
        let proc = FakeProcessRunner::new().with_outcome(
            "uname",
            crate::adapters::ProcessOutcome {
                stdout: "Linux\n".into(),
                stderr: String::new(),
                exit_code: Some(0),
                timed_out: false,
            },
        );
        let (_stream, sink) = run_with_io(
            "exec_program(uname ARGS -s OUTPUT_VARIABLE OUT RETURN_VALUE RC)\nmessage(STATUS \"${RC}:${OUT}\")\n",
            FakeWorkspaceIo::new(),
            proc,
        );
        assert!(!sink.has_errors());
        assert!(sink.records().iter().any(|d| d.cause.contains("0:Linux")));
    }
}
