//! Target-declaration and target-property built-ins (§4.5.5): `add_executable`,
//! `add_library`, the `target_*` property-append family, the directory/global
//! scope equivalents, `set_target_properties`/`set_property`, and
//! `add_custom_command`.

use crate::diagnostics::DiagnosticSink;
use crate::events::{
    Conditional, CustomCommandCommon, CustomCommandStage, Event, EventOrigin, PropertyOp,
    TargetType, Visibility,
};
use crate::logic::{Comparator, Condition, Operand};
use crate::parser::Command;

use super::Evaluator;

/// A `debug`/`optimized`/`general` link-item qualifier, translated into a
/// `Condition` on the synthetic `CMAKE_BUILD_TYPE` comparison rather than a
/// generator-expression string (kept ownership-friendly and directly
/// queryable downstream).
fn qualifier_condition(qualifier: &str) -> Option<Condition> {
    let debug_eq = Condition::Compare {
        lhs: Operand { text: "CMAKE_BUILD_TYPE".to_string(), quoted: false },
        op: Comparator::StrEqual,
        rhs: Operand { text: "Debug".to_string(), quoted: true },
    };
    match qualifier {
        "debug" => Some(debug_eq),
        "optimized" => Some(Condition::Not(Box::new(debug_eq))),
        "general" => None,
        _ => None,
    }
}

/// Finds a `KEYWORD value` pair anywhere in `args` and returns the single
/// token following the keyword (CPack's single-valued option style).
fn kw_value(args: &[String], keyword: &str) -> Option<String> {
    args.iter().position(|a| a == keyword).and_then(|i| args.get(i + 1)).cloned()
}

/// Finds `KEYWORD item...` and collects every following token up to the
/// next all-uppercase keyword-shaped token (CPack's multi-valued options).
fn kw_list(args: &[String], keyword: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "DISPLAY_NAME", "DESCRIPTION", "GROUP", "PARENT_GROUP", "DEPENDS", "INSTALL_TYPES",
        "REQUIRED", "HIDDEN", "DISABLED", "DOWNLOADED", "EXPANDED", "BOLD_TITLE",
    ];
    let Some(pos) = args.iter().position(|a| a == keyword) else { return Vec::new() };
    args[pos + 1..].iter().take_while(|a| !STOPWORDS.contains(&a.as_str())).cloned().collect()
}

fn visibility_from_keyword(s: &str) -> Option<Visibility> {
    match s {
        "PUBLIC" => Some(Visibility::Public),
        "PRIVATE" => Some(Visibility::Private),
        "INTERFACE" => Some(Visibility::Interface),
        _ => None,
    }
}

/// One `PUBLIC|PRIVATE|INTERFACE items...` group as scanned out of a
/// `target_*` argument list, with any leading `BEFORE`/`SYSTEM` flags.
struct ScopedGroups {
    before: bool,
    system: bool,
    groups: Vec<(Visibility, Vec<String>)>,
}

/// Scans `args` (already target-name-stripped) for an optional leading
/// `BEFORE`/`SYSTEM`, then one or more `SCOPE item...` groups.
fn parse_scoped_groups(args: &[String]) -> ScopedGroups {
    let mut before = false;
    let mut system = false;
    let mut groups: Vec<(Visibility, Vec<String>)> = Vec::new();
    let mut current: Option<(Visibility, Vec<String>)> = None;
    for a in args {
        match a.as_str() {
            "BEFORE" if current.is_none() => before = true,
            "SYSTEM" if current.is_none() => system = true,
            kw if visibility_from_keyword(kw).is_some() => {
                if let Some(g) = current.take() {
                    groups.push(g);
                }
                current = Some((visibility_from_keyword(kw).unwrap(), Vec::new()));
            }
            other => {
                if let Some((_, items)) = current.as_mut() {
                    items.push(other.to_string());
                } else {
                    // No scope keyword yet: CMake's permissive single-scope
                    // form defaults to PUBLIC (matches target_link_libraries'
                    // classic non-keyword signature).
                    current = Some((Visibility::Public, vec![other.to_string()]));
                }
            }
        }
    }
    if let Some(g) = current.take() {
        groups.push(g);
    }
    ScopedGroups { before, system, groups }
}

impl<'a> Evaluator<'a> {
    pub(super) fn dispatch_target_builtin(
        &mut self,
        name: &str,
        cmd: &Command,
        origin: &EventOrigin,
        sink: &mut DiagnosticSink,
    ) -> bool {
        let args = self.expand_args(&cmd.args);
        match name {
            "add_executable" => self.do_add_executable(&args, origin, sink),
            "add_library" => self.do_add_library(&args, origin, sink),
            "target_sources" => self.do_target_sources(&args, origin, sink),
            "target_include_directories" => self.do_target_paths(&args, origin, sink, IncludeOrLink::Include),
            "target_link_directories" => self.do_target_paths(&args, origin, sink, IncludeOrLink::Link),
            "target_compile_definitions" => self.do_target_items(&args, origin, sink, ItemKind::CompileDefinitions),
            "target_compile_options" => self.do_target_items(&args, origin, sink, ItemKind::CompileOptions),
            "target_link_options" => self.do_target_items(&args, origin, sink, ItemKind::LinkOptions),
            "target_link_libraries" => self.do_target_link_libraries(&args, origin, sink),
            "include_directories" => self.do_directory_paths(&args, origin, sink, IncludeOrLink::Include),
            "link_directories" => self.do_directory_paths(&args, origin, sink, IncludeOrLink::Link),
            "add_compile_definitions" => self.do_global_items(&args, origin, sink, ItemKind::CompileDefinitions),
            "add_compile_options" => self.do_global_items(&args, origin, sink, ItemKind::CompileOptions),
            "add_link_options" => self.do_global_items(&args, origin, sink, ItemKind::LinkOptions),
            "link_libraries" => self.do_global_items(&args, origin, sink, ItemKind::LinkLibraries),
            "add_definitions" => self.do_add_definitions(&args, origin, sink),
            "remove_definitions" => true,
            "set_target_properties" => self.do_set_target_properties(&args, origin, sink),
            "set_property" => self.do_set_property(&args, origin, sink),
            "get_property" => self.do_get_property(&args, origin, sink),
            "get_target_property" => self.do_get_target_property(&args, origin, sink),
            "get_directory_property" => self.do_get_directory_property(&args, origin, sink),
            "get_source_file_property" => self.do_get_source_file_property(&args, origin, sink),
            "add_custom_command" => self.do_add_custom_command(&args, origin, sink),
            "cpack_add_install_type" => self.do_cpack_add_install_type(&args, origin, sink),
            "cpack_add_component_group" => self.do_cpack_add_component_group(&args, origin, sink),
            "cpack_add_component" => self.do_cpack_add_component(&args, origin, sink),
            _ => false,
        }
    }

    fn target_type_for(&self, kind: &str) -> Option<TargetType> {
        Some(match kind {
            "STATIC" => TargetType::LibraryStatic,
            "SHARED" => TargetType::LibraryShared,
            "MODULE" => TargetType::LibraryModule,
            "OBJECT" => TargetType::LibraryObject,
            "INTERFACE" => TargetType::LibraryInterface,
            "UNKNOWN" => TargetType::LibraryUnknown,
            _ => return None,
        })
    }

    fn do_add_executable(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(name) = args.first() else {
            self.error(sink, origin.clone(), "add_executable", "missing target name");
            return true;
        };
        if args.iter().any(|a| a == "ALIAS") {
            self.emit(
                sink,
                origin.clone(),
                Event::TargetDeclare { name: name.clone(), ty: TargetType::Executable, win32_executable: false, macosx_bundle: false },
            );
            if let Some(target_of) = args.get(2) {
                self.emit(
                    sink,
                    origin.clone(),
                    Event::TargetPropSet {
                        target_name: name.clone(),
                        key: "ALIASED_TARGET".to_string(),
                        value: target_of.clone(),
                        op: PropertyOp::Set,
                    },
                );
            }
            return true;
        }
        let win32_executable = args.iter().any(|a| a == "WIN32");
        let macosx_bundle = args.iter().any(|a| a == "MACOSX_BUNDLE");
        self.emit(
            sink,
            origin.clone(),
            Event::TargetDeclare { name: name.clone(), ty: TargetType::Executable, win32_executable, macosx_bundle },
        );
        let imported = args.iter().any(|a| a == "IMPORTED");
        for src in args.iter().skip(1).filter(|a| !matches!(a.as_str(), "IMPORTED" | "GLOBAL" | "ALIAS" | "WIN32" | "MACOSX_BUNDLE" | "EXCLUDE_FROM_ALL")) {
            if !imported {
                self.emit(sink, origin.clone(), Event::TargetAddSource { target_name: name.clone(), path: src.clone() });
            }
        }
        true
    }

    fn do_add_library(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(name) = args.first() else {
            self.error(sink, origin.clone(), "add_library", "missing target name");
            return true;
        };
        if let Some(pos) = args.iter().position(|a| a == "ALIAS") {
            self.emit(
                sink,
                origin.clone(),
                Event::TargetDeclare { name: name.clone(), ty: TargetType::LibraryShared, win32_executable: false, macosx_bundle: false },
            );
            if let Some(target_of) = args.get(pos + 1) {
                self.emit(
                    sink,
                    origin.clone(),
                    Event::TargetPropSet {
                        target_name: name.clone(),
                        key: "ALIASED_TARGET".to_string(),
                        value: target_of.clone(),
                        op: PropertyOp::Set,
                    },
                );
            }
            return true;
        }

        let ty = args.get(1).and_then(|k| self.target_type_for(k)).unwrap_or_else(|| {
            let shared = self.var_get("BUILD_SHARED_LIBS").map(|v| v == "1" || v.eq_ignore_ascii_case("ON")).unwrap_or(false);
            if shared { TargetType::LibraryShared } else { TargetType::LibraryStatic }
        });
        self.emit(
            sink,
            origin.clone(),
            Event::TargetDeclare { name: name.clone(), ty, win32_executable: false, macosx_bundle: false },
        );

        let imported = args.iter().any(|a| a == "IMPORTED");
        if imported && args.get(1).and_then(|k| self.target_type_for(k)).is_none() {
            self.error(sink, origin.clone(), "add_library", "IMPORTED library requires an explicit type");
        }
        let skip_kw = |a: &str| matches!(a, "STATIC" | "SHARED" | "MODULE" | "OBJECT" | "INTERFACE" | "UNKNOWN" | "IMPORTED" | "GLOBAL" | "EXCLUDE_FROM_ALL");
        for src in args.iter().skip(1).filter(|a| !skip_kw(a)) {
            if ty.is_interface() {
                self.error(sink, origin.clone(), "add_library", format!("INTERFACE target '{name}' cannot have source files"));
                continue;
            }
            if !imported {
                self.emit(sink, origin.clone(), Event::TargetAddSource { target_name: name.clone(), path: src.clone() });
            }
        }
        true
    }

    fn do_target_sources(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(name) = args.first() else { return true };
        let rest = &args[1..];
        let groups = parse_scoped_groups(rest);
        for (_, items) in groups.groups {
            for item in items {
                self.emit(sink, origin.clone(), Event::TargetAddSource { target_name: name.clone(), path: item });
            }
        }
        true
    }

    fn do_target_items(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink, kind: ItemKind) -> bool {
        let Some(name) = args.first() else { return true };
        let groups = parse_scoped_groups(&args[1..]);
        for (visibility, items) in groups.groups {
            for raw in items {
                let item = if kind == ItemKind::CompileDefinitions {
                    raw.strip_prefix("-D").or_else(|| raw.strip_prefix("/D")).unwrap_or(&raw).to_string()
                } else {
                    raw
                };
                let conditional = Conditional::unconditional(item);
                let event = match kind {
                    ItemKind::CompileDefinitions => Event::TargetCompileDefinitions { target_name: name.clone(), visibility, item: conditional },
                    ItemKind::CompileOptions => Event::TargetCompileOptions { target_name: name.clone(), visibility, item: conditional },
                    ItemKind::LinkOptions => Event::TargetLinkOptions { target_name: name.clone(), visibility, item: conditional },
                    ItemKind::LinkLibraries => unreachable!("link libraries dispatched separately"),
                };
                self.emit(sink, origin.clone(), event);
            }
        }
        true
    }

    fn do_target_link_libraries(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(name) = args.first() else { return true };
        let groups = parse_scoped_groups(&args[1..]);
        for (visibility, items) in groups.groups {
            let mut pending_qualifier: Option<&str> = None;
            for raw in items.iter() {
                match raw.as_str() {
                    "debug" | "optimized" | "general" => {
                        pending_qualifier = Some(match raw.as_str() {
                            "debug" => "debug",
                            "optimized" => "optimized",
                            _ => "general",
                        });
                        continue;
                    }
                    _ => {}
                }
                let condition = pending_qualifier.take().and_then(qualifier_condition);
                self.emit(
                    sink,
                    origin.clone(),
                    Event::TargetLinkLibraries { target_name: name.clone(), visibility, item: Conditional { value: raw.clone(), condition } },
                );
            }
        }
        true
    }

    fn do_target_paths(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink, kind: IncludeOrLink) -> bool {
        let Some(name) = args.first() else { return true };
        let groups = parse_scoped_groups(&args[1..]);
        let before = groups.before;
        let is_system = groups.system;
        for (visibility, items) in groups.groups {
            for path in items {
                let event = match kind {
                    IncludeOrLink::Include => Event::TargetIncludeDirectories {
                        target_name: name.clone(),
                        visibility,
                        path: Conditional::unconditional(path),
                        is_system,
                        is_before: before,
                    },
                    IncludeOrLink::Link => Event::TargetLinkDirectories {
                        target_name: name.clone(),
                        visibility,
                        path: Conditional::unconditional(path),
                    },
                };
                self.emit(sink, origin.clone(), event);
            }
        }
        true
    }

    fn do_directory_paths(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink, kind: IncludeOrLink) -> bool {
        let mut before = false;
        let mut system = false;
        let mut paths = Vec::new();
        for a in args {
            match a.as_str() {
                "BEFORE" => before = true,
                "SYSTEM" => system = true,
                other => paths.push(other.to_string()),
            }
        }
        for path in paths {
            let event = match kind {
                IncludeOrLink::Include => Event::DirectoryIncludeDirectories { path, is_system: system, is_before: before },
                IncludeOrLink::Link => Event::DirectoryLinkDirectories { path, is_before: before },
            };
            self.emit(sink, origin.clone(), event);
        }
        true
    }

    fn do_global_items(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink, kind: ItemKind) -> bool {
        for raw in args {
            let item = if kind == ItemKind::CompileDefinitions {
                raw.strip_prefix("-D").or_else(|| raw.strip_prefix("/D")).unwrap_or(raw).to_string()
            } else {
                raw.clone()
            };
            let event = match kind {
                ItemKind::CompileDefinitions => Event::GlobalCompileDefinitions { item },
                ItemKind::CompileOptions => Event::GlobalCompileOptions { item },
                ItemKind::LinkOptions => Event::GlobalLinkOptions { item },
                ItemKind::LinkLibraries => Event::GlobalLinkLibraries { item },
            };
            self.emit(sink, origin.clone(), event);
        }
        true
    }

    fn do_add_definitions(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        for raw in args {
            if let Some(def) = raw.strip_prefix("-D").or_else(|| raw.strip_prefix("/D")) {
                self.emit(sink, origin.clone(), Event::GlobalCompileDefinitions { item: def.to_string() });
            } else {
                self.emit(sink, origin.clone(), Event::GlobalCompileOptions { item: raw.clone() });
            }
        }
        true
    }

    fn do_set_target_properties(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let mut iter = args.split(|a| a == "PROPERTIES");
        let Some(names) = iter.next() else { return true };
        let Some(kvs) = iter.next() else {
            self.error(sink, origin.clone(), "set_target_properties", "missing PROPERTIES keyword");
            return true;
        };
        let mut pairs = kvs.iter();
        while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
            for name in names {
                self.emit(
                    sink,
                    origin.clone(),
                    Event::TargetPropSet { target_name: name.clone(), key: key.clone(), value: value.clone(), op: PropertyOp::Set },
                );
            }
        }
        true
    }

    fn do_set_property(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(scope) = args.first().cloned() else {
            self.error(sink, origin.clone(), "set_property", "missing scope keyword");
            return true;
        };
        let Some(props_pos) = args.iter().position(|a| a == "PROPERTY") else {
            self.error(sink, origin.clone(), "set_property", "missing PROPERTY keyword");
            return true;
        };
        let names = &args[1..props_pos];
        let op = if names.first().map(|s| s.as_str()) == Some("APPEND") {
            PropertyOp::AppendList
        } else if names.first().map(|s| s.as_str()) == Some("APPEND_STRING") {
            PropertyOp::AppendString
        } else {
            PropertyOp::Set
        };
        let names: Vec<&String> = names.iter().filter(|n| n.as_str() != "APPEND" && n.as_str() != "APPEND_STRING").collect();
        let rest = &args[props_pos + 1..];
        let Some((key, values)) = rest.split_first() else {
            self.error(sink, origin.clone(), "set_property", "missing property name");
            return true;
        };
        let value = values.join(";");
        match scope.as_str() {
            "TARGET" => {
                for name in names {
                    self.emit(
                        sink,
                        origin.clone(),
                        Event::TargetPropSet { target_name: name.clone(), key: key.clone(), value: value.clone(), op },
                    );
                }
            }
            "GLOBAL" => self.set_global_property(key, &value, op),
            "DIRECTORY" => self.set_directory_property(key, &value, op),
            "SOURCE" => {
                for name in names {
                    self.set_source_property(name, key, &value, op);
                }
            }
            other => {
                self.unsupported(sink, origin.clone(), &format!("set_property({other} scope)"));
            }
        }
        true
    }

    /// `get_property(var SCOPE [name] PROPERTY key [SET | BRIEF_DOCS | FULL_DOCS])`,
    /// plus its `get_target_property`/`get_directory_property`/
    /// `get_source_file_property` shorthand siblings. All five read from the
    /// evaluator-local property mirrors kept in [`super::Evaluator`] rather
    /// than the not-yet-built model, since reads can happen later in the
    /// same file that set the value.
    pub(super) fn do_get_property(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(out_var) = args.first().cloned() else {
            self.error(sink, origin.clone(), "get_property", "missing output variable");
            return true;
        };
        let Some(scope) = args.get(1).cloned() else {
            self.error(sink, origin.clone(), "get_property", "missing scope keyword");
            return true;
        };
        let rest = &args[2..];
        let (object, rest) = match scope.as_str() {
            "GLOBAL" | "DIRECTORY" => (None, rest),
            _ => match rest.split_first() {
                Some((obj, r)) => (Some(obj.clone()), r),
                None => {
                    self.error(sink, origin.clone(), "get_property", "missing object name");
                    return true;
                }
            },
        };
        let Some(prop_pos) = rest.iter().position(|a| a == "PROPERTY") else {
            self.error(sink, origin.clone(), "get_property", "missing PROPERTY keyword");
            return true;
        };
        let Some(key) = rest.get(prop_pos + 1) else {
            self.error(sink, origin.clone(), "get_property", "missing property name");
            return true;
        };
        let found = match scope.as_str() {
            "TARGET" => object.as_deref().and_then(|t| self.get_target_property_local(t, key)),
            "GLOBAL" => self.get_global_property(key),
            "DIRECTORY" => self.get_directory_property(key),
            "SOURCE" => object.as_deref().and_then(|s| self.get_source_property(s, key)),
            other => {
                self.unsupported(sink, origin.clone(), &format!("get_property({other} scope)"));
                None
            }
        };
        self.var_set_local(&out_var, &found.unwrap_or_default());
        true
    }

    pub(super) fn do_get_target_property(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let (Some(out_var), Some(target), Some(key)) = (args.first(), args.get(1), args.get(2)) else {
            self.error(sink, origin.clone(), "get_target_property", "usage: get_target_property(<var> <target> <property>)");
            return true;
        };
        let value = self.get_target_property_local(target, key).unwrap_or_else(|| format!("{out_var}-NOTFOUND"));
        self.var_set_local(out_var, &value);
        true
    }

    pub(super) fn do_get_directory_property(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let (Some(out_var), Some(key)) = (args.first(), args.get(1)) else {
            self.error(sink, origin.clone(), "get_directory_property", "usage: get_directory_property(<var> <property>)");
            return true;
        };
        let value = self.get_directory_property(key).unwrap_or_default();
        self.var_set_local(out_var, &value);
        true
    }

    pub(super) fn do_get_source_file_property(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let (Some(out_var), Some(source), Some(key)) = (args.first(), args.get(1), args.get(2)) else {
            self.error(
                sink,
                origin.clone(),
                "get_source_file_property",
                "usage: get_source_file_property(<var> <source> <property>)",
            );
            return true;
        };
        let value = self.get_source_property(source, key).unwrap_or_else(|| format!("{out_var}-NOTFOUND"));
        self.var_set_local(out_var, &value);
        true
    }

    /// `cpack_add_install_type(name [DISPLAY_NAME d])`.
    pub(super) fn do_cpack_add_install_type(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(name) = args.first().cloned() else {
            self.error(sink, origin.clone(), "cpack_add_install_type", "missing install type name");
            return true;
        };
        let display_name = kw_value(args, "DISPLAY_NAME");
        self.emit(sink, origin.clone(), Event::CpackAddInstallType { name, display_name });
        true
    }

    /// `cpack_add_component_group(name [DISPLAY_NAME d] [DESCRIPTION d] [PARENT_GROUP g] [EXPANDED] [BOLD_TITLE])`.
    pub(super) fn do_cpack_add_component_group(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(name) = args.first().cloned() else {
            self.error(sink, origin.clone(), "cpack_add_component_group", "missing group name");
            return true;
        };
        self.emit(
            sink,
            origin.clone(),
            Event::CpackAddComponentGroup {
                name,
                display_name: kw_value(args, "DISPLAY_NAME"),
                description: kw_value(args, "DESCRIPTION"),
                parent_group: kw_value(args, "PARENT_GROUP"),
                expanded: args.iter().any(|a| a == "EXPANDED"),
                bold_title: args.iter().any(|a| a == "BOLD_TITLE"),
            },
        );
        true
    }

    /// `cpack_add_component(name [DISPLAY_NAME d] [DESCRIPTION d] [GROUP g]
    /// [DEPENDS dep...] [INSTALL_TYPES type...] [REQUIRED] [HIDDEN] [DISABLED] [DOWNLOADED])`.
    pub(super) fn do_cpack_add_component(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(name) = args.first().cloned() else {
            self.error(sink, origin.clone(), "cpack_add_component", "missing component name");
            return true;
        };
        self.emit(
            sink,
            origin.clone(),
            Event::CpackAddComponent {
                name,
                display_name: kw_value(args, "DISPLAY_NAME"),
                description: kw_value(args, "DESCRIPTION"),
                group: kw_value(args, "GROUP"),
                depends: kw_list(args, "DEPENDS"),
                install_types: kw_list(args, "INSTALL_TYPES"),
                required: args.iter().any(|a| a == "REQUIRED"),
                hidden: args.iter().any(|a| a == "HIDDEN"),
                disabled: args.iter().any(|a| a == "DISABLED"),
                downloaded: args.iter().any(|a| a == "DOWNLOADED"),
            },
        );
        true
    }

    fn do_add_custom_command(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        if args.first().map(|s| s.as_str()) == Some("TARGET") {
            return self.do_custom_command_target(args, origin, sink);
        }
        if args.first().map(|s| s.as_str()) == Some("OUTPUT") {
            return self.do_custom_command_output(args, origin, sink);
        }
        self.error(sink, origin.clone(), "add_custom_command", "expected TARGET or OUTPUT as first keyword");
        true
    }

    fn do_custom_command_target(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        let Some(target_name) = args.get(1) else {
            self.error(sink, origin.clone(), "add_custom_command", "missing target name");
            return true;
        };
        let stage_kw = args.iter().skip(2).find(|a| matches!(a.as_str(), "PRE_BUILD" | "PRE_LINK" | "POST_BUILD"));
        let Some(stage_kw) = stage_kw else {
            self.error(sink, origin.clone(), "add_custom_command", "exactly one of PRE_BUILD|PRE_LINK|POST_BUILD is required");
            return true;
        };
        let stage = match stage_kw.as_str() {
            "PRE_BUILD" => CustomCommandStage::PreBuild,
            "PRE_LINK" => CustomCommandStage::PreLink,
            _ => CustomCommandStage::PostBuild,
        };
        if args.iter().any(|a| a == "DEPENDS") {
            self.error(sink, origin.clone(), "add_custom_command", "DEPENDS is not allowed on the TARGET form");
        }
        let common = parse_custom_command_common(&args[2..]);
        self.emit(sink, origin.clone(), Event::CustomCommandTarget { target_name: target_name.clone(), stage, common });
        true
    }

    fn do_custom_command_output(&mut self, args: &[String], origin: &EventOrigin, sink: &mut DiagnosticSink) -> bool {
        if args.iter().any(|a| a == "DEPFILE") && args.iter().any(|a| a == "IMPLICIT_DEPENDS") {
            self.error(sink, origin.clone(), "add_custom_command", "DEPFILE and IMPLICIT_DEPENDS are mutually exclusive");
        }
        if args.iter().any(|a| a == "JOB_POOL") && args.iter().any(|a| a == "USES_TERMINAL") {
            self.error(sink, origin.clone(), "add_custom_command", "JOB_POOL and USES_TERMINAL are mutually exclusive");
        }
        let common = parse_custom_command_common(&args[1..]);
        self.emit(sink, origin.clone(), Event::CustomCommandOutput { common });
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    CompileDefinitions,
    CompileOptions,
    LinkOptions,
    LinkLibraries,
}

#[derive(Debug, Clone, Copy)]
enum IncludeOrLink {
    Include,
    Link,
}

fn parse_custom_command_common(args: &[String]) -> CustomCommandCommon {
    let mut common = CustomCommandCommon {
        commands: Vec::new(),
        working_dir: None,
        comment: None,
        outputs: Vec::new(),
        byproducts: Vec::new(),
        depends: Vec::new(),
        main_dependency: None,
        depfile: None,
        append: false,
        verbatim: false,
        uses_terminal: false,
        command_expand_lists: false,
        depends_explicit_only: false,
        codegen: false,
    };

    #[derive(PartialEq)]
    enum Mode {
        None,
        Output,
        Command,
        Depends,
        Byproducts,
        Comment,
        WorkingDir,
        MainDependency,
        Depfile,
    }
    let mut mode = Mode::None;
    for a in args {
        match a.as_str() {
            "OUTPUT" => mode = Mode::Output,
            "COMMAND" => {
                mode = Mode::Command;
                if !common.commands.is_empty() {
                    common.commands.push("&&".to_string());
                }
            }
            "DEPENDS" => mode = Mode::Depends,
            "BYPRODUCTS" => mode = Mode::Byproducts,
            "COMMENT" => mode = Mode::Comment,
            "WORKING_DIRECTORY" => mode = Mode::WorkingDir,
            "MAIN_DEPENDENCY" => mode = Mode::MainDependency,
            "DEPFILE" => mode = Mode::Depfile,
            "VERBATIM" => common.verbatim = true,
            "USES_TERMINAL" => common.uses_terminal = true,
            "COMMAND_EXPAND_LISTS" => common.command_expand_lists = true,
            "DEPENDS_EXPLICIT_ONLY" => common.depends_explicit_only = true,
            "CODEGEN" => common.codegen = true,
            "APPEND" => common.append = true,
            "IMPLICIT_DEPENDS" | "JOB_POOL" => mode = Mode::None,
            other => match mode {
                Mode::Output => common.outputs.push(other.to_string()),
                Mode::Command => common.commands.push(other.to_string()),
                Mode::Depends => common.depends.push(other.to_string()),
                Mode::Byproducts => common.byproducts.push(other.to_string()),
                Mode::Comment => common.comment = Some(other.to_string()),
                Mode::WorkingDir => common.working_dir = Some(other.to_string()),
                Mode::MainDependency => common.main_dependency = Some(other.to_string()),
                Mode::Depfile => common.depfile = Some(other.to_string()),
                Mode::None => {}
            },
        }
    }
    common
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorConfig;
    use crate::diagnostics::DiagnosticSink;
    use crate::evaluator::EvaluatorInit;
    use crate::parser::parse_source;
    use crate::test_support::{FakeClockEnv, FakeProcessRunner, FakeWorkspaceIo};
    use std::path::PathBuf;

    fn run(src: &str) -> (crate::events::EventStream, DiagnosticSink) {
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
    fn interface_library_rejects_sources_in_add_library() {
        let (_, sink) = run("add_library(api INTERFACE x.c)\n");
        assert!(sink.has_errors());
    }

    #[test]
    fn target_link_libraries_wraps_debug_optimized_qualifiers() {
        let (stream, sink) = run(
            "add_executable(app main.c)\ntarget_link_libraries(app PRIVATE debug dbg.a optimized rel.a)\n",
        );
        assert!(!sink.has_errors());
        let mut items = Vec::new();
        for rec in stream.iter() {
            if let Event::TargetLinkLibraries { item, .. } = &rec.event {
                items.push(item.clone());
            }
        }
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value, "dbg.a");
        assert!(matches!(items[0].condition, Some(Condition::Compare { .. })));
        assert_eq!(items[1].value, "rel.a");
        assert!(matches!(items[1].condition, Some(Condition::Not(_))));
    }

    #[test]
    fn target_compile_definitions_strips_leading_dash_d() {
        let (stream, _) = run("add_executable(app main.c)\ntarget_compile_definitions(app PRIVATE -DFOO=1)\n");
        let mut found = false;
        for rec in stream.iter() {
            if let Event::TargetCompileDefinitions { item, .. } = &rec.event {
                assert_eq!(item.value, "FOO=1");
                found = true;
            }
        }
        assert!(found);
    }

    #[test]
    fn set_target_properties_applies_to_every_named_target() {
        let (stream, sink) = run(
            "add_executable(app1 a.c)\nadd_executable(app2 b.c)\nset_target_properties(app1 app2 PROPERTIES OUTPUT_NAME renamed)\n",
        );
        assert!(!sink.has_errors());
        let count = stream.iter().filter(|r| matches!(&r.event, Event::TargetPropSet { key, .. } if key == "OUTPUT_NAME")).count();
        assert_eq!(count, 2);
    }

    #[test]
    fn add_custom_command_target_requires_one_stage_keyword() {
        let (_, sink) = run("add_executable(app main.c)\nadd_custom_command(TARGET app COMMAND echo hi)\n");
        assert!(sink.has_errors());
    }

    #[test]
    fn add_custom_command_output_append_with_no_prior_match_warns() {
        let (_, sink) = run("add_custom_command(OUTPUT gen.c COMMAND echo hi APPEND)\n");
        assert!(!sink.has_errors());
    }

    #[test]
    fn get_target_property_reads_back_a_value_set_earlier_in_the_same_file() {
        let (stream, sink) = run(
            "add_executable(app main.c)\nset_target_properties(app PROPERTIES FOO bar)\nget_target_property(OUT app FOO)\ntarget_compile_definitions(app PRIVATE ${OUT})\n",
        );
        assert!(!sink.has_errors());
        let found = stream.iter().any(|r| matches!(&r.event, Event::TargetCompileDefinitions { item, .. } if item.value == "bar"));
        assert!(found);
    }

    #[test]
    fn get_target_property_on_unset_property_yields_notfound_marker() {
        let (stream, sink) = run(
            "add_executable(app main.c)\nget_target_property(OUT app NOPE)\ntarget_compile_definitions(app PRIVATE ${OUT})\n",
        );
        assert!(!sink.has_errors());
        let found = stream.iter().any(|r| matches!(&r.event, Event::TargetCompileDefinitions { item, .. } if item.value == "OUT-NOTFOUND"));
        assert!(found);
    }

    #[test]
    fn get_property_global_scope_round_trips_through_set_property() {
        let (stream, sink) = run(
            "add_executable(app main.c)\nset_property(GLOBAL PROPERTY FOO bar)\nget_property(OUT GLOBAL PROPERTY FOO)\ntarget_compile_definitions(app PRIVATE ${OUT})\n",
        );
        assert!(!sink.has_errors());
        let found = stream.iter().any(|r| matches!(&r.event, Event::TargetCompileDefinitions { item, .. } if item.value == "bar"));
        assert!(found);
    }

    #[test]
    fn set_property_append_accumulates_on_target_scope() {
        let (stream, sink) = run(
            "add_executable(app main.c)\nset_property(TARGET app PROPERTY FOO a)\nset_property(TARGET app APPEND PROPERTY FOO b)\nget_target_property(OUT app FOO)\ntarget_compile_definitions(app PRIVATE ${OUT})\n",
        );
        assert!(!sink.has_errors());
        let found = stream.iter().any(|r| matches!(&r.event, Event::TargetCompileDefinitions { item, .. } if item.value == "a;b"));
        assert!(found);
    }

    #[test]
    fn cpack_add_component_group_and_component_emit_events() {
        let (stream, sink) = run(
            "cpack_add_component_group(Runtime DISPLAY_NAME \"Runtime Files\" EXPANDED)\ncpack_add_component(app GROUP Runtime REQUIRED DEPENDS libfoo)\ncpack_add_install_type(Full DISPLAY_NAME \"Full Install\")\n",
        );
        assert!(!sink.has_errors());
        let group = stream
            .iter()
            .find_map(|r| match &r.event {
                Event::CpackAddComponentGroup { name, expanded, .. } => Some((name.clone(), *expanded)),
                _ => None,
            })
            .expect("component group event");
        assert_eq!(group, ("Runtime".to_string(), true));
        let component = stream
            .iter()
            .find_map(|r| match &r.event {
                Event::CpackAddComponent { name, group, required, depends, .. } => {
                    Some((name.clone(), group.clone(), *required, depends.clone()))
                }
                _ => None,
            })
            .expect("component event");
        assert_eq!(component, ("app".to_string(), Some("Runtime".to_string()), true, vec!["libfoo".to_string()]));
        assert!(stream.iter().any(|r| matches!(&r.event, Event::CpackAddInstallType { name, .. } if name == "Full")));
    }
}
