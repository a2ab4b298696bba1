//! Applies an [`EventStream`] left-to-right to a mutable [`BuildModel`].
//! Maintains the directory-scope stack and a sticky fatal-error flag;
//! partial model state after a fatal error must be treated as invalid.

use crate::diagnostics::{Diagnostic, DiagnosticSink, Origin, Severity};
use crate::events::{
    self, CustomCommandStage as EvCustomCommandStage, Event, EventRecord, EventStream,
    PropertyOp, Visibility as EvVisibility,
};
use crate::model::{
    BuildModel, Conditional, CustomCommand, CustomCommandStage, DirectoryNode, InstallRuleType,
    Target, TargetCustomCommand, TargetType, VisibilityItem,
};

fn map_visibility(v: EvVisibility) -> crate::model::Visibility {
    match v {
        EvVisibility::Unspecified => crate::model::Visibility::Unspecified,
        EvVisibility::Private => crate::model::Visibility::Private,
        EvVisibility::Public => crate::model::Visibility::Public,
        EvVisibility::Interface => crate::model::Visibility::Interface,
    }
}

fn map_target_type(t: events::TargetType) -> TargetType {
    match t {
        events::TargetType::Executable => TargetType::Executable,
        events::TargetType::LibraryStatic => TargetType::LibraryStatic,
        events::TargetType::LibraryShared => TargetType::LibraryShared,
        events::TargetType::LibraryModule => TargetType::LibraryModule,
        events::TargetType::LibraryInterface => TargetType::LibraryInterface,
        events::TargetType::LibraryObject => TargetType::LibraryObject,
        events::TargetType::LibraryUnknown => TargetType::LibraryUnknown,
    }
}

fn map_install_rule_type(t: events::InstallRuleType) -> InstallRuleType {
    match t {
        events::InstallRuleType::Target => InstallRuleType::Target,
        events::InstallRuleType::File => InstallRuleType::File,
        events::InstallRuleType::Program => InstallRuleType::Program,
        events::InstallRuleType::Directory => InstallRuleType::Directory,
    }
}

fn map_custom_command_stage(s: EvCustomCommandStage) -> CustomCommandStage {
    match s {
        EvCustomCommandStage::PreBuild => CustomCommandStage::PreBuild,
        EvCustomCommandStage::PreLink => CustomCommandStage::PreLink,
        EvCustomCommandStage::PostBuild => CustomCommandStage::PostBuild,
    }
}

fn map_common(c: events::CustomCommandCommon) -> CustomCommand {
    CustomCommand {
        commands: c.commands,
        working_dir: c.working_dir,
        comment: c.comment,
        outputs: c.outputs,
        byproducts: c.byproducts,
        depends: c.depends,
        main_dependency: c.main_dependency,
        depfile: c.depfile,
        verbatim: c.verbatim,
        uses_terminal: c.uses_terminal,
        command_expand_lists: c.command_expand_lists,
        depends_explicit_only: c.depends_explicit_only,
        codegen: c.codegen,
    }
}

fn command_name_for(event: &Event) -> &'static str {
    match event {
        Event::Diagnostic { .. } => "diagnostic",
        Event::ProjectDeclare { .. } => "project",
        Event::VarSet { .. } => "set",
        Event::SetCacheEntry { .. } => "set(cache)",
        Event::PlatformInit { .. } => "platform_init",
        Event::TargetDeclare { .. } => "add_target",
        Event::TargetAddSource { .. } => "target_sources",
        Event::TargetPropSet { .. } => "set_target_properties",
        Event::TargetIncludeDirectories { .. } => "target_include_directories",
        Event::TargetCompileDefinitions { .. } => "target_compile_definitions",
        Event::TargetCompileOptions { .. } => "target_compile_options",
        Event::TargetLinkLibraries { .. } => "target_link_libraries",
        Event::TargetLinkOptions { .. } => "target_link_options",
        Event::TargetLinkDirectories { .. } => "target_link_directories",
        Event::CustomCommandTarget { .. } => "add_custom_command(TARGET)",
        Event::CustomCommandOutput { .. } => "add_custom_command(OUTPUT)",
        Event::DirPush { .. } => "dir_push",
        Event::DirPop => "dir_pop",
        Event::DirectoryIncludeDirectories { .. } => "include_directories",
        Event::DirectoryLinkDirectories { .. } => "link_directories",
        Event::GlobalCompileDefinitions { .. } => "add_compile_definitions",
        Event::GlobalCompileOptions { .. } => "add_compile_options",
        Event::GlobalLinkOptions { .. } => "add_link_options",
        Event::GlobalLinkLibraries { .. } => "link_libraries",
        Event::TestingEnable { .. } => "enable_testing",
        Event::TestAdd { .. } => "add_test",
        Event::InstallAddRule { .. } => "install",
        Event::CpackAddInstallType { .. } => "cpack_add_install_type",
        Event::CpackAddComponentGroup { .. } => "cpack_add_component_group",
        Event::CpackAddComponent { .. } => "cpack_add_component",
        Event::FindPackage { .. } => "find_package",
    }
}

/// Applies events to a [`BuildModel`], maintaining the directory-scope
/// stack and routing diagnostics into a [`DiagnosticSink`].
pub struct Builder<'a> {
    model: BuildModel,
    sink: &'a mut DiagnosticSink,
    fatal: bool,
    warned_before_after: bool,
}

impl<'a> Builder<'a> {
    pub fn new(sink: &'a mut DiagnosticSink) -> Self {
        Builder { model: BuildModel::new(), sink, fatal: false, warned_before_after: false }
    }

    pub fn has_fatal_error(&self) -> bool {
        self.fatal
    }

    fn warn(&mut self, origin: &Origin, command: &str, cause: impl Into<String>, hint: Option<&str>) {
        let mut diag = Diagnostic::new(Severity::Warning, "builder", cause.into())
            .with_origin(origin.file.clone(), origin.line, origin.col)
            .with_command(command);
        if let Some(h) = hint {
            diag = diag.with_hint(h);
        }
        self.sink.log(diag);
    }

    fn error(&mut self, origin: &Origin, command: &str, cause: impl Into<String>) {
        self.sink.log(
            Diagnostic::new(Severity::Error, "builder", cause.into())
                .with_origin(origin.file.clone(), origin.line, origin.col)
                .with_command(command),
        );
    }

    fn warn_before_after_once(&mut self, origin: &Origin, command: &str) {
        if self.warned_before_after {
            return;
        }
        self.warned_before_after = true;
        self.warn(
            origin,
            command,
            "BEFORE/AFTER ordering is not fully materialized in the build model",
            Some("event order is preserved by append; explicit precedence modeling is deferred"),
        );
    }

    /// Applies every event in `stream`, stopping early (but returning what
    /// has been applied so far) only the fatal-error flag distinguishes a
    /// genuinely unusable partial model from an ordinary warning-laden one.
    pub fn apply_stream(&mut self, stream: &EventStream) {
        for rec in stream {
            self.apply_event(rec);
            if self.fatal {
                break;
            }
        }
    }

    pub fn apply_event(&mut self, rec: &EventRecord) {
        let origin = Origin { file: rec.origin.file.clone(), line: rec.origin.line, col: rec.origin.col };
        let cmd = command_name_for(&rec.event);
        match rec.event.clone() {
            Event::Diagnostic { severity, cause, hint, .. } => {
                let sev = match severity {
                    events::DiagSeverity::Warning => Severity::Warning,
                    events::DiagSeverity::Error => Severity::Error,
                };
                let mut diag = Diagnostic::new(sev, "evaluator", cause).with_origin(origin.file.clone(), origin.line, origin.col);
                if let Some(h) = hint {
                    diag = diag.with_hint(h);
                }
                self.sink.log(diag);
            }
            Event::ProjectDeclare { name, version, description, languages } => {
                self.model.project_name = Some(name);
                if let Some(v) = version {
                    self.model.project_version = Some(v);
                }
                if description.is_some() {
                    self.model.project_description = description;
                }
                self.model.project_languages = languages;
            }
            Event::VarSet { .. } => {
                // Informational only; the evaluator's own scope already
                // holds the authoritative value.
            }
            Event::SetCacheEntry { key, value, type_name, doc } => {
                self.model.set_cache_variable(&key, &value, &type_name, &doc);
            }
            Event::PlatformInit { is_windows, is_unix, is_apple, is_linux } => {
                self.model.is_windows = is_windows;
                self.model.is_unix = is_unix;
                self.model.is_apple = is_apple;
                self.model.is_linux = is_linux;
            }
            Event::TargetDeclare { name, ty, win32_executable, macosx_bundle } => {
                if self.model.find_target(&name).is_some() {
                    self.error(&origin, cmd, format!("target `{name}` already declared"));
                    return;
                }
                let target = self.model.add_target(&name, map_target_type(ty));
                target.win32_executable = win32_executable;
                target.macosx_bundle = macosx_bundle;
            }
            Event::TargetAddSource { target_name, path } => {
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                if target.ty.is_interface() {
                    self.error(&origin, cmd, format!("interface library `{target_name}` cannot take sources"));
                    return;
                }
                target.sources.push(path);
            }
            Event::TargetPropSet { target_name, key, value, op } => {
                if let Some(alias_of) = self.model.find_target(&target_name).and_then(|t| t.alias_of.clone()) {
                    let _ = alias_of;
                    self.error(&origin, cmd, format!("cannot set properties on alias target `{target_name}`"));
                    return;
                }
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                target.set_property(&key, value, map_property_op(op));
            }
            Event::TargetIncludeDirectories { target_name, visibility, path, is_system: _, is_before } => {
                if is_before {
                    self.warn_before_after_once(&origin, cmd);
                }
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                let vis = coerce_interface_visibility(target.ty, visibility, &mut self.sink, &origin, cmd);
                target.include_directories.push(VisibilityItem {
                    item: Conditional { value: path.value, condition: path.condition },
                    visibility: vis,
                });
            }
            Event::TargetCompileDefinitions { target_name, visibility, item } => {
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                let vis = coerce_interface_visibility(target.ty, visibility, &mut self.sink, &origin, cmd);
                target.compile_definitions.push(VisibilityItem {
                    item: Conditional { value: item.value, condition: item.condition },
                    visibility: vis,
                });
            }
            Event::TargetCompileOptions { target_name, visibility, item } => {
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                let vis = coerce_interface_visibility(target.ty, visibility, &mut self.sink, &origin, cmd);
                target.compile_options.push(VisibilityItem {
                    item: Conditional { value: item.value, condition: item.condition },
                    visibility: vis,
                });
            }
            Event::TargetLinkLibraries { target_name, visibility, item } => {
                let item_is_declared_target = self.model.find_target(&item.value).is_some();
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                let vis = coerce_interface_visibility(target.ty, visibility, &mut self.sink, &origin, cmd);
                let item_name = item.value.clone();
                target.link_libraries.push(VisibilityItem {
                    item: Conditional { value: item.value, condition: item.condition },
                    visibility: vis,
                });
                if item_is_declared_target {
                    match vis {
                        crate::model::Visibility::Interface => target.interface_dependencies.push(item_name),
                        crate::model::Visibility::Public => {
                            target.dependencies.push(item_name.clone());
                            target.interface_dependencies.push(item_name);
                        }
                        _ => target.dependencies.push(item_name),
                    }
                } else if looks_like_target_name(&item_name) {
                    self.warn(
                        &origin,
                        cmd,
                        format!("link item `{item_name}` looks like a target name but no such target is declared"),
                        None,
                    );
                }
            }
            Event::TargetLinkOptions { target_name, visibility, item } => {
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                let vis = coerce_interface_visibility(target.ty, visibility, &mut self.sink, &origin, cmd);
                target.link_options.push(VisibilityItem {
                    item: Conditional { value: item.value, condition: item.condition },
                    visibility: vis,
                });
            }
            Event::TargetLinkDirectories { target_name, visibility, path } => {
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                let vis = coerce_interface_visibility(target.ty, visibility, &mut self.sink, &origin, cmd);
                target.link_directories.push(VisibilityItem {
                    item: Conditional { value: path.value, condition: path.condition },
                    visibility: vis,
                });
            }
            Event::CustomCommandTarget { target_name, stage, common } => {
                let Some(target) = self.model.find_target_mut(&target_name) else {
                    self.error(&origin, cmd, format!("unknown target `{target_name}`"));
                    return;
                };
                target.custom_commands.push(TargetCustomCommand {
                    stage: map_custom_command_stage(stage),
                    command: map_common(common),
                });
            }
            Event::CustomCommandOutput { common } => {
                let first_output = common.outputs.first().cloned();
                if common.append {
                    let matched = self.model.output_custom_commands.iter_mut().find(|existing| {
                        first_output.as_deref().is_some_and(|o| existing.outputs.first().map(|s| s.as_str()) == Some(o))
                    });
                    match matched {
                        Some(existing) => {
                            existing.commands.extend(map_common(common).commands);
                            return;
                        }
                        None => {
                            self.warn(&origin, cmd, "APPEND with no matching OUTPUT command; creating a new one", None);
                        }
                    }
                }
                self.model.output_custom_commands.push(map_common(common));
            }
            Event::DirPush { source_dir, binary_dir } => {
                let parent_index = self.model.current_directory_index();
                self.model.push_directory_scope(DirectoryNode {
                    source_dir,
                    binary_dir,
                    parent_index: Some(parent_index),
                    ..Default::default()
                });
            }
            Event::DirPop => {
                if !self.model.pop_directory_scope() {
                    self.error(&origin, cmd, "directory stack underflow");
                    self.fatal = true;
                    return;
                }
            }
            Event::DirectoryIncludeDirectories { path, is_system, is_before } => {
                if is_before {
                    self.warn_before_after_once(&origin, cmd);
                }
                let item = VisibilityItem {
                    item: Conditional::unconditional(path),
                    visibility: crate::model::Visibility::Unspecified,
                };
                let dir = self.model.current_directory_mut();
                if is_system {
                    dir.system_include_directories.push(item);
                } else {
                    dir.include_directories.push(item);
                }
            }
            Event::DirectoryLinkDirectories { path, is_before } => {
                if is_before {
                    self.warn_before_after_once(&origin, cmd);
                }
                let dir = self.model.current_directory_mut();
                dir.link_directories.push(VisibilityItem {
                    item: Conditional::unconditional(path),
                    visibility: crate::model::Visibility::Unspecified,
                });
            }
            Event::GlobalCompileDefinitions { item } => self.model.global_compile_definitions.push(item),
            Event::GlobalCompileOptions { item } => self.model.global_compile_options.push(item),
            Event::GlobalLinkOptions { item } => self.model.global_link_options.push(item),
            Event::GlobalLinkLibraries { item } => self.model.global_link_libraries.push(item),
            Event::TestingEnable { enabled } => self.model.testing_enabled = enabled,
            Event::TestAdd { name, command, working_dir, command_expand_lists } => {
                if self.model.find_test(&name).is_some() {
                    self.error(&origin, cmd, format!("test `{name}` already added"));
                    return;
                }
                self.model.add_test(&name, &command.join(" "), working_dir, command_expand_lists);
            }
            Event::InstallAddRule { rule_type, item, destination } => {
                self.model.install_enabled = true;
                self.model.add_install_rule(map_install_rule_type(rule_type), &item, destination);
            }
            Event::CpackAddInstallType { name, display_name } => {
                let entry = self.model.ensure_cpack_install_type(&name);
                entry.display_name = display_name;
            }
            Event::CpackAddComponentGroup { name, display_name, description, parent_group, expanded, bold_title } => {
                let entry = self.model.ensure_cpack_group(&name);
                entry.display_name = display_name;
                entry.description = description;
                entry.parent_group = parent_group;
                entry.expanded = expanded;
                entry.bold_title = bold_title;
            }
            Event::CpackAddComponent {
                name,
                display_name,
                description,
                group,
                depends,
                install_types,
                required,
                hidden,
                disabled,
                downloaded,
            } => {
                let entry = self.model.ensure_cpack_component(&name);
                entry.display_name = display_name;
                entry.description = description;
                entry.group = group;
                entry.depends = depends;
                entry.install_types = install_types;
                entry.required = required;
                entry.hidden = hidden;
                entry.disabled = disabled;
                entry.downloaded = downloaded;
            }
            Event::FindPackage { package_name, mode, required, found, location } => {
                if required && !found {
                    self.error(&origin, cmd, format!("required package `{package_name}` not found"));
                }
                let entry = self.model.add_package(&package_name, found);
                entry.mode = Some(mode);
                entry.location = location;
            }
        }
    }

    /// Returns the model, or `None` after a fatal builder error (partial
    /// state must be treated as invalid, matching the reference's
    /// `builder_finish` contract).
    pub fn finish(self) -> Option<BuildModel> {
        if self.fatal {
            None
        } else {
            Some(self.model)
        }
    }
}

fn map_property_op(op: PropertyOp) -> crate::events::PropertyOp {
    op
}

/// A link item with no path separator, no file extension, and no linker
/// flag prefix reads like a bare target name (§4.7 TARGET_LINK_LIBRARIES
/// rule), so a missing declaration for it is worth a warning rather than
/// silent acceptance as an opaque library.
fn looks_like_target_name(item: &str) -> bool {
    if item.starts_with('-') || item.starts_with('/') || item.contains('/') || item.contains('\\') {
        return false;
    }
    if item.rsplit_once('.').is_some() {
        return false;
    }
    !item.is_empty()
}

fn coerce_interface_visibility(
    ty: TargetType,
    requested: EvVisibility,
    sink: &mut DiagnosticSink,
    origin: &Origin,
    cmd: &str,
) -> crate::model::Visibility {
    if ty.is_interface() && requested != EvVisibility::Interface {
        sink.log(
            Diagnostic::new(Severity::Error, "builder", "interface library only accepts INTERFACE visibility")
                .with_origin(origin.file.clone(), origin.line, origin.col)
                .with_command(cmd),
        );
    }
    if ty.is_interface() {
        crate::model::Visibility::Interface
    } else {
        map_visibility(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DiagSeverity, EventOrigin};

    fn push(stream: &mut EventStream, event: Event) {
        stream.push(event, EventOrigin::default());
    }

    #[test]
    fn declares_target_and_adds_source() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::TargetDeclare { name: "app".into(), ty: events::TargetType::Executable, win32_executable: false, macosx_bundle: false });
        push(&mut stream, Event::TargetAddSource { target_name: "app".into(), path: "main.c".into() });
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        assert!(model.find_target("app").unwrap().has_source("main.c"));
    }

    #[test]
    fn duplicate_target_declaration_is_an_error() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::TargetDeclare { name: "app".into(), ty: events::TargetType::Executable, win32_executable: false, macosx_bundle: false });
        push(&mut stream, Event::TargetDeclare { name: "app".into(), ty: events::TargetType::Executable, win32_executable: false, macosx_bundle: false });
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(sink.has_errors());
    }

    #[test]
    fn interface_library_rejects_sources() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::TargetDeclare { name: "iface".into(), ty: events::TargetType::LibraryInterface, win32_executable: false, macosx_bundle: false });
        push(&mut stream, Event::TargetAddSource { target_name: "iface".into(), path: "x.c".into() });
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(sink.has_errors());
        let model = builder.finish().unwrap();
        assert!(model.find_target("iface").unwrap().sources.is_empty());
    }

    #[test]
    fn directory_stack_underflow_is_fatal() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::DirPop);
        push(&mut stream, Event::DirPop);
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(builder.has_fatal_error());
        assert!(builder.finish().is_none());
    }

    #[test]
    fn required_find_package_not_found_is_an_error() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(
            &mut stream,
            Event::FindPackage {
                package_name: "Zlib".into(),
                mode: "MODULE".into(),
                required: true,
                found: false,
                location: None,
            },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(sink.has_errors());
    }

    #[test]
    fn link_library_naming_a_declared_target_becomes_a_dependency() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::TargetDeclare { name: "app".into(), ty: events::TargetType::Executable, win32_executable: false, macosx_bundle: false });
        push(&mut stream, Event::TargetDeclare { name: "util".into(), ty: events::TargetType::LibraryStatic, win32_executable: false, macosx_bundle: false });
        push(
            &mut stream,
            Event::TargetLinkLibraries {
                target_name: "app".into(),
                visibility: EvVisibility::Private,
                item: crate::events::Conditional::unconditional("util".to_string()),
            },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        assert_eq!(model.find_target("app").unwrap().dependencies, vec!["util".to_string()]);
        assert!(!sink.has_warnings());
    }

    #[test]
    fn link_library_that_looks_like_a_missing_target_warns() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::TargetDeclare { name: "app".into(), ty: events::TargetType::Executable, win32_executable: false, macosx_bundle: false });
        push(
            &mut stream,
            Event::TargetLinkLibraries {
                target_name: "app".into(),
                visibility: EvVisibility::Private,
                item: crate::events::Conditional::unconditional("somelib".to_string()),
            },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(sink.has_warnings());
    }

    #[test]
    fn link_library_with_a_file_path_does_not_warn() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::TargetDeclare { name: "app".into(), ty: events::TargetType::Executable, win32_executable: false, macosx_bundle: false });
        push(
            &mut stream,
            Event::TargetLinkLibraries {
                target_name: "app".into(),
                visibility: EvVisibility::Private,
                item: crate::events::Conditional::unconditional("/usr/lib/libm.so".to_string()),
            },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(!sink.has_warnings());
    }

    #[test]
    fn project_declare_sets_name_and_version() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(
            &mut stream,
            Event::ProjectDeclare {
                name: "demo".into(),
                version: Some("1.2.3".into()),
                description: None,
                languages: vec!["C".into()],
            },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        assert_eq!(model.project_name.as_deref(), Some("demo"));
        assert_eq!(model.project_version.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn diagnostic_event_is_forwarded_to_sink() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(
            &mut stream,
            Event::Diagnostic {
                severity: DiagSeverity::Warning,
                component: "evaluator".into(),
                command: Some("message".into()),
                code: None,
                error_class: None,
                cause: "unsupported argument".into(),
                hint: None,
            },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(sink.has_warnings());
    }

    #[test]
    fn platform_init_sets_model_flags() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::PlatformInit { is_windows: false, is_unix: true, is_apple: false, is_linux: true });
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        assert!(model.is_unix);
        assert!(model.is_linux);
        assert!(!model.is_windows);
    }

    #[test]
    fn set_cache_entry_carries_type_and_doc() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(
            &mut stream,
            Event::SetCacheEntry { key: "FOO".into(), value: "1".into(), type_name: "BOOL".into(), doc: "enable foo".into() },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        let entry = model.cache_variables.get("FOO").unwrap();
        assert_eq!(entry.value, "1");
        assert_eq!(entry.type_name, "BOOL");
        assert_eq!(entry.doc, "enable foo");
    }

    #[test]
    fn win32_executable_keyword_is_recorded_on_the_target() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(
            &mut stream,
            Event::TargetDeclare { name: "app".into(), ty: events::TargetType::Executable, win32_executable: true, macosx_bundle: false },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        assert!(model.find_target("app").unwrap().win32_executable);
    }

    #[test]
    fn custom_command_output_is_recorded_at_top_level() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(
            &mut stream,
            Event::CustomCommandOutput {
                common: crate::events::CustomCommandCommon {
                    commands: vec!["echo".into(), "hi".into()],
                    working_dir: None,
                    comment: None,
                    outputs: vec!["gen.c".into()],
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
                },
            },
        );
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        assert_eq!(model.output_custom_commands.len(), 1);
        assert_eq!(model.output_custom_commands[0].outputs, vec!["gen.c".to_string()]);
    }

    #[test]
    fn add_subdirectory_records_parent_directory_index() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::DirPush { source_dir: "/src/sub".into(), binary_dir: "/build/sub".into() });
        push(&mut stream, Event::TargetDeclare { name: "sublib".into(), ty: events::TargetType::LibraryStatic, win32_executable: false, macosx_bundle: false });
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        let model = builder.finish().unwrap();
        assert_eq!(model.directories[1].parent_index, Some(0));
        assert_eq!(model.find_target("sublib").unwrap().directory_index, 1);
    }

    #[test]
    fn sibling_subdirectories_keep_independent_directory_nodes() {
        let mut sink = DiagnosticSink::new();
        let mut stream = EventStream::new();
        push(&mut stream, Event::DirPush { source_dir: "/src/a".into(), binary_dir: "/build/a".into() });
        push(
            &mut stream,
            Event::DirectoryIncludeDirectories { path: "/src/a/inc".into(), is_system: false, is_before: false },
        );
        push(&mut stream, Event::TargetDeclare { name: "a".into(), ty: events::TargetType::LibraryStatic, win32_executable: false, macosx_bundle: false });
        push(&mut stream, Event::DirPop);
        push(&mut stream, Event::DirPush { source_dir: "/src/b".into(), binary_dir: "/build/b".into() });
        push(
            &mut stream,
            Event::DirectoryIncludeDirectories { path: "/src/b/inc".into(), is_system: false, is_before: false },
        );
        push(&mut stream, Event::TargetDeclare { name: "b".into(), ty: events::TargetType::LibraryStatic, win32_executable: false, macosx_bundle: false });
        push(&mut stream, Event::DirPop);
        let mut builder = Builder::new(&mut sink);
        builder.apply_stream(&stream);
        assert!(!builder.has_fatal_error());
        let model = builder.finish().unwrap();

        // Both sibling scopes survive as distinct, non-aliased nodes even
        // though neither is on the directory stack by the time we inspect them.
        assert_eq!(model.directories.len(), 3);
        assert_eq!(model.directories[1].parent_index, Some(0));
        assert_eq!(model.directories[2].parent_index, Some(0));

        let a = model.find_target("a").unwrap();
        let b = model.find_target("b").unwrap();
        assert_eq!(a.directory_index, 1);
        assert_eq!(b.directory_index, 2);
        assert_ne!(a.directory_index, b.directory_index);

        let a_dir = &model.directories[a.directory_index];
        let b_dir = &model.directories[b.directory_index];
        assert_eq!(a_dir.include_directories.len(), 1);
        assert_eq!(b_dir.include_directories.len(), 1);
        assert_eq!(a_dir.include_directories[0].item.value, "/src/a/inc");
        assert_eq!(b_dir.include_directories[0].item.value, "/src/b/inc");

        // after both pops, the stack is back at the root scope
        assert_eq!(model.current_directory_index(), 0);
    }
}
