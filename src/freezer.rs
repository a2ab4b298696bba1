//! Freezer & Validator (§4.8): validates the mutable [`BuildModel`], then
//! deep-copies it into an interned, immutable [`FrozenModel`].
//!
//! Ordering follows the reference implementation's actual control flow
//! (validate the unfrozen model, freeze only on success) rather than the
//! distilled prose's "freeze, then validate" phrasing -- see SPEC_FULL.md
//! §11 Open Question A. A failed validation short-circuits before any
//! interning work, which is also strictly cheaper.

use std::collections::BTreeMap;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;

use crate::diagnostics::{Diagnostic, DiagnosticSink, Origin, Severity};
use crate::interning::Interner;
use crate::model::{
    BuildModel, FrozenModel, FrozenTarget, FrozenVisibilityItem, InstallRule, Target, VisibilityItem,
};

const COMPONENT: &str = "freezer";

/// Runs validation against the mutable model; on success, freezes it into
/// an interned, immutable [`FrozenModel`]. Returns `None` (with diagnostics
/// already logged to `sink`) when validation fails.
pub fn freeze(model: &BuildModel, sink: &mut DiagnosticSink) -> Option<FrozenModel> {
    if !validate(model, sink) {
        return None;
    }
    Some(do_freeze(model))
}

fn log_error(sink: &mut DiagnosticSink, cause: impl Into<String>) {
    sink.log(Diagnostic { severity: Severity::Error, component: COMPONENT.to_string(), origin: Origin::default(), command: None, cause: cause.into(), hint: None });
}

fn log_warning(sink: &mut DiagnosticSink, cause: impl Into<String>) {
    sink.log(Diagnostic { severity: Severity::Warning, component: COMPONENT.to_string(), origin: Origin::default(), command: None, cause: cause.into(), hint: None });
}

/// Runs every check of §4.8's "Validate" list against `model`. Returns
/// `true` only if no error-level diagnostic was logged (warnings, such as
/// duplicate sources, do not fail validation).
fn validate(model: &BuildModel, sink: &mut DiagnosticSink) -> bool {
    let errors_before = sink.error_count();

    validate_structural(model, sink);
    validate_dependencies(model, sink);
    validate_acyclic(model, sink);
    validate_semantic(model, sink);

    sink.error_count() == errors_before
}

fn validate_structural(model: &BuildModel, sink: &mut DiagnosticSink) {
    let mut seen = std::collections::HashSet::new();
    for target in &model.targets {
        if target.name.is_empty() {
            log_error(sink, "target has an empty name");
            continue;
        }
        if !seen.insert(target.name.as_str()) {
            log_error(sink, format!("duplicate target name '{}'", target.name));
        }
    }
}

fn validate_dependencies(model: &BuildModel, sink: &mut DiagnosticSink) {
    for target in &model.targets {
        for dep in target.dependencies.iter().chain(&target.object_dependencies).chain(&target.interface_dependencies) {
            if model.find_target(dep).is_none() && !looks_like_opaque_library(dep) {
                log_error(sink, format!("target '{}' depends on undeclared target '{dep}'", target.name));
            }
        }
    }
}

/// A link item that is actually a file path or linker flag rather than a
/// target reference never needed a declared-target counterpart.
fn looks_like_opaque_library(item: &str) -> bool {
    item.contains('/') || item.contains('.') || item.starts_with('-') || item.contains('\\')
}

/// DFS cycle check over (build ∪ object ∪ interface) dependency edges,
/// using `petgraph`'s tri-color DFS rather than hand-rolling one (§9
/// "Cyclic graphs" design note: model as names + a name-indexed table).
fn validate_acyclic(model: &BuildModel, sink: &mut DiagnosticSink) {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index_of = BTreeMap::new();
    for target in &model.targets {
        let idx = graph.add_node(target.name.as_str());
        index_of.insert(target.name.as_str(), idx);
    }
    for target in &model.targets {
        let Some(&from) = index_of.get(target.name.as_str()) else { continue };
        for dep in target.dependencies.iter().chain(&target.object_dependencies).chain(&target.interface_dependencies) {
            if let Some(&to) = index_of.get(dep.as_str()) {
                graph.add_edge(from, to, ());
            }
        }
    }
    if is_cyclic_directed(&graph) {
        log_error(sink, "dependency cycle detected among target link/build dependencies");
    }
}

fn validate_semantic(model: &BuildModel, sink: &mut DiagnosticSink) {
    for target in &model.targets {
        if target.ty.is_interface() {
            if !target.sources.is_empty() {
                log_error(sink, format!("interface target '{}' has source files", target.name));
            }
            let has_non_interface_link = target.dependencies.iter().any(|d| !target.interface_dependencies.contains(d));
            if has_non_interface_link {
                log_error(sink, format!("interface target '{}' has a non-INTERFACE link dependency", target.name));
            }
        }
        let mut seen_sources = std::collections::HashSet::new();
        for src in &target.sources {
            if !seen_sources.insert(src.as_str()) {
                log_warning(sink, format!("target '{}' lists source '{src}' more than once", target.name));
            }
        }
    }
    for rule in &model.install_rules {
        if rule.destination.as_deref().unwrap_or("").is_empty() {
            log_error(sink, format!("install rule for '{}' has no destination", rule.item));
        }
    }
    for test in &model.tests {
        if test.name.is_empty() || test.command.is_empty() {
            log_error(sink, "test has an empty name or command");
        }
    }
    for component in &model.cpack.components {
        if let Some(group) = &component.group {
            if !model.cpack.component_groups.iter().any(|g| &g.name == group) {
                log_error(sink, format!("CPack component '{}' references undeclared group '{group}'", component.name));
            }
        }
        for install_type in &component.install_types {
            if !model.cpack.install_types.iter().any(|t| &t.name == install_type) {
                log_error(sink, format!("CPack component '{}' references undeclared install type '{install_type}'", component.name));
            }
        }
        for dep in &component.depends {
            if !model.cpack.components.iter().any(|c| &c.name == dep) {
                log_error(sink, format!("CPack component '{}' depends on undeclared component '{dep}'", component.name));
            }
        }
    }
}

fn freeze_visibility_items<T: AsRef<str>>(interner: &mut Interner, items: &[VisibilityItem<T>]) -> Vec<FrozenVisibilityItem> {
    items
        .iter()
        .map(|vi| FrozenVisibilityItem {
            value: interner.intern(vi.item.value.as_ref()),
            condition: vi.item.condition.clone(),
            visibility: vi.visibility,
        })
        .collect()
}

fn freeze_target(interner: &mut Interner, target: &Target) -> FrozenTarget {
    FrozenTarget {
        name: interner.intern(&target.name),
        ty: target.ty,
        alias_of: target.alias_of.as_deref().map(|s| interner.intern(s)),
        sources: target.sources.iter().map(|s| interner.intern(s)).collect(),
        dependencies: target.dependencies.iter().map(|s| interner.intern(s)).collect(),
        compile_definitions: freeze_visibility_items(interner, &target.compile_definitions),
        include_directories: freeze_visibility_items(interner, &target.include_directories),
        compile_options: freeze_visibility_items(interner, &target.compile_options),
        link_libraries: freeze_visibility_items(interner, &target.link_libraries),
        link_options: freeze_visibility_items(interner, &target.link_options),
        link_directories: freeze_visibility_items(interner, &target.link_directories),
        properties: target.properties.iter().map(|(k, v)| (interner.intern(k), interner.intern(v))).collect(),
        directory_index: target.directory_index,
        output_name: target.output_name.as_deref().map(|s| interner.intern(s)),
        output_directory: target.output_directory.as_deref().map(|s| interner.intern(s)),
        runtime_output_directory: target.runtime_output_directory.as_deref().map(|s| interner.intern(s)),
        archive_output_directory: target.archive_output_directory.as_deref().map(|s| interner.intern(s)),
        prefix: target.prefix.as_deref().map(|s| interner.intern(s)),
        suffix: target.suffix.as_deref().map(|s| interner.intern(s)),
        win32_executable: target.win32_executable,
        macosx_bundle: target.macosx_bundle,
    }
}

/// Deep-copies `model` through a fresh [`Interner`] into a [`FrozenModel`].
/// Assumes `model` already passed [`validate`].
fn do_freeze(model: &BuildModel) -> FrozenModel {
    let mut interner = Interner::new();
    let targets = model.targets.iter().map(|t| freeze_target(&mut interner, t)).collect();
    let install_rules: Vec<InstallRule> = model.install_rules.clone();
    let cache_variables = model
        .cache_variables
        .iter()
        .map(|(k, v)| (interner.intern(k), v.clone()))
        .collect();
    FrozenModel {
        project_name: model.project_name.as_deref().map(|s| interner.intern(s)),
        project_version: model.project_version.as_deref().map(|s| interner.intern(s)),
        project_description: model.project_description.as_deref().map(|s| interner.intern(s)),
        project_languages: model.project_languages.iter().map(|s| interner.intern(s)).collect(),
        targets,
        tests: model.tests.clone(),
        packages: model.packages.clone(),
        install_rules,
        cpack: model.cpack.clone(),
        testing_enabled: model.testing_enabled,
        install_enabled: model.install_enabled,
        cache_variables,
        output_custom_commands: model.output_custom_commands.clone(),
        is_windows: model.is_windows,
        is_unix: model.is_unix,
        is_apple: model.is_apple,
        is_linux: model.is_linux,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetType;

    #[test]
    fn valid_model_freezes_successfully() {
        let mut model = BuildModel::new();
        model.add_target("app", TargetType::Executable).sources.push("main.c".to_string());
        let mut sink = DiagnosticSink::new();
        let frozen = freeze(&model, &mut sink).expect("should freeze");
        assert!(!sink.has_errors());
        assert_eq!(frozen.targets.len(), 1);
        assert_eq!(frozen.targets[0].name.as_str(), "app");
    }

    #[test]
    fn duplicate_target_names_fail_validation() {
        let mut model = BuildModel::new();
        model.add_target("app", TargetType::Executable);
        model.add_target("app", TargetType::Executable);
        let mut sink = DiagnosticSink::new();
        assert!(freeze(&model, &mut sink).is_none());
        assert!(sink.has_errors());
    }

    #[test]
    fn undeclared_dependency_fails_validation() {
        let mut model = BuildModel::new();
        model.add_target("app", TargetType::Executable).dependencies.push("missing".to_string());
        let mut sink = DiagnosticSink::new();
        assert!(freeze(&model, &mut sink).is_none());
    }

    #[test]
    fn opaque_library_path_is_not_treated_as_a_missing_target() {
        let mut model = BuildModel::new();
        model.add_target("app", TargetType::Executable).dependencies.push("/usr/lib/libm.so".to_string());
        let mut sink = DiagnosticSink::new();
        assert!(freeze(&model, &mut sink).is_some());
    }

    #[test]
    fn dependency_cycle_fails_validation() {
        let mut model = BuildModel::new();
        model.add_target("a", TargetType::LibraryStatic).dependencies.push("b".to_string());
        model.add_target("b", TargetType::LibraryStatic).dependencies.push("a".to_string());
        let mut sink = DiagnosticSink::new();
        assert!(freeze(&model, &mut sink).is_none());
        assert!(sink.records().iter().any(|d| d.cause.contains("cycle")));
    }

    #[test]
    fn interface_target_with_sources_fails_validation() {
        let mut model = BuildModel::new();
        model.add_target("api", TargetType::LibraryInterface).sources.push("x.c".to_string());
        let mut sink = DiagnosticSink::new();
        assert!(freeze(&model, &mut sink).is_none());
    }

    #[test]
    fn install_rule_without_destination_fails_validation() {
        let mut model = BuildModel::new();
        model.add_install_rule(crate::model::InstallRuleType::File, "README.md", None);
        let mut sink = DiagnosticSink::new();
        assert!(freeze(&model, &mut sink).is_none());
    }

    #[test]
    fn duplicate_source_is_a_warning_not_an_error() {
        let mut model = BuildModel::new();
        let target = model.add_target("app", TargetType::Executable);
        target.sources.push("main.c".to_string());
        target.sources.push("main.c".to_string());
        let mut sink = DiagnosticSink::new();
        assert!(freeze(&model, &mut sink).is_some());
        assert!(sink.has_warnings());
        assert!(!sink.has_errors());
    }
}
