//! The Event IR: the boundary contract between the evaluator and the
//! builder. A closed sum of every fact the evaluator can emit, with owned
//! `String` payloads in place of the reference's arena-backed string views.

use std::path::PathBuf;

use crate::logic::Condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Unspecified,
    Private,
    Public,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOp {
    Set,
    AppendList,
    AppendString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Executable,
    LibraryStatic,
    LibraryShared,
    LibraryModule,
    LibraryInterface,
    LibraryObject,
    LibraryUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallRuleType {
    Target,
    File,
    Program,
    Directory,
}

/// A value carried alongside an optional condition under which it applies,
/// e.g. a link item qualified `debug`/`optimized`/`general`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional<T> {
    pub value: T,
    pub condition: Option<Condition>,
}

impl<T> Conditional<T> {
    pub fn unconditional(value: T) -> Self {
        Conditional { value, condition: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOrigin {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct CustomCommandCommon {
    pub commands: Vec<String>,
    pub working_dir: Option<String>,
    pub comment: Option<String>,
    pub outputs: Vec<String>,
    pub byproducts: Vec<String>,
    pub depends: Vec<String>,
    pub main_dependency: Option<String>,
    pub depfile: Option<String>,
    pub append: bool,
    pub verbatim: bool,
    pub uses_terminal: bool,
    pub command_expand_lists: bool,
    pub depends_explicit_only: bool,
    pub codegen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomCommandStage {
    PreBuild,
    PreLink,
    PostBuild,
}

/// One fact emitted by the evaluator. A closed sum rather than a class
/// hierarchy: downstream code matches exhaustively instead of dispatching
/// through virtual calls.
#[derive(Debug, Clone)]
pub enum Event {
    Diagnostic {
        severity: DiagSeverity,
        component: String,
        command: Option<String>,
        code: Option<String>,
        error_class: Option<String>,
        cause: String,
        hint: Option<String>,
    },
    ProjectDeclare {
        name: String,
        version: Option<String>,
        description: Option<String>,
        languages: Vec<String>,
    },
    VarSet {
        key: String,
        value: String,
    },
    SetCacheEntry {
        key: String,
        value: String,
        type_name: String,
        doc: String,
    },
    PlatformInit {
        is_windows: bool,
        is_unix: bool,
        is_apple: bool,
        is_linux: bool,
    },
    TargetDeclare {
        name: String,
        ty: TargetType,
        win32_executable: bool,
        macosx_bundle: bool,
    },
    TargetAddSource {
        target_name: String,
        path: String,
    },
    TargetPropSet {
        target_name: String,
        key: String,
        value: String,
        op: PropertyOp,
    },
    TargetIncludeDirectories {
        target_name: String,
        visibility: Visibility,
        path: Conditional<String>,
        is_system: bool,
        is_before: bool,
    },
    TargetCompileDefinitions {
        target_name: String,
        visibility: Visibility,
        item: Conditional<String>,
    },
    TargetCompileOptions {
        target_name: String,
        visibility: Visibility,
        item: Conditional<String>,
    },
    TargetLinkLibraries {
        target_name: String,
        visibility: Visibility,
        item: Conditional<String>,
    },
    TargetLinkOptions {
        target_name: String,
        visibility: Visibility,
        item: Conditional<String>,
    },
    TargetLinkDirectories {
        target_name: String,
        visibility: Visibility,
        path: Conditional<String>,
    },
    CustomCommandTarget {
        target_name: String,
        stage: CustomCommandStage,
        common: CustomCommandCommon,
    },
    CustomCommandOutput {
        common: CustomCommandCommon,
    },
    DirPush {
        source_dir: String,
        binary_dir: String,
    },
    DirPop,
    DirectoryIncludeDirectories {
        path: String,
        is_system: bool,
        is_before: bool,
    },
    DirectoryLinkDirectories {
        path: String,
        is_before: bool,
    },
    GlobalCompileDefinitions {
        item: String,
    },
    GlobalCompileOptions {
        item: String,
    },
    GlobalLinkOptions {
        item: String,
    },
    GlobalLinkLibraries {
        item: String,
    },
    TestingEnable {
        enabled: bool,
    },
    TestAdd {
        name: String,
        command: Vec<String>,
        working_dir: Option<String>,
        command_expand_lists: bool,
    },
    InstallAddRule {
        rule_type: InstallRuleType,
        item: String,
        destination: Option<String>,
    },
    CpackAddInstallType {
        name: String,
        display_name: Option<String>,
    },
    CpackAddComponentGroup {
        name: String,
        display_name: Option<String>,
        description: Option<String>,
        parent_group: Option<String>,
        expanded: bool,
        bold_title: bool,
    },
    CpackAddComponent {
        name: String,
        display_name: Option<String>,
        description: Option<String>,
        group: Option<String>,
        depends: Vec<String>,
        install_types: Vec<String>,
        required: bool,
        hidden: bool,
        disabled: bool,
        downloaded: bool,
    },
    FindPackage {
        package_name: String,
        mode: String,
        required: bool,
        found: bool,
        location: Option<String>,
    },
}

impl Event {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Event::Diagnostic { .. } => "DIAGNOSTIC",
            Event::ProjectDeclare { .. } => "PROJECT_DECLARE",
            Event::VarSet { .. } => "VAR_SET",
            Event::SetCacheEntry { .. } => "SET_CACHE_ENTRY",
            Event::PlatformInit { .. } => "PLATFORM_INIT",
            Event::TargetDeclare { .. } => "TARGET_DECLARE",
            Event::TargetAddSource { .. } => "TARGET_ADD_SOURCE",
            Event::TargetPropSet { .. } => "TARGET_PROP_SET",
            Event::TargetIncludeDirectories { .. } => "TARGET_INCLUDE_DIRECTORIES",
            Event::TargetCompileDefinitions { .. } => "TARGET_COMPILE_DEFINITIONS",
            Event::TargetCompileOptions { .. } => "TARGET_COMPILE_OPTIONS",
            Event::TargetLinkLibraries { .. } => "TARGET_LINK_LIBRARIES",
            Event::TargetLinkOptions { .. } => "TARGET_LINK_OPTIONS",
            Event::TargetLinkDirectories { .. } => "TARGET_LINK_DIRECTORIES",
            Event::CustomCommandTarget { .. } => "CUSTOM_COMMAND_TARGET",
            Event::CustomCommandOutput { .. } => "CUSTOM_COMMAND_OUTPUT",
            Event::DirPush { .. } => "DIR_PUSH",
            Event::DirPop => "DIR_POP",
            Event::DirectoryIncludeDirectories { .. } => "DIRECTORY_INCLUDE_DIRECTORIES",
            Event::DirectoryLinkDirectories { .. } => "DIRECTORY_LINK_DIRECTORIES",
            Event::GlobalCompileDefinitions { .. } => "GLOBAL_COMPILE_DEFINITIONS",
            Event::GlobalCompileOptions { .. } => "GLOBAL_COMPILE_OPTIONS",
            Event::GlobalLinkOptions { .. } => "GLOBAL_LINK_OPTIONS",
            Event::GlobalLinkLibraries { .. } => "GLOBAL_LINK_LIBRARIES",
            Event::TestingEnable { .. } => "TESTING_ENABLE",
            Event::TestAdd { .. } => "TEST_ADD",
            Event::InstallAddRule { .. } => "INSTALL_ADD_RULE",
            Event::CpackAddInstallType { .. } => "CPACK_ADD_INSTALL_TYPE",
            Event::CpackAddComponentGroup { .. } => "CPACK_ADD_COMPONENT_GROUP",
            Event::CpackAddComponent { .. } => "CPACK_ADD_COMPONENT",
            Event::FindPackage { .. } => "FIND_PACKAGE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event: Event,
    pub origin: EventOrigin,
}

/// Append-only event log produced by the evaluator and consumed by the
/// builder. Plain `Vec` backing: no arena bookkeeping is needed once events
/// own their string payloads outright.
#[derive(Debug, Clone, Default)]
pub struct EventStream {
    items: Vec<EventRecord>,
}

impl EventStream {
    pub fn new() -> Self {
        EventStream { items: Vec::new() }
    }

    pub fn push(&mut self, event: Event, origin: EventOrigin) {
        self.items.push(EventRecord { event, origin });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventRecord> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, rec) in self.items.iter().enumerate() {
            out.push_str(&format!("[{i}] {}\n", rec.event.kind_name()));
        }
        out
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a EventRecord;
    type IntoIter = std::slice::Iter<'a, EventRecord>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_iterate_preserves_order() {
        let mut stream = EventStream::new();
        stream.push(
            Event::ProjectDeclare { name: "demo".into(), version: None, description: None, languages: vec![] },
            EventOrigin::default(),
        );
        stream.push(
            Event::TargetDeclare { name: "app".into(), ty: TargetType::Executable, win32_executable: false, macosx_bundle: false },
            EventOrigin::default(),
        );
        let kinds: Vec<&str> = stream.iter().map(|r| r.event.kind_name()).collect();
        assert_eq!(kinds, vec!["PROJECT_DECLARE", "TARGET_DECLARE"]);
    }

    #[test]
    fn dump_lists_events_in_order() {
        let mut stream = EventStream::new();
        stream.push(Event::DirPop, EventOrigin::default());
        let dump = stream.dump();
        assert_eq!(dump, "[0] DIR_POP\n");
    }

    #[test]
    fn conditional_wraps_optional_condition() {
        let unconditional: Conditional<String> = Conditional::unconditional("x".to_string());
        assert!(unconditional.condition.is_none());
        let conditional = Conditional { value: "y".to_string(), condition: Some(Condition::True) };
        assert!(conditional.condition.is_some());
    }
}
