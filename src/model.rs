//! The Build Model: a mutable tree built up event-by-event, and its frozen,
//! interned, validated counterpart produced by [`crate::freezer`].

use std::collections::BTreeMap;

use crate::interning::InternedString;
use crate::logic::Condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetType {
    Executable,
    LibraryStatic,
    LibraryShared,
    LibraryModule,
    LibraryInterface,
    LibraryObject,
    LibraryUnknown,
}

impl TargetType {
    pub fn is_library(self) -> bool {
        !matches!(self, TargetType::Executable)
    }

    pub fn is_interface(self) -> bool {
        matches!(self, TargetType::LibraryInterface)
    }
}

/// A cache variable's value together with its `set(... CACHE type doc)`
/// metadata, mirroring the evaluator's internal cache-entry bookkeeping
/// instead of collapsing to a bare value once it reaches the model.
#[derive(Debug, Clone, Default)]
pub struct CacheVariable {
    pub value: String,
    pub type_name: String,
    pub doc: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Unspecified,
    Private,
    Public,
    Interface,
}

/// A value together with the condition under which it applies. `None`
/// means unconditional. Reused for every conditional property list in the
/// model (compile definitions, options, include/link directories, link
/// libraries, link options) per the unified `Condition` representation.
#[derive(Debug, Clone)]
pub struct Conditional<T> {
    pub value: T,
    pub condition: Option<Condition>,
}

impl<T> Conditional<T> {
    pub fn unconditional(value: T) -> Self {
        Conditional { value, condition: None }
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityItem<T> {
    pub item: Conditional<T>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default)]
pub struct CustomCommand {
    pub commands: Vec<String>,
    pub working_dir: Option<String>,
    pub comment: Option<String>,
    pub outputs: Vec<String>,
    pub byproducts: Vec<String>,
    pub depends: Vec<String>,
    pub main_dependency: Option<String>,
    pub depfile: Option<String>,
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

#[derive(Debug, Clone)]
pub struct TargetCustomCommand {
    pub stage: CustomCommandStage,
    pub command: CustomCommand,
}

/// One build target: library, executable, or alias. A target's properties
/// are kept as conditional lists so later tooling can recover what applies
/// under which configuration, rather than pre-flattening to one config.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub ty: TargetType,
    pub alias_of: Option<String>,
    pub imported: bool,
    pub global: bool,
    pub exclude_from_all: bool,
    pub sources: Vec<String>,
    pub dependencies: Vec<String>,
    pub object_dependencies: Vec<String>,
    pub interface_dependencies: Vec<String>,
    pub compile_definitions: Vec<VisibilityItem<String>>,
    pub include_directories: Vec<VisibilityItem<String>>,
    pub compile_options: Vec<VisibilityItem<String>>,
    pub link_libraries: Vec<VisibilityItem<String>>,
    pub link_options: Vec<VisibilityItem<String>>,
    pub link_directories: Vec<VisibilityItem<String>>,
    pub custom_commands: Vec<TargetCustomCommand>,
    pub properties: BTreeMap<String, String>,
    /// Index into [`BuildModel::directories`] of the directory scope that
    /// declared this target.
    pub directory_index: usize,
    pub output_name: Option<String>,
    pub output_directory: Option<String>,
    pub runtime_output_directory: Option<String>,
    pub archive_output_directory: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub win32_executable: bool,
    pub macosx_bundle: bool,
}

impl Target {
    pub fn new(name: impl Into<String>, ty: TargetType) -> Self {
        Target {
            name: name.into(),
            ty,
            alias_of: None,
            imported: false,
            global: false,
            exclude_from_all: false,
            sources: Vec::new(),
            dependencies: Vec::new(),
            object_dependencies: Vec::new(),
            interface_dependencies: Vec::new(),
            compile_definitions: Vec::new(),
            include_directories: Vec::new(),
            compile_options: Vec::new(),
            link_libraries: Vec::new(),
            link_options: Vec::new(),
            link_directories: Vec::new(),
            custom_commands: Vec::new(),
            properties: BTreeMap::new(),
            directory_index: 0,
            output_name: None,
            output_directory: None,
            runtime_output_directory: None,
            archive_output_directory: None,
            prefix: None,
            suffix: None,
            win32_executable: false,
            macosx_bundle: false,
        }
    }

    pub fn has_source(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }

    pub fn set_property(&mut self, key: &str, value: String, op: crate::events::PropertyOp) {
        use crate::events::PropertyOp;
        match op {
            PropertyOp::Set => {
                self.properties.insert(key.to_string(), value.clone());
            }
            PropertyOp::AppendList => {
                let entry = self.properties.entry(key.to_string()).or_default();
                if entry.is_empty() {
                    *entry = value.clone();
                } else {
                    entry.push(';');
                    entry.push_str(&value);
                }
            }
            PropertyOp::AppendString => {
                let entry = self.properties.entry(key.to_string()).or_default();
                entry.push_str(&value);
            }
        }
        self.sync_output_shape(key);
    }

    /// Mirrors a handful of well-known output-shape properties onto their
    /// dedicated fields after every property write, so output naming does
    /// not require re-scanning the generic property map downstream.
    fn sync_output_shape(&mut self, key: &str) {
        match key {
            "OUTPUT_NAME" => self.output_name = self.properties.get(key).cloned(),
            "RUNTIME_OUTPUT_DIRECTORY" => self.runtime_output_directory = self.properties.get(key).cloned(),
            "ARCHIVE_OUTPUT_DIRECTORY" => self.archive_output_directory = self.properties.get(key).cloned(),
            "LIBRARY_OUTPUT_DIRECTORY" | "OUTPUT_DIRECTORY" => self.output_directory = self.properties.get(key).cloned(),
            "PREFIX" => self.prefix = self.properties.get(key).cloned(),
            "SUFFIX" => self.suffix = self.properties.get(key).cloned(),
            _ => {}
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FoundPackage {
    pub name: String,
    pub found: bool,
    pub version: Option<String>,
    pub mode: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    pub command: String,
    pub working_directory: Option<String>,
    pub command_expand_lists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallRuleType {
    Target,
    File,
    Program,
    Directory,
}

#[derive(Debug, Clone)]
pub struct InstallRule {
    pub rule_type: InstallRuleType,
    pub item: String,
    pub destination: Option<String>,
}

/// One entry pushed by `add_subdirectory`/directory scoping. Carries its
/// own include/link-directory accumulation, mirroring the directory-level
/// state the evaluator's directory stack tracks.
#[derive(Debug, Clone, Default)]
pub struct DirectoryNode {
    pub source_dir: String,
    pub binary_dir: String,
    pub include_directories: Vec<VisibilityItem<String>>,
    pub link_directories: Vec<VisibilityItem<String>>,
    /// `SYSTEM` include directories, kept apart from the regular list so a
    /// compiler driver could still emit `-isystem` for just these.
    pub system_include_directories: Vec<VisibilityItem<String>>,
    /// Index into the owning [`BuildModel::directories`] of the directory
    /// that pushed this one via `add_subdirectory`. `None` for the root.
    pub parent_index: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct CPackInstallType {
    pub name: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CPackComponentGroup {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub parent_group: Option<String>,
    pub expanded: bool,
    pub bold_title: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CPackComponent {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
    pub depends: Vec<String>,
    pub install_types: Vec<String>,
    pub required: bool,
    pub hidden: bool,
    pub disabled: bool,
    pub downloaded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CPackModel {
    pub install_types: Vec<CPackInstallType>,
    pub component_groups: Vec<CPackComponentGroup>,
    pub components: Vec<CPackComponent>,
}

/// The mutable Build Model: the Builder's working state, populated by
/// applying [`crate::events::Event`]s left to right.
#[derive(Debug, Clone, Default)]
pub struct BuildModel {
    pub project_name: Option<String>,
    pub project_version: Option<String>,
    pub project_description: Option<String>,
    /// Languages enabled by the most recent `project()`/`enable_language()`
    /// call. A fresh `project()` call resets this list before appending its
    /// own languages (§4.7's PROJECT_DECLARE rule).
    pub project_languages: Vec<String>,
    pub targets: Vec<Target>,
    /// Append-only: every directory scope ever entered, in creation order.
    /// Never shrinks — `target.directory_index` and `DirectoryNode::
    /// parent_index` are indices into this array and must stay valid for
    /// the life of the model. The *current* scope is tracked separately by
    /// `scope_stack`.
    pub directories: Vec<DirectoryNode>,
    /// Directory-scope stack: indices into `directories`. `DirPush` appends
    /// a new node and pushes its index here; `DirPop` pops this stack only,
    /// leaving `directories` untouched.
    scope_stack: Vec<usize>,
    pub cache_variables: BTreeMap<String, CacheVariable>,
    pub env_variables: BTreeMap<String, String>,
    pub global_compile_definitions: Vec<String>,
    pub global_compile_options: Vec<String>,
    pub global_link_options: Vec<String>,
    pub global_link_libraries: Vec<String>,
    pub packages: Vec<FoundPackage>,
    pub tests: Vec<Test>,
    pub testing_enabled: bool,
    pub install_enabled: bool,
    pub install_prefix: Option<String>,
    pub install_rules: Vec<InstallRule>,
    pub cpack: CPackModel,
    /// Output-keyed custom commands (`add_custom_command(OUTPUT ...)`) not
    /// attached to any target, kept at top level per the data model rather
    /// than buried inside a directory or target.
    pub output_custom_commands: Vec<CustomCommand>,
    pub is_windows: bool,
    pub is_unix: bool,
    pub is_apple: bool,
    pub is_linux: bool,
}

impl BuildModel {
    pub fn new() -> Self {
        let mut model = BuildModel::default();
        model.directories.push(DirectoryNode::default());
        model.scope_stack.push(0);
        model
    }

    /// Index of the directory node the builder is currently inside (the top
    /// of `scope_stack`, not necessarily the last entry of `directories`).
    pub fn current_directory_index(&self) -> usize {
        *self.scope_stack.last().expect("directory scope stack always has the root frame")
    }

    /// `DirPush`: appends a new directory node (never overwriting or popping
    /// an existing one) and enters it. Returns its index.
    pub fn push_directory_scope(&mut self, node: DirectoryNode) -> usize {
        let index = self.directories.len();
        self.directories.push(node);
        self.scope_stack.push(index);
        index
    }

    /// `DirPop`: leaves the current scope, returning to its parent. The
    /// popped node's data stays in `directories` untouched — only the
    /// traversal stack shrinks. Returns `false` on an attempt to pop the
    /// root scope (stack underflow).
    pub fn pop_directory_scope(&mut self) -> bool {
        if self.scope_stack.len() <= 1 {
            return false;
        }
        self.scope_stack.pop();
        true
    }

    pub fn add_target(&mut self, name: &str, ty: TargetType) -> &mut Target {
        let mut target = Target::new(name, ty);
        target.directory_index = self.current_directory_index();
        self.targets.push(target);
        self.targets.last_mut().unwrap()
    }

    pub fn find_target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn find_target_mut(&mut self, name: &str) -> Option<&mut Target> {
        self.targets.iter_mut().find(|t| t.name == name)
    }

    pub fn find_target_index(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.name == name)
    }

    pub fn add_package(&mut self, name: &str, found: bool) -> &mut FoundPackage {
        self.packages.push(FoundPackage { name: name.to_string(), found, version: None, mode: None, location: None });
        self.packages.last_mut().unwrap()
    }

    pub fn add_test(&mut self, name: &str, command: &str, working_directory: Option<String>, command_expand_lists: bool) -> &mut Test {
        self.tests.push(Test {
            name: name.to_string(),
            command: command.to_string(),
            working_directory,
            command_expand_lists,
        });
        self.tests.last_mut().unwrap()
    }

    pub fn find_test(&self, name: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn set_cache_variable(&mut self, key: &str, value: &str, type_name: &str, doc: &str) {
        self.cache_variables.insert(
            key.to_string(),
            CacheVariable { value: value.to_string(), type_name: type_name.to_string(), doc: doc.to_string() },
        );
    }

    pub fn cache_variable(&self, key: &str) -> Option<&str> {
        self.cache_variables.get(key).map(|v| v.value.as_str())
    }

    pub fn unset_cache_variable(&mut self, key: &str) -> bool {
        self.cache_variables.remove(key).is_some()
    }

    pub fn current_directory(&self) -> &DirectoryNode {
        let index = self.current_directory_index();
        &self.directories[index]
    }

    pub fn current_directory_mut(&mut self) -> &mut DirectoryNode {
        let index = self.current_directory_index();
        &mut self.directories[index]
    }

    pub fn add_install_rule(&mut self, rule_type: InstallRuleType, item: &str, destination: Option<String>) {
        self.install_rules.push(InstallRule { rule_type, item: item.to_string(), destination });
    }

    pub fn ensure_cpack_group(&mut self, name: &str) -> &mut CPackComponentGroup {
        if let Some(idx) = self.cpack.component_groups.iter().position(|g| g.name == name) {
            return &mut self.cpack.component_groups[idx];
        }
        self.cpack.component_groups.push(CPackComponentGroup { name: name.to_string(), ..Default::default() });
        self.cpack.component_groups.last_mut().unwrap()
    }

    pub fn ensure_cpack_component(&mut self, name: &str) -> &mut CPackComponent {
        if let Some(idx) = self.cpack.components.iter().position(|c| c.name == name) {
            return &mut self.cpack.components[idx];
        }
        self.cpack.components.push(CPackComponent { name: name.to_string(), ..Default::default() });
        self.cpack.components.last_mut().unwrap()
    }

    pub fn ensure_cpack_install_type(&mut self, name: &str) -> &mut CPackInstallType {
        if let Some(idx) = self.cpack.install_types.iter().position(|t| t.name == name) {
            return &mut self.cpack.install_types[idx];
        }
        self.cpack.install_types.push(CPackInstallType { name: name.to_string(), ..Default::default() });
        self.cpack.install_types.last_mut().unwrap()
    }
}

// --- Frozen model: interned, validated, immutable. ---

#[derive(Debug, Clone)]
pub struct FrozenVisibilityItem {
    pub value: InternedString,
    pub condition: Option<Condition>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone)]
pub struct FrozenTarget {
    pub name: InternedString,
    pub ty: TargetType,
    pub alias_of: Option<InternedString>,
    pub sources: Vec<InternedString>,
    pub dependencies: Vec<InternedString>,
    pub compile_definitions: Vec<FrozenVisibilityItem>,
    pub include_directories: Vec<FrozenVisibilityItem>,
    pub compile_options: Vec<FrozenVisibilityItem>,
    pub link_libraries: Vec<FrozenVisibilityItem>,
    pub link_options: Vec<FrozenVisibilityItem>,
    pub link_directories: Vec<FrozenVisibilityItem>,
    pub properties: BTreeMap<InternedString, InternedString>,
    pub directory_index: usize,
    pub output_name: Option<InternedString>,
    pub output_directory: Option<InternedString>,
    pub runtime_output_directory: Option<InternedString>,
    pub archive_output_directory: Option<InternedString>,
    pub prefix: Option<InternedString>,
    pub suffix: Option<InternedString>,
    pub win32_executable: bool,
    pub macosx_bundle: bool,
}

/// The frozen, validated Build Model: the pipeline's final output. No
/// field is mutable after [`crate::freezer::freeze`] returns it.
#[derive(Debug, Clone)]
pub struct FrozenModel {
    pub project_name: Option<InternedString>,
    pub project_version: Option<InternedString>,
    pub project_description: Option<InternedString>,
    pub project_languages: Vec<InternedString>,
    pub targets: Vec<FrozenTarget>,
    pub tests: Vec<Test>,
    pub packages: Vec<FoundPackage>,
    pub install_rules: Vec<InstallRule>,
    pub cpack: CPackModel,
    pub testing_enabled: bool,
    pub install_enabled: bool,
    pub cache_variables: BTreeMap<InternedString, CacheVariable>,
    pub output_custom_commands: Vec<CustomCommand>,
    pub is_windows: bool,
    pub is_unix: bool,
    pub is_apple: bool,
    pub is_linux: bool,
}

impl FrozenModel {
    pub fn find_target(&self, name: &str) -> Option<&FrozenTarget> {
        self.targets.iter().find(|t| t.name.as_str() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_has_one_directory_node() {
        let model = BuildModel::new();
        assert_eq!(model.directories.len(), 1);
    }

    #[test]
    fn add_target_then_find_by_name() {
        let mut model = BuildModel::new();
        model.add_target("app", TargetType::Executable);
        assert!(model.find_target("app").is_some());
        assert!(model.find_target("missing").is_none());
    }

    #[test]
    fn property_append_list_joins_with_semicolon() {
        let mut target = Target::new("lib", TargetType::LibraryStatic);
        target.set_property("SOURCES", "a.c".to_string(), crate::events::PropertyOp::AppendList);
        target.set_property("SOURCES", "b.c".to_string(), crate::events::PropertyOp::AppendList);
        assert_eq!(target.property("SOURCES"), Some("a.c;b.c"));
    }

    #[test]
    fn property_append_string_concatenates_directly() {
        let mut target = Target::new("lib", TargetType::LibraryStatic);
        target.set_property("COMMENT", "hello ".to_string(), crate::events::PropertyOp::AppendString);
        target.set_property("COMMENT", "world".to_string(), crate::events::PropertyOp::AppendString);
        assert_eq!(target.property("COMMENT"), Some("hello world"));
    }

    #[test]
    fn ensure_cpack_group_is_idempotent_by_name() {
        let mut model = BuildModel::new();
        model.ensure_cpack_group("Runtime").display_name = Some("Runtime Files".to_string());
        model.ensure_cpack_group("Runtime");
        assert_eq!(model.cpack.component_groups.len(), 1);
        assert_eq!(model.cpack.component_groups[0].display_name.as_deref(), Some("Runtime Files"));
    }

    #[test]
    fn set_cache_variable_records_type_and_doc() {
        let mut model = BuildModel::new();
        model.set_cache_variable("FOO", "ON", "BOOL", "enables foo");
        assert_eq!(model.cache_variable("FOO"), Some("ON"));
        let entry = model.cache_variables.get("FOO").unwrap();
        assert_eq!(entry.type_name, "BOOL");
        assert_eq!(entry.doc, "enables foo");
    }

    #[test]
    fn setting_output_name_property_mirrors_onto_dedicated_field() {
        let mut target = Target::new("app", TargetType::Executable);
        target.set_property("OUTPUT_NAME", "renamed".to_string(), crate::events::PropertyOp::Set);
        assert_eq!(target.output_name.as_deref(), Some("renamed"));
    }

    #[test]
    fn add_target_records_owning_directory_index() {
        let mut model = BuildModel::new();
        model.directories.push(DirectoryNode { parent_index: Some(0), ..Default::default() });
        model.add_target("sublib", TargetType::LibraryStatic);
        assert_eq!(model.find_target("sublib").unwrap().directory_index, 1);
    }
}
