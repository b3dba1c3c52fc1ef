use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use tracing::debug;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::model::{
    CallSite, Definition, DefinitionDecl, FileIndex, Language, NodeId, ScopeId, ScopeKind,
    ScopeTree,
};

/// Local name of the synthetic node standing for module-level code.
pub const MODULE_NODE_NAME: &str = "<module>";

/// Methods of a registered task class that count as tasks.
pub const TASK_METHODS: [&str; 4] = ["execute", "provision", "reconcile", "purge"];

/// A call site tagged with the definition it executes in.
#[derive(Debug, Clone)]
pub struct ScopedCall {
    pub caller: NodeId,
    pub file: FileIndex,
    /// Scope the call appears directly in.
    pub scope: ScopeId,
    pub site: CallSite,
}

/// Per-file symbol indexes, kept alongside the file's scope tree.
#[derive(Debug)]
pub struct FileSymbols {
    pub index: FileIndex,
    pub path: PathBuf,
    pub stem: String,
    pub language: Language,
    pub tree: ScopeTree,
    scope_defs: HashMap<ScopeId, BTreeMap<String, NodeId>>,
    scope_classes: HashMap<ScopeId, BTreeMap<String, ScopeId>>,
    constructors: HashMap<ScopeId, NodeId>,
    module_node: Option<NodeId>,
}

impl FileSymbols {
    /// Definition named `name` declared directly in `scope`.
    pub fn definition_in(&self, scope: ScopeId, name: &str) -> Option<NodeId> {
        self.scope_defs.get(&scope)?.get(name).copied()
    }

    /// Class named `name` declared directly in `scope`.
    pub fn class_in(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        self.scope_classes.get(&scope)?.get(name).copied()
    }

    pub fn constructor(&self, class: ScopeId) -> Option<NodeId> {
        self.constructors.get(&class).copied()
    }

    /// Top-level function of this file.
    pub fn top_level(&self, name: &str) -> Option<NodeId> {
        self.definition_in(self.tree.root(), name)
    }

    pub fn module_node(&self) -> Option<NodeId> {
        self.module_node
    }
}

/// Global index of every definition in a run.
///
/// Built once, single-threaded, after all files are parsed; read-only
/// afterwards so resolution can share it across threads.
#[derive(Debug, Default)]
pub struct SymbolTable {
    files: Vec<FileSymbols>,
    definitions: BTreeMap<NodeId, Definition>,
    by_name: HashMap<String, Vec<NodeId>>,
    classes: HashMap<String, Vec<(FileIndex, ScopeId)>>,
    files_by_stem: HashMap<String, Vec<FileIndex>>,
    calls: Vec<ScopedCall>,
    dropped_calls: usize,
}

impl SymbolTable {
    /// Index `trees` in input order. Node ids are assigned file by file in
    /// pre-order source order.
    pub fn build(
        trees: Vec<ScopeTree>,
        include_module_scope: bool,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut builder = Builder {
            table: SymbolTable::default(),
            include_module_scope,
            next_id: 0,
            diagnostics,
        };
        for tree in trees {
            builder.add_file(tree);
        }
        builder.mark_tasks();
        builder.table
    }

    pub fn definition(&self, id: NodeId) -> Option<&Definition> {
        self.definitions.get(&id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn file(&self, index: FileIndex) -> &FileSymbols {
        &self.files[index.0]
    }

    pub fn files(&self) -> &[FileSymbols] {
        &self.files
    }

    /// Every non-module definition with local name `name`, in id order.
    pub fn named(&self, name: &str) -> &[NodeId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn classes_named(&self, name: &str) -> &[(FileIndex, ScopeId)] {
        self.classes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn files_with_stem(&self, stem: &str) -> &[FileIndex] {
        self.files_by_stem
            .get(stem)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Method `name` declared directly in a class body.
    pub fn method(&self, file: FileIndex, class: ScopeId, name: &str) -> Option<NodeId> {
        self.file(file).definition_in(class, name)
    }

    pub fn calls(&self) -> &[ScopedCall] {
        &self.calls
    }

    /// Module-level calls left out because no module node was requested.
    pub fn dropped_calls(&self) -> usize {
        self.dropped_calls
    }

    pub fn task_count(&self) -> usize {
        self.definitions.values().filter(|d| d.is_task).count()
    }
}

struct Builder<'d> {
    table: SymbolTable,
    include_module_scope: bool,
    next_id: u32,
    diagnostics: &'d mut Diagnostics,
}

impl Builder<'_> {
    fn add_file(&mut self, tree: ScopeTree) {
        let index = FileIndex(self.table.files.len());
        let root = tree.root();
        let mut file = FileSymbols {
            index,
            path: tree.path.clone(),
            stem: tree.scope(root).name.clone(),
            language: tree.language,
            tree,
            scope_defs: HashMap::new(),
            scope_classes: HashMap::new(),
            constructors: HashMap::new(),
            module_node: None,
        };

        let owner = if self.include_module_scope {
            let id = self.declare_module(&file);
            file.module_node = Some(id);
            Some(id)
        } else {
            None
        };
        self.walk(&mut file, root, owner);

        debug!(
            file = %file.path.display(),
            definitions = file.scope_defs.values().map(BTreeMap::len).sum::<usize>(),
            "indexed file"
        );
        self.table
            .files_by_stem
            .entry(file.stem.clone())
            .or_default()
            .push(index);
        self.table.files.push(file);
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn declare_module(&mut self, file: &FileSymbols) -> NodeId {
        let id = self.next_id();
        let root = file.tree.scope(file.tree.root());
        self.table.definitions.insert(
            id,
            Definition {
                id,
                name: MODULE_NODE_NAME.to_string(),
                qualified_name: format!("{}.{}", file.stem, MODULE_NODE_NAME),
                file: file.path.clone(),
                file_index: file.index,
                scope: root.id,
                body: root.id,
                line_span: root.line_span,
                language: file.language,
                is_constructor: false,
                is_module: true,
                is_task: false,
            },
        );
        id
    }

    fn declare(&mut self, file: &mut FileSymbols, scope: ScopeId, decl: &DefinitionDecl) -> NodeId {
        let id = self.next_id();
        let definition = Definition {
            id,
            name: decl.name.clone(),
            qualified_name: file.tree.qualified_path(decl.body),
            file: file.path.clone(),
            file_index: file.index,
            scope,
            body: decl.body,
            line_span: decl.line_span,
            language: file.language,
            is_constructor: decl.is_constructor,
            is_module: false,
            is_task: false,
        };
        file.scope_defs
            .entry(scope)
            .or_default()
            .insert(decl.name.clone(), id);
        self.table
            .by_name
            .entry(decl.name.clone())
            .or_default()
            .push(id);
        self.table.definitions.insert(id, definition);
        id
    }

    fn walk(&mut self, file: &mut FileSymbols, scope_id: ScopeId, owner: Option<NodeId>) {
        self.collect_calls(file, scope_id, owner);

        let scope = file.tree.scope(scope_id);
        let children = scope.children.clone();
        let decls = scope.definitions.clone();
        let shadowed = self.shadowed_children(file, scope_id);

        for child in children {
            if shadowed.contains(&child) {
                continue;
            }
            let kind = file.tree.scope(child).kind;
            match kind {
                ScopeKind::Function => match decls.iter().find(|d| d.body == child) {
                    Some(decl) => {
                        let id = self.declare(file, scope_id, decl);
                        self.walk(file, child, Some(id));
                    }
                    None => self.walk(file, child, owner),
                },
                ScopeKind::Class => {
                    let name = file.tree.scope(child).name.clone();
                    file.scope_classes
                        .entry(scope_id)
                        .or_default()
                        .insert(name.clone(), child);
                    self.table
                        .classes
                        .entry(name)
                        .or_default()
                        .push((file.index, child));
                    // Class bodies run in the enclosing definition
                    self.walk(file, child, owner);
                    self.pick_constructor(file, child);
                }
                ScopeKind::File => self.walk(file, child, owner),
            }
        }
    }

    /// Children of `scope_id` replaced by a later same-named sibling.
    fn shadowed_children(&mut self, file: &FileSymbols, scope_id: ScopeId) -> HashSet<ScopeId> {
        let scope = file.tree.scope(scope_id);
        // Functions and classes share one namespace: the last binding wins
        let mut last: HashMap<&str, ScopeId> = HashMap::new();
        let mut shadowed = HashSet::new();

        for &child in &scope.children {
            let child_scope = file.tree.scope(child);
            if let Some(previous) = last.insert(child_scope.name.as_str(), child) {
                shadowed.insert(previous);
                let earlier = file.tree.scope(previous);
                self.diagnostics.report(
                    DiagnosticKind::DuplicateDefinition,
                    file.path.clone(),
                    earlier.line_span.start.line,
                    file.tree.qualified_path(previous),
                    format!(
                        "`{}` is redefined on line {}; the {} on line {} is discarded",
                        file.tree.qualified_path(previous),
                        child_scope.line_span.start.line,
                        earlier.kind.as_str(),
                        earlier.line_span.start.line,
                    ),
                );
            }
        }
        shadowed
    }

    fn collect_calls(&mut self, file: &FileSymbols, scope_id: ScopeId, owner: Option<NodeId>) {
        let calls = &file.tree.scope(scope_id).calls;
        if calls.is_empty() {
            return;
        }
        match owner {
            Some(caller) => {
                self.table
                    .calls
                    .extend(calls.iter().map(|site| ScopedCall {
                        caller,
                        file: file.index,
                        scope: scope_id,
                        site: site.clone(),
                    }));
            }
            None => {
                debug!(
                    file = %file.path.display(),
                    count = calls.len(),
                    "dropping module-level calls"
                );
                self.table.dropped_calls += calls.len();
            }
        }
    }

    /// Flag task definitions once every file's registrations are known.
    ///
    /// A registered top-level function is a task. In a class, only the
    /// `TASK_METHODS` are, and only when the class (or the method name
    /// itself) is registered.
    fn mark_tasks(&mut self) {
        let names: BTreeSet<String> = self
            .table
            .files
            .iter()
            .flat_map(|f| f.tree.registrations.iter().map(|r| r.name.clone()))
            .collect();
        if names.is_empty() {
            return;
        }

        for definition in self.table.definitions.values_mut() {
            if definition.is_module || definition.language != Language::Python {
                continue;
            }
            let file = &self.table.files[definition.file_index.0];
            let scope = file.tree.scope(definition.scope);
            definition.is_task = match scope.kind {
                ScopeKind::Class => {
                    TASK_METHODS.contains(&definition.name.as_str())
                        && (names.contains(&scope.name) || names.contains(&definition.name))
                }
                ScopeKind::File => names.contains(&definition.name),
                ScopeKind::Function => false,
            };
        }
        debug!(registered = names.len(), "marked task definitions");
    }

    /// `__init__` and `constructor` win over `__new__`.
    fn pick_constructor(&mut self, file: &mut FileSymbols, class: ScopeId) {
        let Some(defs) = file.scope_defs.get(&class) else {
            return;
        };
        let chosen = defs
            .values()
            .filter_map(|id| self.table.definitions.get(id))
            .filter(|d| d.is_constructor)
            .map(|d| (u8::from(d.name == "__new__"), d.id))
            .min()
            .map(|(_, id)| id);
        if let Some(id) = chosen {
            file.constructors.insert(class, id);
        }
    }
}
