use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod graph;

/// Stable identifier of a definition node, unique across one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a scope inside its file's [`ScopeTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

/// Position of a parsed file in the run's input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            _ => Err(format!("unknown language: {}", s)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: Position,
    pub end: Position,
}

/// A source file loaded for analysis.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub language: Language,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>, language: Language) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            language,
        }
    }

    /// Name used for the file's root scope: the file name without extension.
    pub fn module_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    File,
    Class,
    Function,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::File => "file",
            ScopeKind::Class => "class",
            ScopeKind::Function => "function",
        }
    }
}

/// A callable declared directly in a scope. Its body is a child scope.
#[derive(Debug, Clone)]
pub struct DefinitionDecl {
    pub name: String,
    pub body: ScopeId,
    pub span: Span,
    pub line_span: LineSpan,
    pub is_constructor: bool,
}

/// What a qualified call is invoked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// `self.x()`, `cls.x()`, `this.x()`
    SelfRef,
    /// `a.b.x()` is `Path(["a", "b"])`
    Path(Vec<String>),
    /// `Foo().x()` or `new Foo().x()` is `Constructed("Foo")`
    Constructed(String),
    /// A receiver the adapter cannot name statically (subscripts, literals, ...).
    Dynamic,
}

/// A syntactic call expression.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Trailing name component of the callee.
    pub name: String,
    pub receiver: Option<Receiver>,
    /// Callee as written, e.g. `obj.method`.
    pub text: String,
    pub span: Span,
    pub line_span: LineSpan,
}

/// A static `name = Constructor(...)` assignment.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub class_name: String,
    pub line: usize,
}

/// A task named in a `start()` body, e.g. `Allocate.register(cc)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRegistration {
    /// Registered class (`Task.register(cc)`) or executor function
    /// (`cc.register(name, data, executor)`).
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub definitions: Vec<DefinitionDecl>,
    pub calls: Vec<CallSite>,
    pub bindings: Vec<Binding>,
    pub line_span: LineSpan,
}

/// Arena of scopes for one parsed file. Index 0 is the file scope.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    pub path: PathBuf,
    pub language: Language,
    pub registrations: Vec<TaskRegistration>,
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new(source: &SourceFile, line_span: LineSpan) -> Self {
        let root = Scope {
            id: ScopeId(0),
            kind: ScopeKind::File,
            name: source.module_name(),
            parent: None,
            children: Vec::new(),
            definitions: Vec::new(),
            calls: Vec::new(),
            bindings: Vec::new(),
            line_span,
        };
        Self {
            path: source.path.clone(),
            language: source.language,
            registrations: Vec::new(),
            scopes: vec![root],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Open a new child scope under `parent` and return its id.
    pub fn add_scope(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        name: &str,
        line_span: LineSpan,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            id,
            kind,
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            definitions: Vec::new(),
            calls: Vec::new(),
            bindings: Vec::new(),
            line_span,
        });
        self.scopes[parent.0].children.push(id);
        id
    }

    /// Declare a function in `scope` and open its body scope.
    pub fn add_definition(
        &mut self,
        scope: ScopeId,
        name: &str,
        span: Span,
        line_span: LineSpan,
        is_constructor: bool,
    ) -> ScopeId {
        let body = self.add_scope(scope, ScopeKind::Function, name, line_span);
        self.scopes[scope.0].definitions.push(DefinitionDecl {
            name: name.to_string(),
            body,
            span,
            line_span,
            is_constructor,
        });
        body
    }

    /// Iterate from `start` up to the file scope, innermost first.
    pub fn ancestors(&self, start: ScopeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(start),
        }
    }

    /// Nearest class scope enclosing `start` (including `start` itself).
    pub fn enclosing_class(&self, start: ScopeId) -> Option<ScopeId> {
        self.ancestors(start)
            .find(|s| s.kind == ScopeKind::Class)
            .map(|s| s.id)
    }

    /// Dot-joined names from the file scope down to `id`.
    pub fn qualified_path(&self, id: ScopeId) -> String {
        let mut names: Vec<&str> = self.ancestors(id).map(|s| s.name.as_str()).collect();
        names.reverse();
        names.join(".")
    }

    pub fn definition_count(&self) -> usize {
        self.scopes.iter().map(|s| s.definitions.len()).sum()
    }

    pub fn call_count(&self) -> usize {
        self.scopes.iter().map(|s| s.calls.len()).sum()
    }
}

pub struct Ancestors<'a> {
    tree: &'a ScopeTree,
    next: Option<ScopeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Scope;

    fn next(&mut self) -> Option<Self::Item> {
        let scope = self.tree.scope(self.next?);
        self.next = scope.parent;
        Some(scope)
    }
}

/// A named callable unit tracked by the call graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub id: NodeId,
    pub name: String,
    pub qualified_name: String,
    pub file: PathBuf,
    pub file_index: FileIndex,
    /// Scope the definition is declared in.
    pub scope: ScopeId,
    /// Scope holding the definition's body.
    pub body: ScopeId,
    pub line_span: LineSpan,
    pub language: Language,
    pub is_constructor: bool,
    /// Synthetic node standing for a file's module-level code.
    pub is_module: bool,
    /// Registered task entry point.
    pub is_task: bool,
}

impl Definition {
    pub fn line(&self) -> usize {
        self.line_span.start.line
    }
}
