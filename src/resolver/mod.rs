use rayon::prelude::*;
use serde::Serialize;

use crate::model::{FileIndex, LineSpan, NodeId, Span};
use crate::symbols::{ScopedCall, SymbolTable};

mod lookup;

/// Outcome of resolving one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one candidate definition.
    Resolved(NodeId),
    /// Two or more candidates, sorted by id. An edge goes to each.
    Ambiguous(Vec<NodeId>),
    /// No definition matched; no edge is created.
    Unresolved,
}

impl Resolution {
    /// Collapse a candidate list, dropping duplicates.
    pub fn from_candidates(mut candidates: Vec<NodeId>) -> Self {
        candidates.sort();
        candidates.dedup();
        match candidates.len() {
            0 => Resolution::Unresolved,
            1 => Resolution::Resolved(candidates[0]),
            _ => Resolution::Ambiguous(candidates),
        }
    }

    /// Every definition this call gets an edge to.
    pub fn targets(&self) -> &[NodeId] {
        match self {
            Resolution::Resolved(id) => std::slice::from_ref(id),
            Resolution::Ambiguous(ids) => ids,
            Resolution::Unresolved => &[],
        }
    }
}

/// Which heuristic produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Found walking the caller's scope chain.
    Lexical,
    /// Found through a statically known receiver.
    Receiver,
    /// Best-effort match on the trailing name across the project.
    Global,
}

#[derive(Debug, Clone)]
pub struct ResolutionReport {
    pub caller: NodeId,
    pub file: FileIndex,
    pub span: Span,
    pub line_span: LineSpan,
    /// Callee as written.
    pub text: String,
    pub resolution: Resolution,
    pub matched_by: Option<MatchKind>,
}

impl ResolutionReport {
    pub fn line(&self) -> usize {
        self.line_span.start.line
    }
}

/// Maps call sites to definitions using scope-aware name matching.
///
/// Precedence, first non-empty wins:
/// 1. unqualified names in the caller's lexical chain,
/// 2. receivers known statically (`self`, bound names, classes, modules),
/// 3. the trailing name matched project-wide.
pub struct CallResolver<'a> {
    symbols: &'a SymbolTable,
}

impl<'a> CallResolver<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self { symbols }
    }

    pub fn resolve(&self, call: &ScopedCall) -> ResolutionReport {
        let (candidates, matched_by) = lookup::candidates(self.symbols, call);
        let resolution = Resolution::from_candidates(candidates);
        ResolutionReport {
            caller: call.caller,
            file: call.file,
            span: call.site.span,
            line_span: call.site.line_span,
            text: call.site.text.clone(),
            matched_by: if resolution == Resolution::Unresolved {
                None
            } else {
                matched_by
            },
            resolution,
        }
    }

    /// Resolve every recorded call, in parallel, returned in (file, position) order.
    pub fn resolve_all(&self) -> Vec<ResolutionReport> {
        let mut reports: Vec<ResolutionReport> = self
            .symbols
            .calls()
            .par_iter()
            .map(|call| self.resolve(call))
            .collect();
        reports.sort_by_key(|r| (r.file, r.span.start, r.span.end));
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::model::{Language, SourceFile};
    use crate::parser::ParserRegistry;

    fn table(files: &[(&str, &str)]) -> SymbolTable {
        let registry = ParserRegistry::with_defaults();
        let trees = files
            .iter()
            .map(|(path, text)| {
                let language = Language::from_path(std::path::Path::new(path)).unwrap();
                registry.parse(&SourceFile::new(*path, *text, language)).unwrap()
            })
            .collect();
        SymbolTable::build(trees, false, &mut Diagnostics::new())
    }

    /// (callee text, resolved qualified names) for every call.
    fn resolved(symbols: &SymbolTable) -> Vec<(String, Vec<String>)> {
        CallResolver::new(symbols)
            .resolve_all()
            .into_iter()
            .map(|r| {
                let names = r
                    .resolution
                    .targets()
                    .iter()
                    .map(|id| symbols.definition(*id).unwrap().qualified_name.clone())
                    .collect();
                (r.text, names)
            })
            .collect()
    }

    fn targets_of(symbols: &SymbolTable, text: &str) -> Vec<String> {
        resolved(symbols)
            .into_iter()
            .find(|(t, _)| t == text)
            .map(|(_, names)| names)
            .unwrap()
    }

    #[test]
    fn test_from_candidates() {
        assert_eq!(Resolution::from_candidates(vec![]), Resolution::Unresolved);
        assert_eq!(
            Resolution::from_candidates(vec![NodeId(3), NodeId(3)]),
            Resolution::Resolved(NodeId(3))
        );
        assert_eq!(
            Resolution::from_candidates(vec![NodeId(5), NodeId(1)]),
            Resolution::Ambiguous(vec![NodeId(1), NodeId(5)])
        );
    }

    #[test]
    fn test_lexical_beats_global() {
        let symbols = table(&[
            (
                "a.py",
                r#"
def helper():
    pass

def main():
    helper()
"#,
            ),
            ("b.py", "def helper():\n    pass\n"),
        ]);
        assert_eq!(targets_of(&symbols, "helper"), vec!["a.helper"]);
    }

    #[test]
    fn test_nested_definition_shadows_outer() {
        let symbols = table(&[(
            "a.py",
            r#"
def step():
    pass

def main():
    def step():
        pass
    step()
"#,
        )]);
        assert_eq!(targets_of(&symbols, "step"), vec!["a.main.step"]);
    }

    #[test]
    fn test_unqualified_falls_back_to_other_files() {
        let symbols = table(&[
            ("main.py", "def run():\n    load()\n    Parser()\n"),
            ("io.py", "def load():\n    pass\n"),
            (
                "parse.py",
                "class Parser:\n    def __init__(self):\n        pass\n",
            ),
        ]);
        assert_eq!(targets_of(&symbols, "load"), vec!["io.load"]);
        assert_eq!(targets_of(&symbols, "Parser"), vec!["parse.Parser.__init__"]);
    }

    #[test]
    fn test_class_methods_are_not_lexically_visible() {
        let symbols = table(&[(
            "a.py",
            r#"
class Worker:
    def flush(self):
        pass

    def run(self):
        flush()
"#,
        )]);
        let report = CallResolver::new(&symbols).resolve_all();
        assert_eq!(report[0].resolution, Resolution::Unresolved);
        assert_eq!(report[0].matched_by, None);
    }

    #[test]
    fn test_self_receiver_uses_enclosing_class() {
        let symbols = table(&[(
            "a.py",
            r#"
class A:
    def helper(self):
        pass
    def run(self):
        self.helper()

class B:
    def helper(self):
        pass
"#,
        )]);
        assert_eq!(targets_of(&symbols, "self.helper"), vec!["a.A.helper"]);
    }

    #[test]
    fn test_binding_traces_to_class() {
        let symbols = table(&[(
            "app.py",
            r#"
class Foo:
    def run(self):
        pass

class Bar:
    def run(self):
        pass

def main():
    x = Foo()
    x.run()
"#,
        )]);
        assert_eq!(targets_of(&symbols, "x.run"), vec!["app.Foo.run"]);
        assert_eq!(targets_of(&symbols, "Foo"), Vec::<String>::new());
    }

    #[test]
    fn test_untraceable_receiver_is_ambiguous() {
        let symbols = table(&[(
            "app.py",
            r#"
class A:
    def handler(self):
        pass

class B:
    def handler(self):
        pass

def dispatch(obj):
    obj.handler()
"#,
        )]);
        let reports = CallResolver::new(&symbols).resolve_all();
        assert_eq!(
            reports[0].resolution,
            Resolution::Ambiguous(vec![NodeId(0), NodeId(1)])
        );
        assert_eq!(reports[0].matched_by, Some(MatchKind::Global));
    }

    #[test]
    fn test_module_and_class_receivers() {
        let symbols = table(&[
            (
                "main.py",
                "def run():\n    util.load()\n    Config.defaults()\n    models.Account()\n",
            ),
            ("util.py", "def load():\n    pass\n"),
            ("other.py", "def load():\n    pass\n"),
            (
                "models.py",
                r#"
class Account:
    def __init__(self):
        pass

class Config:
    def defaults(self):
        pass
"#,
            ),
        ]);
        assert_eq!(targets_of(&symbols, "util.load"), vec!["util.load"]);
        assert_eq!(
            targets_of(&symbols, "Config.defaults"),
            vec!["models.Config.defaults"]
        );
        assert_eq!(
            targets_of(&symbols, "models.Account"),
            vec!["models.Account.__init__"]
        );
    }

    #[test]
    fn test_unknown_library_call_is_unresolved() {
        let symbols = table(&[("client.py", "def fetch():\n    requests.get(url)\n")]);
        let reports = CallResolver::new(&symbols).resolve_all();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].resolution, Resolution::Unresolved);
        assert_eq!(reports[0].text, "requests.get");
    }

    #[test]
    fn test_javascript_this_and_new() {
        let symbols = table(&[(
            "service.js",
            r#"
class Service {
    constructor() { this.init(); }
    init() { }
}

function main() {
    const svc = new Service();
    svc.init();
}
"#,
        )]);
        assert_eq!(targets_of(&symbols, "this.init"), vec!["service.Service.init"]);
        assert_eq!(
            targets_of(&symbols, "Service"),
            vec!["service.Service.constructor"]
        );
        assert_eq!(targets_of(&symbols, "svc.init"), vec!["service.Service.init"]);
    }

    #[test]
    fn test_reports_are_in_file_then_position_order() {
        let symbols = table(&[
            ("a.py", "def f():\n    g()\n    h()\n\ndef g():\n    h()\n"),
            ("b.py", "def h():\n    f()\n"),
        ]);
        let lines: Vec<(usize, usize)> = CallResolver::new(&symbols)
            .resolve_all()
            .iter()
            .map(|r| (r.file.0, r.line()))
            .collect();
        assert_eq!(lines, vec![(0, 2), (0, 3), (0, 6), (1, 2)]);
    }
}
