use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// A file failed to parse and was left out of the graph.
    SkippedFile,
    /// A call matched several definitions; an edge goes to each.
    #[serde(rename = "ambiguous-call")]
    AmbiguousResolution,
    /// A call matched nothing; no edge was created.
    UnresolvedCall,
    /// A later definition in the same scope replaced an earlier one.
    DuplicateDefinition,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::SkippedFile => "skipped-file",
            DiagnosticKind::AmbiguousResolution => "ambiguous-call",
            DiagnosticKind::UnresolvedCall => "unresolved-call",
            DiagnosticKind::DuplicateDefinition => "duplicate-definition",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-fatal finding collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: PathBuf,
    pub line: usize,
    /// The offending name: a callee, a definition, or the file itself.
    pub name: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warning[{}]: {}:{}: {}",
            self.kind,
            self.file.display(),
            self.line,
            self.message
        )
    }
}

/// Collector threaded through the pipeline stages.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn report(
        &mut self,
        kind: DiagnosticKind,
        file: impl Into<PathBuf>,
        line: usize,
        name: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic {
            kind,
            file: file.into(),
            line,
            name: name.into(),
            message: message.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.kind == kind)
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
