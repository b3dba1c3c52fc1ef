pub mod subset;
pub mod tasks;

use serde::Serialize;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::model::graph::CallGraph;
use crate::resolver::{Resolution, ResolutionReport};
use crate::symbols::SymbolTable;

/// How the call sites of a run resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionSummary {
    pub resolved: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
}

impl ResolutionSummary {
    pub fn total(&self) -> usize {
        self.resolved + self.ambiguous + self.unresolved
    }
}

/// Assemble the call graph from resolution reports.
///
/// Every definition becomes a node, even when nothing calls it. A resolved
/// call adds (or increments) one edge; an ambiguous call adds an edge to each
/// candidate and records one warning; an unresolved call adds nothing and
/// records one warning.
pub fn build_graph(
    symbols: &SymbolTable,
    reports: &[ResolutionReport],
    diagnostics: &mut Diagnostics,
) -> (CallGraph, ResolutionSummary) {
    let mut graph = CallGraph::new();
    for definition in symbols.definitions() {
        graph.add_node(definition.clone());
    }

    let mut summary = ResolutionSummary::default();
    for report in reports {
        for &target in report.resolution.targets() {
            graph.add_call(report.caller, target);
        }

        let path = &symbols.file(report.file).path;
        match &report.resolution {
            Resolution::Resolved(_) => summary.resolved += 1,
            Resolution::Ambiguous(candidates) => {
                summary.ambiguous += 1;
                let names: Vec<&str> = candidates
                    .iter()
                    .filter_map(|id| symbols.definition(*id))
                    .map(|d| d.qualified_name.as_str())
                    .collect();
                diagnostics.report(
                    DiagnosticKind::AmbiguousResolution,
                    path.clone(),
                    report.line(),
                    report.text.clone(),
                    format!(
                        "call to `{}` is ambiguous between {}",
                        report.text,
                        names.join(", ")
                    ),
                );
            }
            Resolution::Unresolved => {
                summary.unresolved += 1;
                diagnostics.report(
                    DiagnosticKind::UnresolvedCall,
                    path.clone(),
                    report.line(),
                    report.text.clone(),
                    format!("unresolved call `{}`", report.text),
                );
            }
        }
    }

    (graph, summary)
}
