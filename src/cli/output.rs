use serde::Serialize;

use super::OutputFormat;
use crate::model::graph::CallGraph;

/// Serialized form of a call graph.
#[derive(Debug, Serialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Serialize)]
pub struct NodeRecord {
    pub id: String,
    /// Qualified name.
    pub name: String,
    pub file: String,
    pub line: usize,
    #[serde(skip_serializing_if = "is_false")]
    pub task: bool,
}

#[derive(Debug, Serialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    pub count: u32,
    /// Task call inferred through one helper.
    #[serde(skip_serializing_if = "is_false")]
    pub possible: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl GraphDocument {
    /// Nodes by id, edges by (source, target).
    pub fn from_graph(graph: &CallGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|d| NodeRecord {
                id: d.id.to_string(),
                name: d.qualified_name.clone(),
                file: d.file.to_string_lossy().to_string(),
                line: d.line(),
                task: d.is_task,
            })
            .collect();
        let edges = graph
            .edges()
            .map(|e| EdgeRecord {
                source: e.source.to_string(),
                target: e.target.to_string(),
                count: e.count,
                possible: e.possible,
            })
            .collect();
        Self { nodes, edges }
    }
}

/// Format a call graph for output.
pub fn format_graph(graph: &CallGraph, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&GraphDocument::from_graph(graph)).unwrap_or_default()
        }
        OutputFormat::Compact => {
            serde_json::to_string(&GraphDocument::from_graph(graph)).unwrap_or_default()
        }
        OutputFormat::Text => {
            let mut output = format!("nodes ({}):\n", graph.node_count());
            for d in graph.nodes() {
                output.push_str(&format!(
                    "  {:<4} {:<40} {}:{}{}\n",
                    d.id,
                    d.qualified_name,
                    d.file.display(),
                    d.line(),
                    if d.is_task { " [task]" } else { "" },
                ));
            }
            output.push_str(&format!("edges ({}):\n", graph.edge_count()));
            for e in graph.edges() {
                let name = |id| {
                    graph
                        .node(id)
                        .map(|d| d.qualified_name.as_str())
                        .unwrap_or("?")
                };
                output.push_str(&format!(
                    "  {} -> {} (x{}){}\n",
                    name(e.source),
                    name(e.target),
                    e.count,
                    if e.possible { " (possible)" } else { "" },
                ));
            }
            output
        }
    }
}
