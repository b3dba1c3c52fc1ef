use std::collections::BTreeSet;

use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::model::graph::{CallGraph, Direction};
use crate::model::{Definition, NodeId};

/// How a user-supplied target fragment is compared against qualified names.
#[derive(Debug)]
enum TargetPattern {
    /// Dot-separated segments that must appear contiguously.
    Segments(Vec<String>),
    Glob(GlobMatcher),
}

impl TargetPattern {
    fn parse(fragment: &str) -> Result<Self, EngineError> {
        if fragment.contains(['*', '?', '[']) {
            let glob = Glob::new(fragment).map_err(|e| EngineError::Config {
                message: format!("invalid target pattern '{}': {}", fragment, e),
            })?;
            return Ok(TargetPattern::Glob(glob.compile_matcher()));
        }
        Ok(TargetPattern::Segments(
            fragment.split('.').map(str::to_string).collect(),
        ))
    }

    fn matches(&self, definition: &Definition) -> bool {
        match self {
            TargetPattern::Glob(glob) => glob.is_match(&definition.qualified_name),
            TargetPattern::Segments(wanted) => {
                let segments: Vec<&str> = definition.qualified_name.split('.').collect();
                !wanted.is_empty()
                    && segments
                        .windows(wanted.len())
                        .any(|window| window.iter().zip(wanted).all(|(a, b)| *a == b))
            }
        }
    }
}

/// Resolve target fragments to node ids.
///
/// `Handler.execute` matches `worker.Handler.execute`; fragments containing
/// `*`, `?` or `[` are globs over the full qualified name. Fails when no
/// fragment matches anything.
pub fn select_targets(
    graph: &CallGraph,
    fragments: &[String],
) -> Result<Vec<NodeId>, EngineError> {
    let mut selected = BTreeSet::new();
    for fragment in fragments {
        let pattern = TargetPattern::parse(fragment)?;
        let before = selected.len();
        selected.extend(graph.nodes().filter(|d| pattern.matches(d)).map(|d| d.id));
        if selected.len() == before {
            warn!(fragment = %fragment, "target matches no definition");
        }
    }

    if selected.is_empty() {
        return Err(EngineError::EmptyTarget {
            requested: fragments.join(", "),
        });
    }
    Ok(selected.into_iter().collect())
}

/// Induced subgraph of `targets` plus every node reachable from them in
/// `direction`, within `max_depth` hops.
pub fn subset(
    graph: &CallGraph,
    targets: &[NodeId],
    direction: Direction,
    max_depth: Option<usize>,
) -> Result<CallGraph, EngineError> {
    if !targets.iter().any(|id| graph.contains(*id)) {
        return Err(EngineError::EmptyTarget {
            requested: targets
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let keep: BTreeSet<NodeId> = graph
        .reachable(targets, direction, max_depth)
        .into_keys()
        .collect();
    debug!(
        targets = targets.len(),
        kept = keep.len(),
        direction = %direction,
        "filtered call graph"
    );
    Ok(graph.induced(&keep))
}

/// [`select_targets`] followed by [`subset`].
pub fn filter_graph(
    graph: &CallGraph,
    fragments: &[String],
    direction: Direction,
    max_depth: Option<usize>,
) -> Result<CallGraph, EngineError> {
    let targets = select_targets(graph, fragments)?;
    subset(graph, &targets, direction, max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::tests::{make_definition, make_graph};

    fn ids(graph: &CallGraph) -> Vec<u32> {
        graph.nodes().map(|d| d.id.0).collect()
    }

    fn edges(graph: &CallGraph) -> Vec<(u32, u32)> {
        graph.edges().map(|e| (e.source.0, e.target.0)).collect()
    }

    fn chain() -> CallGraph {
        // a -> b -> c -> d
        make_graph(&[(0, 1), (1, 2), (2, 3)])
    }

    #[test]
    fn test_downstream_from_middle_of_chain() {
        let sub = subset(&chain(), &[NodeId(1)], Direction::Downstream, None).unwrap();
        assert_eq!(ids(&sub), vec![1, 2, 3]);
        assert_eq!(edges(&sub), vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn test_upstream_from_middle_of_chain() {
        let sub = subset(&chain(), &[NodeId(1)], Direction::Upstream, None).unwrap();
        assert_eq!(ids(&sub), vec![0, 1]);
        assert_eq!(edges(&sub), vec![(0, 1)]);
    }

    #[test]
    fn test_both_directions_and_depth_limit() {
        let sub = subset(&chain(), &[NodeId(1)], Direction::Both, None).unwrap();
        assert_eq!(ids(&sub), vec![0, 1, 2, 3]);

        let sub = subset(&chain(), &[NodeId(1)], Direction::Downstream, Some(1)).unwrap();
        assert_eq!(ids(&sub), vec![1, 2]);
        assert_eq!(edges(&sub), vec![(1, 2)]);
    }

    #[test]
    fn test_induced_subgraph_keeps_edges_between_kept_nodes() {
        // b reaches a through d, so the a -> b edge survives
        let graph = make_graph(&[(0, 1), (3, 0), (1, 3)]);
        let sub = subset(&graph, &[NodeId(1)], Direction::Downstream, None).unwrap();
        assert_eq!(ids(&sub), vec![0, 1, 3]);
        assert_eq!(edges(&sub), vec![(0, 1), (1, 3), (3, 0)]);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let graph = make_graph(&[(0, 1), (1, 0)]);
        let sub = subset(&graph, &[NodeId(0)], Direction::Both, None).unwrap();
        assert_eq!(edges(&sub), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_missing_targets_are_an_error() {
        let err = subset(&chain(), &[NodeId(42)], Direction::Both, None).unwrap_err();
        assert!(matches!(err, EngineError::EmptyTarget { .. }));
    }

    #[test]
    fn test_select_by_segment_fragment() {
        let mut graph = chain();
        let mut handler = make_definition(4, "execute");
        handler.qualified_name = "worker.Handler.execute".to_string();
        graph.add_node(handler);

        let ids = |fragment: &str| select_targets(&graph, &[fragment.to_string()]);
        assert_eq!(ids("Handler.execute").unwrap(), vec![NodeId(4)]);
        assert_eq!(ids("worker.Handler.execute").unwrap(), vec![NodeId(4)]);
        assert_eq!(ids("b").unwrap(), vec![NodeId(1)]);
        // Segments must match whole names
        assert!(ids("Hand").is_err());
        assert!(ids("Handler.b").is_err());
    }

    #[test]
    fn test_select_by_glob() {
        let graph = chain();
        let selected = select_targets(&graph, &["main.[bc]".to_string()]).unwrap();
        assert_eq!(selected, vec![NodeId(1), NodeId(2)]);

        let all = select_targets(&graph, &["main.*".to_string()]).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_unmatched_fragment_reports_request() {
        let err = select_targets(&chain(), &["nothing".to_string(), "else".to_string()])
            .unwrap_err();
        match err {
            EngineError::EmptyTarget { requested } => assert_eq!(requested, "nothing, else"),
            other => panic!("expected empty target, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_graph_end_to_end() {
        let sub = filter_graph(&chain(), &["main.b".to_string()], Direction::Upstream, None)
            .unwrap();
        assert_eq!(ids(&sub), vec![0, 1]);
    }
}
