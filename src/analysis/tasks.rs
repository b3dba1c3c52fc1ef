use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::model::graph::CallGraph;
use crate::model::NodeId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub tasks: usize,
    /// Task calling task.
    pub direct: usize,
    /// Task calling task through one helper.
    pub possible: usize,
}

/// Reduce `graph` to its task nodes.
///
/// Direct task -> task edges are kept with their counts. For every
/// task -> helper -> task path whose helper is not a task, a possible edge
/// is added unless a direct one already exists.
pub fn task_view(graph: &CallGraph) -> (CallGraph, TaskSummary) {
    let tasks: BTreeSet<NodeId> = graph
        .nodes()
        .filter(|d| d.is_task)
        .map(|d| d.id)
        .collect();
    let mut view = graph.induced(&tasks);
    let direct = view.edge_count();

    for &task in &tasks {
        for helper in graph.callees(task) {
            if tasks.contains(&helper) {
                continue;
            }
            for target in graph.callees(helper) {
                if tasks.contains(&target) && view.add_possible_call(task, target) {
                    debug!(caller = %task, helper = %helper, callee = %target, "possible task call");
                }
            }
        }
    }

    let summary = TaskSummary {
        tasks: tasks.len(),
        direct,
        possible: view.edge_count() - direct,
    };
    (view, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::tests::make_definition;

    /// Nodes 0..names.len(); the ones in `tasks` are flagged.
    fn graph_with(names: &[&str], tasks: &[u32], calls: &[(u32, u32)]) -> CallGraph {
        let mut graph = CallGraph::new();
        for (id, name) in names.iter().enumerate() {
            let mut definition = make_definition(id as u32, name);
            definition.is_task = tasks.contains(&(id as u32));
            graph.add_node(definition);
        }
        for (from, to) in calls {
            graph.add_call(NodeId(*from), NodeId(*to));
        }
        graph
    }

    fn edges(graph: &CallGraph) -> Vec<(u32, u32, u32, bool)> {
        graph
            .edges()
            .map(|e| (e.source.0, e.target.0, e.count, e.possible))
            .collect()
    }

    #[test]
    fn test_direct_and_possible_task_calls() {
        // allocate -> release (direct, twice), allocate -> reserve -> write
        let graph = graph_with(
            &["allocate", "release", "reserve", "write", "log"],
            &[0, 1, 3],
            &[(0, 1), (0, 1), (0, 2), (2, 3), (1, 4)],
        );
        let (view, summary) = task_view(&graph);

        let names: Vec<&str> = view.nodes().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["allocate", "release", "write"]);
        assert_eq!(edges(&view), vec![(0, 1, 2, false), (0, 3, 1, true)]);
        assert_eq!(
            summary,
            TaskSummary {
                tasks: 3,
                direct: 1,
                possible: 1,
            }
        );
    }

    #[test]
    fn test_direct_edge_wins_over_possible() {
        // a -> b directly and via helper c
        let graph = graph_with(&["a", "b", "c"], &[0, 1], &[(0, 1), (0, 2), (2, 1)]);
        let (view, summary) = task_view(&graph);
        assert_eq!(edges(&view), vec![(0, 1, 1, false)]);
        assert_eq!(summary.possible, 0);
    }

    #[test]
    fn test_only_one_helper_hop() {
        // a -> h1 -> h2 -> b is too far
        let graph = graph_with(&["a", "h1", "h2", "b"], &[0, 3], &[(0, 1), (1, 2), (2, 3)]);
        let (view, _) = task_view(&graph);
        assert_eq!(view.node_count(), 2);
        assert_eq!(view.edge_count(), 0);
    }

    #[test]
    fn test_no_tasks_gives_empty_view() {
        let graph = graph_with(&["a", "b"], &[], &[(0, 1)]);
        let (view, summary) = task_view(&graph);
        assert!(view.is_empty());
        assert_eq!(summary, TaskSummary::default());
    }
}
