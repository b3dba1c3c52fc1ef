use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::{Definition, NodeId};

/// Direction of a reachability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Callers of the start nodes, transitively.
    Upstream,
    /// Callees of the start nodes, transitively.
    Downstream,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
            Direction::Both => "both",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upstream" | "up" | "callers" => Ok(Direction::Upstream),
            "downstream" | "down" | "callees" => Ok(Direction::Downstream),
            "both" => Ok(Direction::Both),
            _ => Err(format!(
                "unknown direction: {} (expected upstream, downstream or both)",
                s
            )),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A merged caller -> callee relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub count: u32,
    /// Derived through an intermediate function rather than called directly.
    pub possible: bool,
}

/// Directed "task calls task" graph.
///
/// Outgoing and incoming adjacency are kept symmetric: every call recorded
/// in `outgoing[a][b]` has the same count in `incoming[b][a]`.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: BTreeMap<NodeId, Definition>,
    outgoing: BTreeMap<NodeId, BTreeMap<NodeId, u32>>,
    incoming: BTreeMap<NodeId, BTreeMap<NodeId, u32>>,
    possible: BTreeSet<(NodeId, NodeId)>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, definition: Definition) {
        self.nodes.insert(definition.id, definition);
    }

    /// Record one call from `caller` to `callee`, merging with an existing
    /// edge. Returns false (and records nothing) if either node is unknown.
    pub fn add_call(&mut self, caller: NodeId, callee: NodeId) -> bool {
        self.add_calls(caller, callee, 1)
    }

    fn add_calls(&mut self, caller: NodeId, callee: NodeId, count: u32) -> bool {
        if !self.nodes.contains_key(&caller) || !self.nodes.contains_key(&callee) {
            return false;
        }
        *self
            .outgoing
            .entry(caller)
            .or_default()
            .entry(callee)
            .or_insert(0) += count;
        *self
            .incoming
            .entry(callee)
            .or_default()
            .entry(caller)
            .or_insert(0) += count;
        true
    }

    /// Record a derived `source -> target` edge. Does nothing if the nodes
    /// are unknown or a direct edge already exists.
    pub fn add_possible_call(&mut self, source: NodeId, target: NodeId) -> bool {
        if self.edge(source, target).is_some() || !self.add_calls(source, target, 1) {
            return false;
        }
        self.possible.insert((source, target));
        true
    }

    pub fn node(&self, id: NodeId) -> Option<&Definition> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Definition> {
        self.nodes.values()
    }

    /// Edges ordered by (caller id, callee id).
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.outgoing.iter().flat_map(move |(source, targets)| {
            targets.iter().map(move |(target, count)| Edge {
                source: *source,
                target: *target,
                count: *count,
                possible: self.possible.contains(&(*source, *target)),
            })
        })
    }

    pub fn edge(&self, source: NodeId, target: NodeId) -> Option<Edge> {
        self.outgoing
            .get(&source)
            .and_then(|targets| targets.get(&target))
            .map(|count| Edge {
                source,
                target,
                count: *count,
                possible: self.possible.contains(&(source, target)),
            })
    }

    /// Direct callers of `id`.
    pub fn callers(&self, id: NodeId) -> Vec<NodeId> {
        self.incoming
            .get(&id)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Direct callees of `id`.
    pub fn callees(&self, id: NodeId) -> Vec<NodeId> {
        self.outgoing
            .get(&id)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    fn neighbours(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        match direction {
            Direction::Downstream => self.callees(id),
            Direction::Upstream => self.callers(id),
            Direction::Both => {
                let mut all = self.callees(id);
                all.extend(self.callers(id));
                all
            }
        }
    }

    /// Breadth-first reachability from `starts`, returning each reached node
    /// with its hop distance. Starts that are not in the graph are ignored;
    /// starts that are present are included at depth 0.
    ///
    /// `Direction::Both` follows callers and callees independently from each
    /// start, so it yields the union of the upstream and downstream closures
    /// rather than the whole weakly connected component.
    pub fn reachable(
        &self,
        starts: &[NodeId],
        direction: Direction,
        max_depth: Option<usize>,
    ) -> BTreeMap<NodeId, usize> {
        match direction {
            Direction::Both => {
                let mut reached = self.reachable(starts, Direction::Upstream, max_depth);
                for (id, depth) in self.reachable(starts, Direction::Downstream, max_depth) {
                    let entry = reached.entry(id).or_insert(depth);
                    *entry = (*entry).min(depth);
                }
                reached
            }
            _ => self.bfs(starts, direction, max_depth.unwrap_or(usize::MAX)),
        }
    }

    fn bfs(&self, starts: &[NodeId], direction: Direction, max_depth: usize) -> BTreeMap<NodeId, usize> {
        let mut visited = BTreeMap::new();
        let mut queue = VecDeque::new();
        for start in starts {
            if self.contains(*start) && !visited.contains_key(start) {
                visited.insert(*start, 0);
                queue.push_back((*start, 0));
            }
        }

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for next in self.neighbours(current, direction) {
                if !visited.contains_key(&next) {
                    visited.insert(next, depth + 1);
                    queue.push_back((next, depth + 1));
                }
            }
        }

        visited
    }

    /// Transitive callees of `start`, excluding `start` itself.
    pub fn descendants(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut reached: BTreeSet<NodeId> = self
            .reachable(&[start], Direction::Downstream, None)
            .into_keys()
            .collect();
        reached.remove(&start);
        reached
    }

    /// Transitive callers of `start`, excluding `start` itself.
    pub fn ancestors(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut reached: BTreeSet<NodeId> = self
            .reachable(&[start], Direction::Upstream, None)
            .into_keys()
            .collect();
        reached.remove(&start);
        reached
    }

    /// Whether `to` can be reached from `from` by following calls.
    /// A node always reaches itself.
    pub fn has_path(&self, from: NodeId, to: NodeId) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        if from == to {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        visited.insert(from);
        while let Some(current) = queue.pop_front() {
            for next in self.callees(current) {
                if next == to {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Subgraph with only the `keep` nodes and every edge between them.
    pub fn induced(&self, keep: &BTreeSet<NodeId>) -> CallGraph {
        let mut sub = CallGraph::new();
        for id in keep {
            if let Some(definition) = self.nodes.get(id) {
                sub.add_node(definition.clone());
            }
        }
        for edge in self.edges() {
            if keep.contains(&edge.source) && keep.contains(&edge.target) {
                sub.add_calls(edge.source, edge.target, edge.count);
                if edge.possible {
                    sub.possible.insert((edge.source, edge.target));
                }
            }
        }
        sub
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|targets| targets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;

    pub(crate) fn make_definition(id: u32, name: &str) -> Definition {
        Definition {
            id: NodeId(id),
            name: name.to_string(),
            qualified_name: format!("main.{}", name),
            file: PathBuf::from("main.py"),
            file_index: FileIndex(0),
            scope: ScopeId(0),
            body: ScopeId(id as usize + 1),
            line_span: LineSpan {
                start: Position {
                    line: id as usize + 1,
                    column: 0,
                },
                end: Position {
                    line: id as usize + 2,
                    column: 0,
                },
            },
            language: Language::Python,
            is_constructor: false,
            is_module: false,
            is_task: false,
        }
    }

    /// Graph with nodes a..=d (ids 0..=3) and the given (caller, callee) calls.
    pub(crate) fn make_graph(calls: &[(u32, u32)]) -> CallGraph {
        let mut graph = CallGraph::new();
        for (id, name) in ["a", "b", "c", "d"].iter().enumerate() {
            graph.add_node(make_definition(id as u32, name));
        }
        for (from, to) in calls {
            assert!(graph.add_call(NodeId(*from), NodeId(*to)));
        }
        graph
    }

    #[test]
    fn test_add_call_merges_duplicates() {
        let mut graph = make_graph(&[(0, 1)]);
        graph.add_call(NodeId(0), NodeId(1));
        graph.add_call(NodeId(0), NodeId(1));

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge(NodeId(0), NodeId(1)).unwrap().count, 3);
        assert_eq!(graph.callers(NodeId(1)), vec![NodeId(0)]);
        assert_eq!(graph.callees(NodeId(0)), vec![NodeId(1)]);
    }

    #[test]
    fn test_add_call_rejects_unknown_nodes() {
        let mut graph = make_graph(&[]);
        assert!(!graph.add_call(NodeId(0), NodeId(42)));
        assert!(!graph.add_call(NodeId(42), NodeId(0)));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.callers(NodeId(0)).is_empty());
    }

    #[test]
    fn test_edges_are_ordered_by_caller_then_callee() {
        let graph = make_graph(&[(2, 0), (0, 3), (0, 1), (1, 2)]);
        let pairs: Vec<(u32, u32)> = graph.edges().map(|e| (e.source.0, e.target.0)).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 3), (1, 2), (2, 0)]);
    }

    #[test]
    fn test_incoming_and_outgoing_stay_symmetric() {
        let graph = make_graph(&[(0, 1), (0, 2), (1, 2), (2, 2)]);
        for edge in graph.edges() {
            assert!(graph.callers(edge.target).contains(&edge.source));
            assert!(graph.callees(edge.source).contains(&edge.target));
        }
        let incoming_total: usize = graph.nodes().map(|n| graph.callers(n.id).len()).sum();
        assert_eq!(incoming_total, graph.edge_count());
    }

    #[test]
    fn test_descendants_and_ancestors() {
        // a -> b -> c, d isolated
        let graph = make_graph(&[(0, 1), (1, 2)]);

        let down = graph.descendants(NodeId(0));
        assert_eq!(down, BTreeSet::from([NodeId(1), NodeId(2)]));

        let up = graph.ancestors(NodeId(2));
        assert_eq!(up, BTreeSet::from([NodeId(0), NodeId(1)]));

        assert!(graph.descendants(NodeId(3)).is_empty());
        assert!(graph.ancestors(NodeId(3)).is_empty());
    }

    #[test]
    fn test_self_loop_is_preserved_and_traversal_terminates() {
        let graph = make_graph(&[(0, 0)]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge(NodeId(0), NodeId(0)).unwrap().count, 1);
        assert!(graph.descendants(NodeId(0)).is_empty());
        assert!(graph.ancestors(NodeId(0)).is_empty());
        assert!(graph.has_path(NodeId(0), NodeId(0)));
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let graph = make_graph(&[(0, 1), (1, 0)]);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.descendants(NodeId(0)), BTreeSet::from([NodeId(1)]));
        assert_eq!(graph.ancestors(NodeId(0)), BTreeSet::from([NodeId(1)]));
        let reached = graph.reachable(&[NodeId(0)], Direction::Both, None);
        assert_eq!(reached.len(), 2);
    }

    #[test]
    fn test_reachable_respects_max_depth() {
        // a -> b -> c -> d
        let graph = make_graph(&[(0, 1), (1, 2), (2, 3)]);
        let reached = graph.reachable(&[NodeId(0)], Direction::Downstream, Some(2));
        assert_eq!(
            reached,
            BTreeMap::from([(NodeId(0), 0), (NodeId(1), 1), (NodeId(2), 2)])
        );

        let none = graph.reachable(&[NodeId(0)], Direction::Downstream, Some(0));
        assert_eq!(none.len(), 1);
    }

    #[test]
    fn test_reachable_both_is_union_not_component() {
        // a -> b <- c, b -> d: from b, both reaches everything;
        // from a, both must not pick up c through b's callers.
        let graph = make_graph(&[(0, 1), (2, 1), (1, 3)]);
        let from_a: BTreeSet<NodeId> = graph
            .reachable(&[NodeId(0)], Direction::Both, None)
            .into_keys()
            .collect();
        assert_eq!(from_a, BTreeSet::from([NodeId(0), NodeId(1), NodeId(3)]));
    }

    #[test]
    fn test_has_path() {
        let graph = make_graph(&[(0, 1), (1, 2)]);
        assert!(graph.has_path(NodeId(0), NodeId(2)));
        assert!(!graph.has_path(NodeId(2), NodeId(0)));
        assert!(!graph.has_path(NodeId(0), NodeId(3)));
        assert!(!graph.has_path(NodeId(0), NodeId(99)));
    }

    #[test]
    fn test_induced_subgraph_keeps_internal_edges_only() {
        let graph = make_graph(&[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let keep = BTreeSet::from([NodeId(1), NodeId(2)]);
        let sub = graph.induced(&keep);

        assert_eq!(sub.node_count(), 2);
        let pairs: Vec<(u32, u32)> = sub.edges().map(|e| (e.source.0, e.target.0)).collect();
        assert_eq!(pairs, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_possible_call_never_replaces_direct_edge() {
        let mut graph = make_graph(&[(0, 1)]);
        assert!(!graph.add_possible_call(NodeId(0), NodeId(1)));
        assert!(graph.add_possible_call(NodeId(0), NodeId(2)));
        assert!(!graph.add_possible_call(NodeId(0), NodeId(2)));
        assert!(!graph.add_possible_call(NodeId(0), NodeId(42)));

        let edges: Vec<(u32, u32, bool)> = graph
            .edges()
            .map(|e| (e.source.0, e.target.0, e.possible))
            .collect();
        assert_eq!(edges, vec![(0, 1, false), (0, 2, true)]);

        let keep = BTreeSet::from([NodeId(0), NodeId(2)]);
        let sub = graph.induced(&keep);
        assert!(sub.edge(NodeId(0), NodeId(2)).unwrap().possible);
    }

    #[test]
    fn test_empty_graph_queries() {
        let graph = CallGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.callers(NodeId(0)).is_empty());
        assert!(graph.descendants(NodeId(0)).is_empty());
        assert!(graph.reachable(&[NodeId(0)], Direction::Both, None).is_empty());
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("upstream".parse::<Direction>(), Ok(Direction::Upstream));
        assert_eq!("down".parse::<Direction>(), Ok(Direction::Downstream));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
