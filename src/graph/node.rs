//! Dependency graph (C6): a DAG of network and CPU nodes, stored in an
//! arena and referenced by stable index rather than through ownership
//! cycles (§9 "cyclic references").

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{LanternError, Phase};
use crate::model::{NetworkRequest, TraceEvent};

pub type NodeIndex = usize;

/// Node-type-specific payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Network(NetworkNodeData),
    Cpu(CpuNodeData),
}

#[derive(Debug, Clone)]
pub struct NetworkNodeData {
    pub request: NetworkRequest,
    pub is_main_document: bool,
}

#[derive(Debug, Clone)]
pub struct CpuNodeData {
    pub event: TraceEvent,
    pub child_events: Vec<TraceEvent>,
}

impl CpuNodeData {
    /// `did_perform_layout` — any child named "Layout" (§3).
    pub fn did_perform_layout(&self) -> bool {
        self.child_events.iter().any(|e| e.name == "Layout")
    }

    /// `is_evaluate_script_for` — any EvaluateScript child whose URL is in
    /// `urls` (§3).
    pub fn is_evaluate_script_for(&self, urls: &HashSet<&str>) -> bool {
        self.child_events
            .iter()
            .any(|e| e.name == "EvaluateScript" && e.url().map(|u| urls.contains(u)).unwrap_or(false))
    }

    /// Total duration of the enclosing task, in microseconds.
    pub fn duration_us(&self) -> u64 {
        self.event.duration_us()
    }
}

/// One node in the dependency graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub dependencies: Vec<NodeIndex>,
    pub dependents: Vec<NodeIndex>,
}

impl Node {
    pub fn is_network(&self) -> bool {
        matches!(self.kind, NodeKind::Network(_))
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, NodeKind::Cpu(_))
    }

    pub fn as_network(&self) -> Option<&NetworkNodeData> {
        match &self.kind {
            NodeKind::Network(data) => Some(data),
            NodeKind::Cpu(_) => None,
        }
    }

    pub fn as_network_mut(&mut self) -> Option<&mut NetworkNodeData> {
        match &mut self.kind {
            NodeKind::Network(data) => Some(data),
            NodeKind::Cpu(_) => None,
        }
    }

    pub fn as_cpu(&self) -> Option<&CpuNodeData> {
        match &self.kind {
            NodeKind::Cpu(data) => Some(data),
            NodeKind::Network(_) => None,
        }
    }

    /// Start/end time in microseconds, relative to navigation start.
    pub fn start_time_us(&self) -> u64 {
        match &self.kind {
            NodeKind::Network(data) => (data.request.start_time * 1_000_000.0).round() as u64,
            NodeKind::Cpu(data) => data.event.ts,
        }
    }

    pub fn end_time_us(&self) -> u64 {
        match &self.kind {
            NodeKind::Network(data) => (data.request.end_time * 1_000_000.0).round() as u64,
            NodeKind::Cpu(data) => data.event.end_ts(),
        }
    }
}

/// A DAG of network and CPU nodes (§4.5).
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    index_by_id: HashMap<String, NodeIndex>,
    root: NodeIndex,
    main_document: Option<NodeIndex>,
}

impl Graph {
    pub(crate) fn from_parts(nodes: Vec<Node>, root: NodeIndex) -> Self {
        let index_by_id = nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect();
        let main_document = nodes.iter().position(|n| n.as_network().map(|d| d.is_main_document).unwrap_or(false));
        Self { nodes, index_by_id, root, main_document }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn main_document(&self) -> Option<NodeIndex> {
        self.main_document
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index_by_id.get(id).copied()
    }

    /// Appends a node after construction (used by the builder when adding
    /// CPU nodes once the network nodes are already indexed).
    pub(crate) fn raw_push(&mut self, node: Node) -> NodeIndex {
        let idx = self.nodes.len();
        self.index_by_id.insert(node.id.clone(), idx);
        self.nodes.push(node);
        idx
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter().enumerate()
    }

    /// Idempotent: `dependent` depends on `dependency`; also adds the dual
    /// back-edge (§4.5).
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        if dependent == dependency {
            return;
        }
        if !self.nodes[dependent].dependencies.contains(&dependency) {
            self.nodes[dependent].dependencies.push(dependency);
        }
        if !self.nodes[dependency].dependents.contains(&dependent) {
            self.nodes[dependency].dependents.push(dependent);
        }
    }

    /// BFS from `start` along `get_next`-selected edges (default: forward,
    /// via dependents), calling `visit` once per reached node.
    pub fn traverse(&self, start: NodeIndex, get_next: impl Fn(&Node) -> &[NodeIndex], mut visit: impl FnMut(NodeIndex)) {
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        queue.push_back(start);
        seen.insert(start);
        while let Some(idx) = queue.pop_front() {
            visit(idx);
            for &next in get_next(&self.nodes[idx]) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    /// Forward traversal (root -> dependents), the default per §4.5.
    pub fn traverse_forward(&self, start: NodeIndex, visit: impl FnMut(NodeIndex)) {
        self.traverse(start, |n| &n.dependents, visit);
    }

    /// Backward traversal (node -> dependencies), used to collect ancestors.
    pub fn traverse_backward(&self, start: NodeIndex, visit: impl FnMut(NodeIndex)) {
        self.traverse(start, |n| &n.dependencies, visit);
    }

    /// All node indices reachable from root.
    pub fn reachable_from_root(&self) -> HashSet<NodeIndex> {
        let mut set = HashSet::new();
        self.traverse_forward(self.root, |idx| {
            set.insert(idx);
        });
        set
    }

    /// Cycle detection: DFS with a current-path stack and a depth map; on
    /// revisiting a node already on the path, it is a cycle (§4.5).
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Visiting,
            Done,
        }
        let mut state: HashMap<NodeIndex, State> = HashMap::new();
        let mut path: Vec<NodeIndex> = Vec::new();

        fn visit(
            graph: &Graph,
            idx: NodeIndex,
            state: &mut HashMap<NodeIndex, State>,
            path: &mut Vec<NodeIndex>,
        ) -> bool {
            match state.get(&idx) {
                Some(State::Done) => return false,
                Some(State::Visiting) => return true,
                None => {}
            }
            state.insert(idx, State::Visiting);
            path.push(idx);
            for &next in &graph.nodes[idx].dependents {
                if visit(graph, next, state, path) {
                    return true;
                }
            }
            path.pop();
            state.insert(idx, State::Done);
            false
        }

        for idx in 0..self.nodes.len() {
            if !state.contains_key(&idx) && visit(self, idx, &mut state, &mut path) {
                return true;
            }
        }
        false
    }

    pub fn assert_acyclic(&self, phase: Phase) -> Result<(), LanternError> {
        if self.has_cycle() {
            Err(LanternError::GraphCycleDetected { phase })
        } else {
            Ok(())
        }
    }

    /// Clones the subgraph induced by `predicate`: every node for which the
    /// predicate holds, plus all of their ancestors (§4.5). Returns `None`
    /// if the root itself is excluded (i.e. nothing matched).
    pub fn clone_with_relationships(&self, predicate: impl Fn(&Node) -> bool) -> Option<Graph> {
        let mut included: HashSet<NodeIndex> = HashSet::new();
        for (idx, node) in self.iter() {
            if predicate(node) {
                self.traverse_backward(idx, |ancestor| {
                    included.insert(ancestor);
                });
            }
        }

        if !included.contains(&self.root) {
            return None;
        }

        let mut old_to_new: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut new_nodes: Vec<Node> = Vec::with_capacity(included.len());
        let mut ordered: Vec<NodeIndex> = included.iter().copied().collect();
        ordered.sort_unstable();
        for &old_idx in &ordered {
            let old = &self.nodes[old_idx];
            old_to_new.insert(old_idx, new_nodes.len());
            new_nodes.push(Node {
                id: old.id.clone(),
                kind: old.kind.clone(),
                dependencies: Vec::new(),
                dependents: Vec::new(),
            });
        }
        for &old_idx in &ordered {
            let new_idx = old_to_new[&old_idx];
            for &dep in &self.nodes[old_idx].dependencies {
                if let Some(&new_dep) = old_to_new.get(&dep) {
                    new_nodes[new_idx].dependencies.push(new_dep);
                }
            }
            for &dependent in &self.nodes[old_idx].dependents {
                if let Some(&new_dependent) = old_to_new.get(&dependent) {
                    new_nodes[new_idx].dependents.push(new_dependent);
                }
            }
        }

        let new_root = old_to_new[&self.root];
        Some(Graph::from_parts(new_nodes, new_root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NetworkRequestBuilder, Priority, ResourceType};

    fn network_node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::Network(NetworkNodeData {
                request: NetworkRequestBuilder::new(id, format!("https://a.com/{id}"))
                    .resource_type(ResourceType::Script)
                    .priority(Priority::Medium)
                    .build(),
                is_main_document: false,
            }),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    #[test]
    fn add_dependency_is_idempotent_and_dual() {
        let mut graph = Graph::from_parts(vec![network_node("a"), network_node("b")], 0);
        graph.add_dependency(1, 0);
        graph.add_dependency(1, 0);
        assert_eq!(graph.node(1).dependencies, vec![0]);
        assert_eq!(graph.node(0).dependents, vec![1]);
    }

    #[test]
    fn detects_a_two_node_cycle() {
        let mut graph = Graph::from_parts(vec![network_node("a"), network_node("b")], 0);
        graph.add_dependency(1, 0);
        graph.add_dependency(0, 1);
        assert!(graph.has_cycle());
    }

    #[test]
    fn acyclic_chain_has_no_cycle() {
        let mut graph = Graph::from_parts(vec![network_node("a"), network_node("b"), network_node("c")], 0);
        graph.add_dependency(1, 0);
        graph.add_dependency(2, 1);
        assert!(!graph.has_cycle());
    }

    #[test]
    fn clone_with_true_predicate_is_isomorphic() {
        let mut graph = Graph::from_parts(vec![network_node("a"), network_node("b"), network_node("c")], 0);
        graph.add_dependency(1, 0);
        graph.add_dependency(2, 1);
        let clone = graph.clone_with_relationships(|_| true).unwrap();
        assert_eq!(clone.len(), graph.len());
        assert_eq!(clone.node(clone.root()).id, "a");
    }

    #[test]
    fn clone_excludes_unreachable_descendants() {
        let mut graph = Graph::from_parts(vec![network_node("a"), network_node("b"), network_node("c")], 0);
        graph.add_dependency(1, 0);
        graph.add_dependency(2, 0);
        // only "b" matches; its ancestors are {b, a}. "c" is excluded.
        let clone = graph.clone_with_relationships(|n| n.id == "b").unwrap();
        assert_eq!(clone.len(), 2);
        assert!(clone.index_of("c").is_none());
    }

    #[test]
    fn clone_returns_none_when_root_excluded() {
        let graph = Graph::from_parts(vec![network_node("a")], 0);
        assert!(graph.clone_with_relationships(|_| false).is_none());
    }
}
