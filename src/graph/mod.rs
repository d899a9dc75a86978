//! Arena graph over a rule's nodes and edges.
//!
//! [`RuleGraph`] is built on demand from an [`AutomationRule`] using a petgraph
//! `DiGraph`. Node indices follow declaration order, which is what makes the
//! topological order deterministic. The rule value itself never holds
//! back-references; graph mutations live in [`ops`].

mod ops;

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
    visit::{Bfs, EdgeRef},
};

use crate::{
    Result, RuleflowError,
    model::{AutomationRule, RuleEdge, RuleNode},
};

pub use ops::{add_edge, add_node, remove_edge, remove_node};

#[derive(Debug, Clone)]
pub struct RuleGraph {
    graph: DiGraph<RuleNode, RuleEdge>,
    index: HashMap<String, NodeIndex>,
}

impl RuleGraph {
    /// Build the graph, keeping the first of any duplicated node ids and
    /// ignoring edges whose endpoints are unknown.
    pub fn lossy(rule: &AutomationRule) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in rule.nodes.iter() {
            if index.contains_key(&node.id) {
                continue;
            }
            let idx = graph.add_node(node.clone());
            index.insert(node.id.clone(), idx);
        }

        for edge in rule.edges.iter() {
            if let (Some(src), Some(dst)) = (index.get(&edge.source_node_id), index.get(&edge.target_node_id)) {
                graph.add_edge(*src, *dst, edge.clone());
            }
        }

        Self {
            graph,
            index,
        }
    }

    pub fn node(
        &self,
        id: &str,
    ) -> Option<&RuleNode> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn incoming(
        &self,
        id: &str,
    ) -> Vec<&RuleEdge> {
        self.edges_directed(id, Direction::Incoming)
    }

    pub fn outgoing(
        &self,
        id: &str,
    ) -> Vec<&RuleEdge> {
        self.edges_directed(id, Direction::Outgoing)
    }

    /// Every node reachable from `id`, excluding `id` itself.
    pub fn downstream(
        &self,
        id: &str,
    ) -> Vec<&RuleNode> {
        let Some(start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut nodes = Vec::new();
        let mut bfs = Bfs::new(&self.graph, *start);
        while let Some(idx) = bfs.next(&self.graph) {
            if idx != *start {
                nodes.push(&self.graph[idx]);
            }
        }
        nodes
    }

    /// Kahn's algorithm; among ready nodes the one declared first wins.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: Vec<usize> = self.graph.node_indices().map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count()).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree.iter().enumerate().filter(|(_, d)| **d == 0).map(|(i, _)| Reverse(i)).collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(Reverse(i)) = ready.pop() {
            let idx = NodeIndex::new(i);
            order.push(self.graph[idx].id.clone());

            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target().index();
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.push(Reverse(target));
                }
            }
        }

        if order.len() < self.graph.node_count() {
            return Err(RuleflowError::CycleDetected(self.cycle_nodes()));
        }

        Ok(order)
    }

    /// Nodes sitting on a cycle, in declaration order.
    fn cycle_nodes(&self) -> Vec<String> {
        let mut on_cycle: Vec<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || scc.first().is_some_and(|idx| self.graph.contains_edge(*idx, *idx)))
            .flatten()
            .collect();
        on_cycle.sort();
        on_cycle.into_iter().map(|idx| self.graph[idx].id.clone()).collect()
    }

    fn edges_directed(
        &self,
        id: &str,
        dir: Direction,
    ) -> Vec<&RuleEdge> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_directed(*idx, dir).map(|e| (e.id(), e.weight())).collect();
        // petgraph walks adjacency lists newest first
        edges.sort_by_key(|(eid, _)| *eid);
        edges.into_iter().map(|(_, e)| e).collect()
    }
}

impl TryFrom<&AutomationRule> for RuleGraph {
    type Error = RuleflowError;

    fn try_from(rule: &AutomationRule) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in rule.nodes.iter() {
            if index.contains_key(&node.id) {
                return Err(RuleflowError::DuplicateNode(node.id.clone()));
            }
            let idx = graph.add_node(node.clone());
            index.insert(node.id.clone(), idx);
        }

        for edge in rule.edges.iter() {
            let endpoint = |nid: &String| {
                index.get(nid).copied().ok_or_else(|| RuleflowError::EdgeEndpointInvalid {
                    edge_id: edge.id.clone(),
                    node_id: nid.clone(),
                })
            };
            let src = endpoint(&edge.source_node_id)?;
            let dst = endpoint(&edge.target_node_id)?;
            graph.add_edge(src, dst, edge.clone());
        }

        Ok(Self {
            graph,
            index,
        })
    }
}

/// Deterministic evaluation order of the rule's nodes.
///
/// Fails with [`RuleflowError::CycleDetected`] naming the nodes on cycles, or
/// with the structural error that prevented building the graph.
pub fn topological_order(rule: &AutomationRule) -> Result<Vec<String>> {
    RuleGraph::try_from(rule)?.topological_order()
}
