use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use crate::models::{EdgeRecord, TrustEdge, TrustNode};

/// Directed multigraph of the ratings inside one time window.
///
/// Nodes and edges are stored in first-seen / insertion order, and every
/// traversal the scorer performs follows that order.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGraph {
    pub(crate) graph: DiGraph<TrustNode, TrustEdge>,
    index: HashMap<String, NodeIndex>,
}

/// A borrowed view of one edge with its endpoints resolved.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub edge: &'a TrustEdge,
}

impl SnapshotGraph {
    pub fn build(records: &[EdgeRecord]) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            let source = snapshot.ensure_node(&record.source);
            let target = snapshot.ensure_node(&record.target);
            snapshot.graph.add_edge(source, target, TrustEdge::from(record));
        }
        debug!(
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            "built snapshot graph"
        );
        snapshot
    }

    pub(crate) fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(TrustNode::new(id));
        self.index.insert(id.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: &str) -> Option<&TrustNode> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TrustNode> + '_ {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.graph.edge_references().map(|edge| self.view(edge))
    }

    pub fn in_edges<'a>(&'a self, id: &str) -> Vec<EdgeView<'a>> {
        self.directed(id, Direction::Incoming)
    }

    pub fn out_edges<'a>(&'a self, id: &str) -> Vec<EdgeView<'a>> {
        self.directed(id, Direction::Outgoing)
    }

    fn directed<'a>(&'a self, id: &str, direction: Direction) -> Vec<EdgeView<'a>> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<EdgeReference<'a, TrustEdge>> =
            self.graph.edges_directed(idx, direction).collect();
        // petgraph walks adjacency lists newest-first.
        edges.sort_by_key(|edge| edge.id());
        edges.into_iter().map(|edge| self.view(edge)).collect()
    }

    fn view<'a>(&'a self, edge: EdgeReference<'a, TrustEdge>) -> EdgeView<'a> {
        EdgeView {
            source: &self.graph[edge.source()].id,
            target: &self.graph[edge.target()].id,
            edge: edge.weight(),
        }
    }
}
