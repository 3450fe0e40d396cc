//! In-memory graph store
//!
//! Owns every node in a dense arena keyed by id. Structural invariants only:
//! - at most one outgoing edge per destination on any node
//! - every adjacency list stays in priority order after each insert

use super::{Edge, EdgeKind, EdgePriority, GraphError, Node, NodeIndex, NodeKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use transient_common::config::{DedupPolicy, GraphConfig};

/// Result of a single `add_edge`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOutcome {
    /// New destination for this source
    Inserted,
    /// Destination already linked; existing edge kept
    Duplicate,
    /// Destination already linked; existing edge replaced
    Replaced,
}

/// Size summary of a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub users: usize,
    pub posts: usize,
}

/// Node/edge registry
#[derive(Debug, Clone)]
pub struct GraphStore {
    nodes: Vec<Node>,
    index: HashMap<Arc<str>, NodeIndex>,
    priority: EdgePriority,
    dedup: DedupPolicy,
    edge_count: usize,
}

impl GraphStore {
    /// Create an empty store using the configured ordering and dedup policy
    pub fn new(config: &GraphConfig) -> Self {
        Self::with_policy(
            EdgePriority::new(config.priority_threshold_hours),
            config.dedup_policy,
        )
    }

    pub fn with_policy(priority: EdgePriority, dedup: DedupPolicy) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            priority,
            dedup,
            edge_count: 0,
        }
    }

    /// Insert a node, or return the existing one untouched
    pub fn upsert_node(
        &mut self,
        id: &str,
        kind: NodeKind,
        created_at: Option<DateTime<Utc>>,
    ) -> NodeIndex {
        if let Some(&existing) = self.index.get(id) {
            let node = &self.nodes[existing.0];
            if node.kind != kind {
                debug!(id, existing = ?node.kind, requested = ?kind, "Node already exists with another kind");
            }
            return existing;
        }

        let idx = NodeIndex(self.nodes.len());
        let id: Arc<str> = Arc::from(id);
        self.nodes.push(Node::new(id.clone(), kind, created_at));
        self.index.insert(id, idx);
        idx
    }

    /// Add a directed edge stored on `source_id`'s adjacency list
    pub fn add_edge(
        &mut self,
        source_id: &str,
        destination_id: &str,
        kind: EdgeKind,
        timestamp: DateTime<Utc>,
    ) -> Result<EdgeOutcome, GraphError> {
        let source = self.require(source_id)?;
        let destination = self.require(destination_id)?;
        Ok(self.insert(source, destination, kind, timestamp))
    }

    /// Add an edge in both directions; both endpoints are checked first so
    /// a failure leaves the store untouched
    pub fn add_edge_pair(
        &mut self,
        a_id: &str,
        b_id: &str,
        kind: EdgeKind,
        timestamp: DateTime<Utc>,
    ) -> Result<(EdgeOutcome, EdgeOutcome), GraphError> {
        let a = self.require(a_id)?;
        let b = self.require(b_id)?;
        let forward = self.insert(a, b, kind, timestamp);
        let reverse = self.insert(b, a, kind, timestamp);
        Ok((forward, reverse))
    }

    /// Up to `limit` edges from the front of `node_id`'s adjacency list
    pub fn neighbors(&self, node_id: &str, limit: usize) -> Result<&[Edge], GraphError> {
        let idx = self.require(node_id)?;
        Ok(self.neighbors_of(idx, limit))
    }

    pub fn neighbors_of(&self, idx: NodeIndex, limit: usize) -> &[Edge] {
        match self.nodes.get(idx.0) {
            Some(node) => &node.edges[..node.edges.len().min(limit)],
            None => &[],
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|idx| &self.nodes[idx.0])
    }

    pub fn node_at(&self, idx: NodeIndex) -> Option<&Node> {
        self.nodes.get(idx.0)
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn priority(&self) -> EdgePriority {
        self.priority
    }

    pub fn stats(&self) -> GraphStats {
        let posts = self.nodes.iter().filter(|n| n.is_post()).count();
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edge_count,
            users: self.nodes.len() - posts,
            posts,
        }
    }

    /// Compact adjacency summary, e.g. `u-alice: [f -> u-bob, c -> p-post1]`
    pub fn describe_node(&self, id: &str) -> Option<String> {
        let node = self.node(id)?;
        let edges = node
            .edges
            .iter()
            .map(|edge| {
                let dest_kind = self
                    .node_at(edge.destination)
                    .map(|n| n.kind.symbol())
                    .unwrap_or('?');
                format!("{} -> {}-{}", edge.kind.symbol(), dest_kind, edge.destination_id)
            })
            .collect::<Vec<_>>()
            .join(", ");

        Some(format!("{}-{}: [{}]", node.kind.symbol(), node.id, edges))
    }

    fn require(&self, id: &str) -> Result<NodeIndex, GraphError> {
        self.index_of(id)
            .ok_or_else(|| GraphError::UnknownNode { id: id.to_string() })
    }

    fn insert(
        &mut self,
        source: NodeIndex,
        destination: NodeIndex,
        kind: EdgeKind,
        timestamp: DateTime<Utc>,
    ) -> EdgeOutcome {
        let priority = self.priority;
        let dedup = self.dedup;
        let edge = Edge {
            destination,
            source_id: self.nodes[source.0].id.clone(),
            destination_id: self.nodes[destination.0].id.clone(),
            kind,
            timestamp,
        };

        let node = &mut self.nodes[source.0];
        let outcome = if node.destinations.contains(&destination) {
            match dedup {
                DedupPolicy::FirstWriteWins => return EdgeOutcome::Duplicate,
                DedupPolicy::LastWriteWins => {
                    let replaced_at = node.edges.iter().position(|e| e.destination == destination);
                    if let Some(pos) = replaced_at {
                        node.edges.remove(pos);
                        // Closing the gap can join two edges that were never compared
                        let joined_out_of_order = pos > 0
                            && pos < node.edges.len()
                            && priority.compare(&node.edges[pos - 1], &node.edges[pos])
                                == Ordering::Greater;
                        if joined_out_of_order {
                            for existing in std::mem::take(&mut node.edges) {
                                let at = priority.insertion_point(&node.edges, &existing);
                                node.edges.insert(at, existing);
                            }
                        }
                    }
                    EdgeOutcome::Replaced
                }
            }
        } else {
            node.destinations.insert(destination);
            self.edge_count += 1;
            EdgeOutcome::Inserted
        };

        let at = priority.insertion_point(&node.edges, &edge);
        node.edges.insert(at, edge);
        outcome
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(&GraphConfig::default())
    }
}
