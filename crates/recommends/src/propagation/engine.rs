//! Bounded-iteration weight diffusion
//!
//! Each call owns its weight map; nothing is written back to the graph, so
//! any number of calls may share one snapshot.

use super::Recommendation;
use crate::graph::{GraphError, GraphStore, Node, NodeIndex};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use transient_common::config::{PropagationConfig, RankOrder};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Propagation engine
#[derive(Debug, Clone)]
pub struct PropagationEngine {
    config: PropagationConfig,
}

impl PropagationEngine {
    pub fn new(config: PropagationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Rank posts for `seed_id`, decaying post weights against the current time
    pub fn recommend(
        &self,
        graph: &GraphStore,
        seed_id: &str,
    ) -> Result<Vec<Recommendation>, GraphError> {
        self.recommend_at(graph, seed_id, Utc::now())
    }

    /// Rank posts for `seed_id` with post ages measured from `now`
    pub fn recommend_at(
        &self,
        graph: &GraphStore,
        seed_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, GraphError> {
        self.propagate(graph, seed_id, now, |_, _| {})
    }

    fn propagate<F>(
        &self,
        graph: &GraphStore,
        seed_id: &str,
        now: DateTime<Utc>,
        mut on_iteration: F,
    ) -> Result<Vec<Recommendation>, GraphError>
    where
        F: FnMut(usize, &HashMap<NodeIndex, f64>),
    {
        let seed = graph
            .index_of(seed_id)
            .ok_or_else(|| GraphError::UnknownSeed { id: seed_id.to_string() })?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Some(summary) = graph.describe_node(seed_id) {
                debug!(seed = seed_id, neighbourhood = %summary, "Propagating");
            }
        }

        let mut weights: HashMap<NodeIndex, f64> = HashMap::new();
        weights.insert(seed, self.config.starting_weight);

        let mut frontier = vec![seed];
        let mut seen: HashSet<NodeIndex> = HashSet::from([seed]);

        for iteration in 0..self.config.iterations {
            // Ordered so that float sums are reproducible between calls
            let mut pending: BTreeMap<NodeIndex, f64> = BTreeMap::new();

            for &source in &frontier {
                let weight = weights.get(&source).copied().unwrap_or(0.0);
                for edge in graph.neighbors_of(source, self.config.max_edges) {
                    if graph.node_at(edge.destination()).is_none() {
                        warn!(
                            source = edge.source_id(),
                            destination = edge.destination_id(),
                            "Skipping edge to missing node"
                        );
                        continue;
                    }
                    let contribution = weight * edge.kind().fraction(&self.config.type_fractions);
                    *pending.entry(edge.destination()).or_insert(0.0) += contribution;
                }
            }

            if pending.is_empty() {
                break;
            }

            for (&idx, &total) in &pending {
                let value = match graph.node_at(idx) {
                    Some(node) if node.is_post() => total * self.decay(node, now),
                    _ => total,
                };
                let entry = weights.entry(idx).or_insert(0.0);
                if value > *entry {
                    *entry = value;
                }
            }

            seen.extend(pending.keys().copied());
            frontier = pending.into_keys().collect();
            on_iteration(iteration, &weights);
        }

        // Posts the seed already created or voted on
        if let Some(seed_node) = graph.node_at(seed) {
            for edge in seed_node.edges() {
                if graph.node_at(edge.destination()).is_some_and(Node::is_post) {
                    weights.insert(edge.destination(), 0.0);
                }
            }
        }

        let mut candidates: Vec<Recommendation> = seen
            .into_iter()
            .filter(|&idx| idx != seed)
            .filter_map(|idx| {
                let node = graph.node_at(idx).filter(|n| n.is_post())?;
                let score = weights.get(&idx).copied().unwrap_or(0.0);
                (score > 0.0).then(|| Recommendation {
                    post_id: node.id().to_string(),
                    score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| self.rank(a, b));
        if let Some(max) = self.config.max_results {
            candidates.truncate(max);
        }

        debug!(seed = seed_id, candidates = candidates.len(), "Propagation finished");
        Ok(candidates)
    }

    /// Final ordering of candidates; equal scores fall back to post id
    fn rank(&self, a: &Recommendation, b: &Recommendation) -> Ordering {
        let by_score = match self.config.rank_order {
            RankOrder::Ascending => a.score.total_cmp(&b.score),
            RankOrder::Descending => b.score.total_cmp(&a.score),
        };
        by_score.then_with(|| a.post_id.cmp(&b.post_id))
    }

    /// Share of a post's pending weight that survives its age, in [0, 1]
    fn decay(&self, post: &Node, now: DateTime<Utc>) -> f64 {
        let max_age = self.config.max_age_hours;
        let Some(created_at) = post.created_at() else {
            warn!(post = post.id(), "Post has no creation time, treating as expired");
            return 0.0;
        };
        if max_age <= 0.0 {
            return 0.0;
        }

        let age_hours = (now - created_at).num_milliseconds() as f64 / MILLIS_PER_HOUR;
        ((max_age - age_hours) / max_age).clamp(0.0, 1.0)
    }
}

impl Default for PropagationEngine {
    fn default() -> Self {
        Self::new(PropagationConfig::default())
    }
}
