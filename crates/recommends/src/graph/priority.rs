//! Edge priority ordering
//!
//! Edges more than `threshold` hours apart are ordered by recency alone.
//! Edges closer than that are ordered by kind (Follow > Creation >
//! Downvote > Upvote), then by destination id.
//!
//! This relation is not transitive (a ~ b and b ~ c within the threshold
//! does not put a and c within it), so adjacency lists are kept ordered by
//! insertion rather than by a comparison sort.

use super::Edge;
use std::cmp::Ordering;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePriority {
    threshold_hours: f64,
}

impl EdgePriority {
    pub fn new(threshold_hours: f64) -> Self {
        Self { threshold_hours }
    }

    pub fn threshold_hours(&self) -> f64 {
        self.threshold_hours
    }

    /// `Less` means `a` belongs in front of `b`
    pub fn compare(&self, a: &Edge, b: &Edge) -> Ordering {
        let diff_hours = (a.timestamp - b.timestamp).num_milliseconds() as f64 / MILLIS_PER_HOUR;

        if diff_hours > self.threshold_hours {
            return Ordering::Less;
        }
        if diff_hours < -self.threshold_hours {
            return Ordering::Greater;
        }

        b.kind
            .rank()
            .cmp(&a.kind.rank())
            .then_with(|| a.destination_id.cmp(&b.destination_id))
    }

    /// Position at which `edge` goes: in front of the first edge it outranks
    pub fn insertion_point(&self, edges: &[Edge], edge: &Edge) -> usize {
        edges
            .iter()
            .position(|existing| self.compare(edge, existing) == Ordering::Less)
            .unwrap_or(edges.len())
    }
}

impl Default for EdgePriority {
    fn default() -> Self {
        Self::new(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeIndex};
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;

    fn edge(dest: &str, kind: EdgeKind, timestamp: DateTime<Utc>) -> Edge {
        Edge {
            destination: NodeIndex(1),
            source_id: Arc::from("src"),
            destination_id: Arc::from(dest),
            kind,
            timestamp,
        }
    }

    #[test]
    fn test_recency_beats_kind_outside_threshold() {
        let priority = EdgePriority::new(100.0);
        let now = Utc::now();

        let recent_upvote = edge("a", EdgeKind::Upvote, now);
        let old_follow = edge("b", EdgeKind::Follow, now - Duration::hours(101));

        assert_eq!(priority.compare(&recent_upvote, &old_follow), Ordering::Less);
        assert_eq!(priority.compare(&old_follow, &recent_upvote), Ordering::Greater);
    }

    #[test]
    fn test_kind_rank_inside_threshold() {
        let priority = EdgePriority::new(100.0);
        let now = Utc::now();

        let follow = edge("a", EdgeKind::Follow, now - Duration::hours(50));
        let creation = edge("b", EdgeKind::Creation, now);
        let downvote = edge("c", EdgeKind::Downvote, now);
        let upvote = edge("d", EdgeKind::Upvote, now);

        assert_eq!(priority.compare(&follow, &creation), Ordering::Less);
        assert_eq!(priority.compare(&creation, &downvote), Ordering::Less);
        assert_eq!(priority.compare(&downvote, &upvote), Ordering::Less);
        assert_eq!(priority.compare(&upvote, &follow), Ordering::Greater);
    }

    #[test]
    fn test_ties_broken_by_destination() {
        let priority = EdgePriority::default();
        let now = Utc::now();

        let a = edge("a", EdgeKind::Upvote, now);
        let b = edge("b", EdgeKind::Upvote, now - Duration::hours(1));

        assert_eq!(priority.compare(&a, &b), Ordering::Less);
        assert_eq!(priority.compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_exact_threshold_uses_kind() {
        let priority = EdgePriority::new(100.0);
        let now = Utc::now();

        let upvote = edge("a", EdgeKind::Upvote, now);
        let follow = edge("b", EdgeKind::Follow, now - Duration::hours(100));

        assert_eq!(priority.compare(&follow, &upvote), Ordering::Less);
    }

    #[test]
    fn test_insertion_point() {
        let priority = EdgePriority::new(100.0);
        let now = Utc::now();

        let edges = vec![
            edge("a", EdgeKind::Follow, now),
            edge("b", EdgeKind::Upvote, now),
        ];

        let creation = edge("c", EdgeKind::Creation, now);
        assert_eq!(priority.insertion_point(&edges, &creation), 1);

        let ancient = edge("d", EdgeKind::Follow, now - Duration::days(30));
        assert_eq!(priority.insertion_point(&edges, &ancient), 2);

        let future = edge("e", EdgeKind::Upvote, now + Duration::days(30));
        assert_eq!(priority.insertion_point(&edges, &future), 0);
    }
}
