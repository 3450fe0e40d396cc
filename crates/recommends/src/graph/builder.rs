//! Graph construction
//!
//! Builds a [`GraphStore`] from a batch of interaction records, or mutates
//! one from a single incremental event. Records that reference unknown ids
//! are logged and skipped; only an invalid vote value fails a batch build.

use super::{EdgeKind, EdgeOutcome, GraphError, GraphStore, NodeKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use transient_common::config::GraphConfig;
use transient_common::db::{InteractionRecords, Repository};
use transient_common::errors::Result;

/// Provider of raw interaction records for a lookback window
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Users, follows, posts created within the last `lookback_days`, and
    /// votes on those posts
    async fn fetch(&self, lookback_days: i64) -> Result<InteractionRecords>;

    /// Check that the source is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl GraphSource for Repository {
    async fn fetch(&self, lookback_days: i64) -> Result<InteractionRecords> {
        self.interaction_records(lookback_days).await
    }

    async fn ping(&self) -> Result<()> {
        Repository::ping(self).await
    }
}

/// Fixed in-memory records, used for fixtures and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: InteractionRecords,
}

impl StaticSource {
    pub fn new(records: InteractionRecords) -> Self {
        Self { records }
    }
}

#[async_trait]
impl GraphSource for StaticSource {
    async fn fetch(&self, _lookback_days: i64) -> Result<InteractionRecords> {
        Ok(self.records.clone())
    }
}

/// Counts from one batch build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub users: usize,
    pub follows: usize,
    pub posts: usize,
    pub votes: usize,
    /// Records dropped for referencing unknown ids
    pub skipped: usize,
    /// Posts (and votes on them) outside the lookback window
    pub stale: usize,
}

/// Populates graph stores
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// An empty store with this builder's ordering and dedup policy
    pub fn empty(&self) -> GraphStore {
        GraphStore::new(&self.config)
    }

    /// Fetch from `source` and build a complete store
    pub async fn build(&self, source: &dyn GraphSource) -> Result<GraphStore> {
        let records = source.fetch(self.config.lookback_days).await?;
        let (store, _) = self.build_from_records(&records, Utc::now())?;
        Ok(store)
    }

    /// Build a complete store from already-fetched records
    pub fn build_from_records(
        &self,
        records: &InteractionRecords,
        now: DateTime<Utc>,
    ) -> std::result::Result<(GraphStore, BuildReport), GraphError> {
        let mut store = self.empty();
        let mut report = BuildReport::default();
        let window_start = now - Duration::days(self.config.lookback_days);

        for id in &records.user_ids {
            store.upsert_node(id, NodeKind::User, None);
            report.users += 1;
        }

        for follow in &records.follows {
            let followed_at = follow.followed_at.unwrap_or(now);
            match store.add_edge_pair(&follow.follower_id, &follow.followee_id, EdgeKind::Follow, followed_at) {
                Ok(_) => report.follows += 1,
                Err(e) => {
                    warn!(
                        follower = %follow.follower_id,
                        followee = %follow.followee_id,
                        error = %e,
                        "Skipping follow"
                    );
                    report.skipped += 1;
                }
            }
        }

        let mut stale_posts: HashSet<&str> = HashSet::new();
        for post in &records.posts {
            if post.created_at <= window_start {
                stale_posts.insert(&post.post_id);
                report.stale += 1;
                continue;
            }

            store.upsert_node(&post.post_id, NodeKind::Post, Some(post.created_at));
            match store.add_edge_pair(&post.poster_id, &post.post_id, EdgeKind::Creation, post.created_at) {
                Ok(_) => report.posts += 1,
                Err(e) => {
                    warn!(poster = %post.poster_id, post = %post.post_id, error = %e, "Skipping post creation edge");
                    report.skipped += 1;
                }
            }
        }

        for vote in &records.votes {
            let kind = EdgeKind::from_vote(vote.value)?;

            if stale_posts.contains(vote.post_id.as_str()) {
                debug!(post = %vote.post_id, "Skipping vote on post outside lookback window");
                report.stale += 1;
                continue;
            }

            match store.add_edge_pair(&vote.voter_id, &vote.post_id, kind, vote.voted_at) {
                Ok(_) => report.votes += 1,
                Err(e) => {
                    warn!(voter = %vote.voter_id, post = %vote.post_id, error = %e, "Skipping vote");
                    report.skipped += 1;
                }
            }
        }

        info!(
            nodes = store.node_count(),
            edges = store.edge_count(),
            skipped = report.skipped,
            stale = report.stale,
            "Graph built"
        );

        Ok((store, report))
    }
}

/// Incremental change to a live graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeAdded {
        id: String,
        kind: NodeKind,
        created_at: Option<DateTime<Utc>>,
    },
    EdgeAdded {
        source_id: String,
        destination_id: String,
        kind: EdgeKind,
        timestamp: DateTime<Utc>,
        bidirectional: bool,
    },
    VoteCast {
        voter_id: String,
        post_id: String,
        value: i64,
        timestamp: DateTime<Utc>,
    },
}

impl GraphEvent {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            GraphEvent::NodeAdded { .. } => "node",
            GraphEvent::EdgeAdded { .. } => "edge",
            GraphEvent::VoteCast { .. } => "vote",
        }
    }
}

/// What an applied event changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EventOutcome {
    NodeCreated,
    NodeExisted,
    Edge {
        forward: EdgeOutcome,
        reverse: Option<EdgeOutcome>,
    },
}

/// Apply one event with the same dedup and unknown-id rules as a batch build.
/// On error the store is left unchanged.
pub fn apply_event(
    store: &mut GraphStore,
    event: &GraphEvent,
) -> std::result::Result<EventOutcome, GraphError> {
    match event {
        GraphEvent::NodeAdded { id, kind, created_at } => {
            if store.contains(id) {
                return Ok(EventOutcome::NodeExisted);
            }
            store.upsert_node(id, *kind, *created_at);
            Ok(EventOutcome::NodeCreated)
        }
        GraphEvent::EdgeAdded { source_id, destination_id, kind, timestamp, bidirectional } => {
            if *bidirectional {
                let (forward, reverse) = store.add_edge_pair(source_id, destination_id, *kind, *timestamp)?;
                Ok(EventOutcome::Edge { forward, reverse: Some(reverse) })
            } else {
                let forward = store.add_edge(source_id, destination_id, *kind, *timestamp)?;
                Ok(EventOutcome::Edge { forward, reverse: None })
            }
        }
        GraphEvent::VoteCast { voter_id, post_id, value, timestamp } => {
            let kind = EdgeKind::from_vote(*value)?;
            let (forward, reverse) = store.add_edge_pair(voter_id, post_id, kind, *timestamp)?;
            Ok(EventOutcome::Edge { forward, reverse: Some(reverse) })
        }
    }
}
