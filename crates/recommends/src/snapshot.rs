//! Published graph snapshots
//!
//! Readers take an `Arc` to the current store and keep it for as long as
//! they need; publishing swaps the pointer without touching old snapshots.
//! Incremental events are applied one at a time under the write lock and
//! copy the store first if any reader still holds it. When snapshots come
//! from a rebuild source, events are refused until the first build lands;
//! otherwise the first event starts an empty graph.

use crate::graph::{
    apply_event, EventOutcome, GraphBuilder, GraphEvent, GraphSource, GraphStats, GraphStore,
};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use transient_common::errors::{AppError, Result};
use transient_common::metrics::{record_graph_size, record_ingestion, record_rebuild};

pub struct GraphSnapshots {
    current: RwLock<Option<Arc<GraphStore>>>,
    builder: GraphBuilder,
    /// Deadline for one rebuild, retries included
    rebuild_timeout: Duration,
    rebuilding: Mutex<()>,
    /// Refuse events while nothing has been published
    requires_initial_build: bool,
}

impl GraphSnapshots {
    pub fn new(builder: GraphBuilder, rebuild_timeout: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            builder,
            rebuild_timeout,
            rebuilding: Mutex::new(()),
            requires_initial_build: false,
        }
    }

    /// Events return `GraphUnavailable` until a rebuild or `publish` has
    /// produced the first snapshot
    pub fn requires_initial_build(mut self) -> Self {
        self.requires_initial_build = true;
        self
    }

    /// The published snapshot, or `GraphUnavailable` before the first one
    pub async fn current(&self) -> Result<Arc<GraphStore>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(AppError::GraphUnavailable)
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Swap in a fully built store
    pub async fn publish(&self, store: GraphStore) -> Arc<GraphStore> {
        let stats = store.stats();
        let snapshot = Arc::new(store);
        *self.current.write().await = Some(snapshot.clone());

        record_graph_size(stats.nodes, stats.edges);
        info!(
            nodes = stats.nodes,
            edges = stats.edges,
            users = stats.users,
            posts = stats.posts,
            "Published graph snapshot"
        );
        snapshot
    }

    /// Apply one incremental event to the live graph
    pub async fn apply_event(&self, event: &GraphEvent) -> Result<EventOutcome> {
        let mut guard = self.current.write().await;
        if guard.is_none() && self.requires_initial_build {
            record_ingestion(event.label(), false);
            debug!(event = event.label(), "Graph not built yet, refusing event");
            return Err(AppError::GraphUnavailable);
        }
        let snapshot = guard.get_or_insert_with(|| Arc::new(self.builder.empty()));
        let store = Arc::make_mut(snapshot);

        let result = apply_event(store, event);
        record_ingestion(event.label(), result.is_ok());

        match result {
            Ok(outcome) => {
                record_graph_size(store.node_count(), store.edge_count());
                debug!(event = event.label(), ?outcome, "Applied graph event");
                Ok(outcome)
            }
            Err(e) => {
                warn!(event = event.label(), error = %e, "Rejected graph event");
                Err(e.into())
            }
        }
    }

    /// Fetch, build and publish a fresh snapshot. On failure the previous
    /// snapshot keeps serving.
    pub async fn rebuild(&self, source: &dyn GraphSource) -> Result<GraphStats> {
        let _rebuilding = self.rebuilding.lock().await;
        let start = Instant::now();

        let result = self.fetch_and_build(source).await;
        record_rebuild(start.elapsed().as_secs_f64(), result.is_ok());

        match result {
            Ok(store) => Ok(self.publish(store).await.stats()),
            Err(e) => {
                error!(error = %e, "Graph rebuild failed, keeping previous snapshot");
                Err(e)
            }
        }
    }

    async fn fetch_and_build(&self, source: &dyn GraphSource) -> Result<GraphStore> {
        let lookback_days = self.builder.config().lookback_days;
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.rebuild_timeout),
            ..ExponentialBackoff::default()
        };

        let fetch = retry(policy, || async move {
            source.fetch(lookback_days).await.map_err(|e| {
                if e.is_retryable() || matches!(e, AppError::Database(_)) {
                    warn!(error = %e, "Fetching interaction records failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        });

        let records = tokio::time::timeout(self.rebuild_timeout, fetch)
            .await
            .map_err(|_| AppError::Timeout {
                operation: "graph rebuild".to_string(),
                timeout_ms: self.rebuild_timeout.as_millis() as u64,
            })??;

        let builder = self.builder.clone();
        let (store, report) =
            tokio::task::spawn_blocking(move || builder.build_from_records(&records, Utc::now()))
                .await
                .map_err(|e| AppError::Internal {
                    message: format!("Graph build task failed: {}", e),
                })??;

        debug!(?report, "Graph build report");
        Ok(store)
    }

    /// Rebuild every `interval` on a background task; the first rebuild
    /// happens one interval after spawning
    pub fn spawn_refresh(
        self: Arc<Self>,
        source: Arc<dyn GraphSource>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                // Failures are already logged and the old snapshot keeps serving
                let _ = self.rebuild(source.as_ref()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeKind, StaticSource};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};
    use transient_common::config::GraphConfig;
    use transient_common::db::{FollowRecord, InteractionRecords, PostRecord, VoteRecord};

    fn snapshots() -> GraphSnapshots {
        GraphSnapshots::new(GraphBuilder::new(GraphConfig::default()), Duration::from_millis(300))
    }

    fn records() -> InteractionRecords {
        let now = Utc::now();
        InteractionRecords {
            user_ids: vec!["alice".into(), "bob".into()],
            follows: vec![FollowRecord {
                follower_id: "alice".into(),
                followee_id: "bob".into(),
                followed_at: None,
            }],
            posts: vec![PostRecord {
                poster_id: "bob".into(),
                post_id: "p1".into(),
                created_at: now - ChronoDuration::hours(1),
            }],
            votes: vec![VoteRecord {
                voter_id: "alice".into(),
                post_id: "p1".into(),
                value: 1,
                voted_at: now,
            }],
        }
    }

    struct FailingSource {
        error: fn() -> AppError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphSource for FailingSource {
        async fn fetch(&self, _lookback_days: i64) -> Result<InteractionRecords> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphSource for CountingSource {
        async fn fetch(&self, _lookback_days: i64) -> Result<InteractionRecords> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(records())
        }
    }

    #[tokio::test]
    async fn test_unavailable_before_first_publish() {
        let snapshots = snapshots();
        assert!(!snapshots.is_ready().await);
        assert!(matches!(snapshots.current().await, Err(AppError::GraphUnavailable)));
    }

    #[tokio::test]
    async fn test_publish_keeps_old_readers_valid() {
        let snapshots = snapshots();
        let mut first = GraphStore::default();
        first.upsert_node("alice", NodeKind::User, None);
        snapshots.publish(first).await;

        let reader = assert_ok!(snapshots.current().await);
        snapshots.publish(GraphStore::default()).await;

        assert!(reader.contains("alice"));
        assert_eq!(assert_ok!(snapshots.current().await).node_count(), 0);
    }

    #[tokio::test]
    async fn test_events_are_copy_on_write() {
        let snapshots = snapshots();
        let event = GraphEvent::NodeAdded {
            id: "alice".into(),
            kind: NodeKind::User,
            created_at: None,
        };
        assert_eq!(assert_ok!(snapshots.apply_event(&event).await), EventOutcome::NodeCreated);

        let reader = assert_ok!(snapshots.current().await);

        let event = GraphEvent::NodeAdded {
            id: "bob".into(),
            kind: NodeKind::User,
            created_at: None,
        };
        assert_ok!(snapshots.apply_event(&event).await);

        let edge = GraphEvent::EdgeAdded {
            source_id: "alice".into(),
            destination_id: "bob".into(),
            kind: EdgeKind::Follow,
            timestamp: Utc::now(),
            bidirectional: true,
        };
        assert_ok!(snapshots.apply_event(&edge).await);

        assert_eq!(reader.node_count(), 1);
        assert_eq!(reader.edge_count(), 0);

        let latest = assert_ok!(snapshots.current().await);
        assert_eq!(latest.node_count(), 2);
        assert_eq!(latest.edge_count(), 2);
    }

    #[tokio::test]
    async fn test_events_wait_for_initial_build() {
        let snapshots = snapshots().requires_initial_build();
        let event = GraphEvent::NodeAdded {
            id: "p1".into(),
            kind: NodeKind::Post,
            created_at: Some(Utc::now()),
        };

        let err = assert_err!(snapshots.apply_event(&event).await);
        assert!(matches!(err, AppError::GraphUnavailable));
        assert!(!snapshots.is_ready().await);
        assert!(matches!(snapshots.current().await, Err(AppError::GraphUnavailable)));

        assert_ok!(snapshots.rebuild(&StaticSource::new(records())).await);
        let event = GraphEvent::NodeAdded {
            id: "carol".into(),
            kind: NodeKind::User,
            created_at: None,
        };
        assert_eq!(assert_ok!(snapshots.apply_event(&event).await), EventOutcome::NodeCreated);

        let current = assert_ok!(snapshots.current().await);
        assert!(current.contains("carol"));
        assert!(current.contains("alice"));
    }

    #[tokio::test]
    async fn test_rejected_event_maps_to_app_error() {
        let snapshots = snapshots();
        let event = GraphEvent::VoteCast {
            voter_id: "alice".into(),
            post_id: "p1".into(),
            value: 3,
            timestamp: Utc::now(),
        };

        let err = assert_err!(snapshots.apply_event(&event).await);
        assert!(matches!(err, AppError::InvalidVoteValue { value: 3 }));
    }

    #[tokio::test]
    async fn test_rebuild_publishes() {
        let snapshots = snapshots();
        let stats = assert_ok!(snapshots.rebuild(&StaticSource::new(records())).await);

        assert_eq!(stats.users, 2);
        assert_eq!(stats.posts, 1);
        assert_eq!(stats.edges, 6);
        assert!(snapshots.is_ready().await);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_snapshot() {
        let snapshots = snapshots();
        assert_ok!(snapshots.rebuild(&StaticSource::new(records())).await);

        let permanent = FailingSource {
            error: || AppError::Configuration { message: "bad table".into() },
            calls: AtomicUsize::new(0),
        };
        assert_err!(snapshots.rebuild(&permanent).await);
        assert_eq!(permanent.calls.load(Ordering::SeqCst), 1);

        let mut bad_vote = records();
        bad_vote.votes[0].value = 0;
        let err = assert_err!(snapshots.rebuild(&StaticSource::new(bad_vote)).await);
        assert!(matches!(err, AppError::InvalidVoteValue { value: 0 }));

        let current = assert_ok!(snapshots.current().await);
        assert!(current.contains("p1"));
        assert_eq!(current.edge_count(), 6);
    }

    #[tokio::test]
    async fn test_transient_failures_stop_at_timeout() {
        let snapshots = snapshots();
        let flaky = FailingSource {
            error: || AppError::DatabaseConnection { message: "refused".into() },
            calls: AtomicUsize::new(0),
        };

        let err = assert_err!(snapshots.rebuild(&flaky).await);
        assert!(err.is_retryable());
        assert!(flaky.calls.load(Ordering::SeqCst) >= 1);
        assert!(!snapshots.is_ready().await);
    }

    #[tokio::test]
    async fn test_refresh_loop_rebuilds() {
        let snapshots = Arc::new(snapshots());
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0) });

        let handle = snapshots
            .clone()
            .spawn_refresh(source.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(source.calls.load(Ordering::SeqCst) >= 1);
        assert!(snapshots.is_ready().await);
    }
}
