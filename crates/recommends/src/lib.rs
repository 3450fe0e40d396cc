//! Transient Recommends
//!
//! Interaction-graph recommendations:
//! - Graph store and builder (users, posts, creations, votes, follows)
//! - Bounded weight propagation from a seed user
//! - Snapshot publication for concurrent readers
//! - HTTP ingestion/query interface

pub mod graph;
pub mod handlers;
pub mod propagation;
pub mod routes;
pub mod snapshot;

use graph::{GraphBuilder, GraphSource};
use propagation::PropagationEngine;
use snapshot::GraphSnapshots;
use std::sync::Arc;
use transient_common::config::AppConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub snapshots: Arc<GraphSnapshots>,
    pub engine: Arc<PropagationEngine>,
    /// Where rebuilds read from; `None` when the graph is fed only by events
    pub source: Option<Arc<dyn GraphSource>>,
}

impl AppState {
    pub fn new(config: AppConfig, source: Option<Arc<dyn GraphSource>>) -> Self {
        let builder = GraphBuilder::new(config.graph.clone());
        let mut snapshots = GraphSnapshots::new(builder, config.rebuild.timeout());
        if source.is_some() {
            snapshots = snapshots.requires_initial_build();
        }
        let engine = Arc::new(PropagationEngine::new(config.propagation.clone()));

        Self {
            config: Arc::new(config),
            snapshots: Arc::new(snapshots),
            engine,
            source,
        }
    }
}
