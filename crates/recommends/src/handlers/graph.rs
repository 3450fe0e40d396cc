//! Graph maintenance handlers

use axum::{extract::State, Json};
use tracing::{info, instrument};

use crate::graph::GraphStats;
use crate::AppState;
use transient_common::errors::{AppError, Result};

/// Rebuild the graph from the configured source and publish it
#[instrument(skip(state))]
pub async fn rebuild(State(state): State<AppState>) -> Result<Json<GraphStats>> {
    let source = state.source.clone().ok_or_else(|| AppError::ServiceUnavailable {
        message: "No graph source configured".to_string(),
    })?;

    info!("Manual graph rebuild requested");
    let stats = state.snapshots.rebuild(source.as_ref()).await?;
    Ok(Json(stats))
}
