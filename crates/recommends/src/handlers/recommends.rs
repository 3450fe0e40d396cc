//! Recommendation query handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

use crate::propagation::Recommendation;
use crate::AppState;
use transient_common::errors::{AppError, Result};
use transient_common::metrics::record_recommendation;

/// Detailed recommendation response
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub seed_id: String,
    pub recommendations: Vec<Recommendation>,
}

/// Recommended post ids for a user, in engine order
#[instrument(skip(state))]
pub async fn get_post_ids(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<String>>> {
    let recommendations = recommend(&state, user_id).await?;
    Ok(Json(recommendations.into_iter().map(|r| r.post_id).collect()))
}

/// Recommendations with their scores
#[instrument(skip(state))]
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<RecommendationsResponse>> {
    let recommendations = recommend(&state, user_id.clone()).await?;
    Ok(Json(RecommendationsResponse {
        seed_id: user_id,
        recommendations,
    }))
}

/// Run the engine against the current snapshot off the async runtime
async fn recommend(state: &AppState, seed_id: String) -> Result<Vec<Recommendation>> {
    let snapshot = state.snapshots.current().await?;
    let engine = state.engine.clone();
    let start = Instant::now();

    let result = tokio::task::spawn_blocking(move || engine.recommend(&snapshot, &seed_id))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Propagation task failed: {}", e),
        })?;

    let elapsed = start.elapsed().as_secs_f64();
    match result {
        Ok(recommendations) => {
            record_recommendation(elapsed, recommendations.len(), true);
            Ok(recommendations)
        }
        Err(e) => {
            record_recommendation(elapsed, 0, false);
            Err(e.into())
        }
    }
}
