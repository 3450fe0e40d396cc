//! Ingestion handlers: nodes, edges and votes

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use validator::Validate;

use super::validate;
use crate::graph::{EdgeKind, EdgeOutcome, EventOutcome, GraphEvent, NodeKind};
use crate::AppState;
use transient_common::errors::{AppError, Result};

/// Request to add a user or post
#[derive(Debug, Deserialize, Validate)]
pub struct AddNodeRequest {
    #[validate(length(min = 1, max = 256))]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Creation time; required for posts
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddNodeResponse {
    pub id: String,
    pub created: bool,
}

/// Request to add a typed edge between two existing nodes
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddEdgeRequest {
    #[validate(length(min = 1, max = 256))]
    pub source_id: String,

    #[validate(length(min = 1, max = 256))]
    pub destination_id: String,

    #[serde(rename = "type")]
    pub kind: EdgeKind,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
}

fn default_bidirectional() -> bool { true }

/// Request to record a vote; `vote` must be 1 or -1
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[validate(length(min = 1, max = 256))]
    pub voter_id: String,

    #[validate(length(min = 1, max = 256))]
    pub post_id: String,

    pub vote: i64,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EdgeResponse {
    pub forward: EdgeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<EdgeOutcome>,
}

/// Add a node to the live graph
#[instrument(skip(state, request), fields(id = %request.id))]
pub async fn add_node(
    State(state): State<AppState>,
    Json(request): Json<AddNodeRequest>,
) -> Result<Json<AddNodeResponse>> {
    validate(&request)?;

    if request.kind == NodeKind::Post && request.timestamp.is_none() {
        return Err(AppError::Validation {
            message: "Post nodes require a timestamp".to_string(),
            field: Some("timestamp".to_string()),
        });
    }

    let outcome = state
        .snapshots
        .apply_event(&GraphEvent::NodeAdded {
            id: request.id.clone(),
            kind: request.kind,
            created_at: request.timestamp,
        })
        .await?;

    Ok(Json(AddNodeResponse {
        id: request.id,
        created: outcome == EventOutcome::NodeCreated,
    }))
}

/// Add an edge, in both directions unless told otherwise
#[instrument(
    skip(state, request),
    fields(source = %request.source_id, destination = %request.destination_id)
)]
pub async fn add_edge(
    State(state): State<AppState>,
    Json(request): Json<AddEdgeRequest>,
) -> Result<Json<EdgeResponse>> {
    validate(&request)?;

    let outcome = state
        .snapshots
        .apply_event(&GraphEvent::EdgeAdded {
            source_id: request.source_id,
            destination_id: request.destination_id,
            kind: request.kind,
            timestamp: request.timestamp,
            bidirectional: request.bidirectional,
        })
        .await?;

    edge_response(outcome)
}

/// Record a vote as an upvote or downvote edge pair
#[instrument(skip(state, request), fields(voter = %request.voter_id, post = %request.post_id))]
pub async fn vote(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<EdgeResponse>> {
    validate(&request)?;

    let outcome = state
        .snapshots
        .apply_event(&GraphEvent::VoteCast {
            voter_id: request.voter_id,
            post_id: request.post_id,
            value: request.vote,
            timestamp: request.timestamp,
        })
        .await?;

    edge_response(outcome)
}

fn edge_response(outcome: EventOutcome) -> Result<Json<EdgeResponse>> {
    match outcome {
        EventOutcome::Edge { forward, reverse } => Ok(Json(EdgeResponse { forward, reverse })),
        other => Err(AppError::Internal {
            message: format!("Unexpected outcome for edge event: {:?}", other),
        }),
    }
}
