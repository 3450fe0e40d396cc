//! Health check handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub graph: CheckResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<CheckResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up() -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: None,
            nodes: None,
            error: None,
        }
    }

    fn down(error: String) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            nodes: None,
            error: Some(error),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness probe - a snapshot is published and the source answers
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let graph_check = match state.snapshots.current().await {
        Ok(snapshot) => CheckResult {
            nodes: Some(snapshot.node_count()),
            ..CheckResult::up()
        },
        Err(e) => CheckResult::down(e.to_string()),
    };

    let db_check = match &state.source {
        Some(source) => {
            let start = std::time::Instant::now();
            Some(match source.ping().await {
                Ok(_) => CheckResult {
                    latency_ms: Some(start.elapsed().as_millis() as u64),
                    ..CheckResult::up()
                },
                Err(e) => CheckResult::down(e.to_string()),
            })
        }
        None => None,
    };

    let all_healthy = graph_check.is_up() && db_check.as_ref().map_or(true, CheckResult::is_up);

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            graph: graph_check,
            database: db_check,
        },
    })
}
