//! HTTP routing

use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use transient_common::metrics::RequestMetrics;

use crate::handlers;
use crate::AppState;

/// Create the service router
pub fn create_router(state: AppState) -> Router {
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();
    let timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.config.request_timeout());
    let concurrency =
        ConcurrencyLimitLayer::new(state.config.server.max_concurrent_requests.max(1));

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Ingestion endpoints
        .route("/node", post(handlers::nodes::add_node))
        .route("/edge", post(handlers::nodes::add_edge))
        .route("/vote", post(handlers::nodes::vote))

        // Query endpoints
        .route("/posts/{id}", get(handlers::recommends::get_post_ids))
        .route("/recommends/{id}", get(handlers::recommends::get_recommendations))

        // Maintenance
        .route("/rebuild", post(handlers::graph::rebuild))

        .route_layer(middleware::from_fn(track_metrics))
        .layer(concurrency)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Request count and latency per matched route
async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let metrics = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;
    metrics.finish(response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StaticSource;
    use axum::body::{to_bytes, Body};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use transient_common::config::AppConfig;
    use transient_common::db::{FollowRecord, InteractionRecords, PostRecord};

    fn app(source: Option<Arc<dyn crate::graph::GraphSource>>) -> Router {
        create_router(AppState::new(AppConfig::default(), source))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = axum::http::Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    async fn seed_graph(app: &Router) {
        let now = Utc::now().to_rfc3339();
        for (id, kind) in [("A", "user"), ("B", "user")] {
            let (status, _) = send(app, "POST", "/node", Some(json!({ "id": id, "type": kind }))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = send(app, "POST", "/node", Some(json!({ "id": "p3", "type": "post", "timestamp": now }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(true));

        let (status, _) = send(
            app,
            "POST",
            "/edge",
            Some(json!({ "sourceId": "A", "destinationId": "B", "type": "follow", "timestamp": now })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            app,
            "POST",
            "/edge",
            Some(json!({ "sourceId": "B", "destinationId": "p3", "type": "creation", "timestamp": now })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["forward"], json!("inserted"));
        assert_eq!(body["reverse"], json!("inserted"));
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(None);
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_graph_unavailable_before_any_data() {
        let app = app(None);
        let (status, body) = send(&app, "GET", "/posts/A", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "GRAPH_UNAVAILABLE");

        let (_, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(body["status"], "not_ready");
    }

    #[tokio::test]
    async fn test_ingest_then_recommend() {
        let app = app(None);
        seed_graph(&app).await;

        let (status, body) = send(&app, "GET", "/posts/A", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["p3"]));

        let (status, body) = send(&app, "GET", "/recommends/A", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["seed_id"], "A");
        assert_eq!(body["recommendations"][0]["post_id"], "p3");
        assert!(body["recommendations"][0]["score"].as_f64().unwrap() > 0.0);

        // B created p3, so it is never recommended back to B
        let (_, body) = send(&app, "GET", "/posts/B", None).await;
        assert_eq!(body, json!([]));

        let (_, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_ingestion_errors() {
        let app = app(None);
        seed_graph(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/edge",
            Some(json!({ "sourceId": "A", "destinationId": "ghost", "type": "follow" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UNKNOWN_NODE");

        let (status, body) = send(&app, "POST", "/vote", Some(json!({ "voterId": "A", "postId": "p3", "vote": 2 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_VOTE_VALUE");

        let (status, body) = send(&app, "POST", "/node", Some(json!({ "id": "p9", "type": "post" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field"], "timestamp");

        let (status, body) = send(&app, "POST", "/node", Some(json!({ "id": "", "type": "user" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(&app, "GET", "/posts/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "UNKNOWN_SEED");
    }

    #[tokio::test]
    async fn test_vote_excludes_post() {
        let app = app(None);
        seed_graph(&app).await;

        let (status, body) = send(&app, "POST", "/vote", Some(json!({ "voterId": "A", "postId": "p3", "vote": -1 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["forward"], "inserted");

        let (_, body) = send(&app, "GET", "/posts/A", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_concurrent_queries_agree() {
        let app = app(None);
        seed_graph(&app).await;

        let requests = (0..16).map(|i| {
            let app = app.clone();
            let uri = if i % 2 == 0 { "/posts/A" } else { "/posts/B" };
            async move { (uri, send(&app, "GET", uri, None).await) }
        });

        for (uri, (status, body)) in futures::future::join_all(requests).await {
            assert_eq!(status, StatusCode::OK);
            let expected = if uri == "/posts/A" { json!(["p3"]) } else { json!([]) };
            assert_eq!(body, expected);
        }
    }

    #[tokio::test]
    async fn test_numeric_type_codes() {
        let app = app(None);
        let now = Utc::now().to_rfc3339();

        for (id, code) in [("A", 0), ("B", 0), ("p3", 1)] {
            let (status, _) = send(
                &app,
                "POST",
                "/node",
                Some(json!({ "id": id, "type": code, "timestamp": now })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        // The backend posts each direction separately
        let edges = [("A", "B", 3), ("B", "A", 3), ("B", "p3", 2), ("p3", "B", 2)];
        for (source, destination, code) in edges {
            let (status, _) = send(
                &app,
                "POST",
                "/edge",
                Some(json!({
                    "sourceId": source,
                    "destinationId": destination,
                    "type": code,
                    "timestamp": now,
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app, "GET", "/posts/A", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["p3"]));

        let (status, _) = send(&app, "POST", "/node", Some(json!({ "id": "C", "type": 7 }))).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_events_refused_until_first_build() {
        let source = StaticSource::new(InteractionRecords {
            user_ids: vec!["A".into()],
            ..InteractionRecords::default()
        });
        let app = app(Some(Arc::new(source)));

        let (status, body) = send(&app, "POST", "/node", Some(json!({ "id": "B", "type": "user" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "GRAPH_UNAVAILABLE");

        let (_, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(body["status"], "not_ready");

        let (status, _) = send(&app, "POST", "/rebuild", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", "/node", Some(json!({ "id": "B", "type": "user" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(true));
    }

    #[tokio::test]
    async fn test_rebuild() {
        let (status, body) = send(&app(None), "POST", "/rebuild", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

        let now = Utc::now();
        let source = StaticSource::new(InteractionRecords {
            user_ids: vec!["A".into(), "B".into()],
            follows: vec![FollowRecord {
                follower_id: "A".into(),
                followee_id: "B".into(),
                followed_at: None,
            }],
            posts: vec![PostRecord {
                poster_id: "B".into(),
                post_id: "p3".into(),
                created_at: now - Duration::hours(3),
            }],
            votes: vec![],
        });

        let app = app(Some(Arc::new(source)));
        let (status, body) = send(&app, "POST", "/rebuild", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodes"], 3);
        assert_eq!(body["edges"], 4);

        let (_, body) = send(&app, "GET", "/posts/A", None).await;
        assert_eq!(body, json!(["p3"]));
    }
}
