//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use super::ApiError;
use crate::sync::{AppendAck, MemoryAuthority, RemotePage};
use crate::types::Event;

/// Query parameters for listing events
#[derive(Debug, Deserialize)]
pub struct ListEventsParams {
    /// Arrival sequence already held by the caller
    pub since: Option<u64>,
}

/// Create the Axum router with all endpoints
pub fn create_router(authority: Arc<MemoryAuthority>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/events", get(list_events).post(append_events))
        .layer(cors)
        .with_state(authority)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/events
async fn list_events(
    State(authority): State<Arc<MemoryAuthority>>,
    Query(params): Query<ListEventsParams>,
) -> Json<RemotePage> {
    Json(match params.since {
        Some(since) => authority.page_since(since),
        None => authority.page_all(),
    })
}

/// POST /api/events
async fn append_events(
    State(authority): State<Arc<MemoryAuthority>>,
    Json(events): Json<Vec<Event>>,
) -> Result<Json<AppendAck>, ApiError> {
    let received = events.len();
    let ack = tokio::task::spawn_blocking(move || authority.insert(events))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| {
            error!(error = %e, "could not persist pushed events");
            ApiError::internal(e.to_string())
        })?;
    info!(received, inserted = ack.inserted, high_water = ack.high_water, "events appended");
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(events: &[Event]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/events")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(events).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(Arc::new(MemoryAuthority::new()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_append_then_list_since() {
        let authority = Arc::new(MemoryAuthority::new());
        let app = create_router(authority.clone());
        let events = vec![nurture("a", "g1", at(1)), nurture("b", "g1", at(2))];

        let response = app.clone().oneshot(post(&events)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let ack: AppendAck = body_json(response).await;
        assert_eq!(ack.inserted, 2);

        let response = app.clone().oneshot(post(&events[..1])).await.unwrap();
        let ack: AppendAck = body_json(response).await;
        assert_eq!((ack.inserted, ack.duplicates), (0, 1));

        let response = app
            .oneshot(Request::builder().uri("/api/events?since=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let page: RemotePage = body_json(response).await;
        assert_eq!(page.high_water, 2);
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].client_id, "b");
    }

    #[tokio::test]
    async fn test_rejects_malformed_body() {
        let app = create_router(Arc::new(MemoryAuthority::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/api/events")
            .header("content-type", "application/json")
            .body(Body::from("{\"not\": \"an array\"}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }
}
