//! HTTP surface for the query service.
//!
//! Three endpoints:
//! - `GET /health`  — liveness plus checkpoint freshness for one lane
//! - `GET /height`  — committed height per lane
//! - `GET /events?from=&to=` — shielded events, clipped to the visible tip

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use maspindex_core::store::IndexStore;
use maspindex_core::types::ShieldedEvent;

use crate::service::{QueryError, QueryService};

// ─── Shared state ────────────────────────────────────────────────────────────

/// State handed to every handler.
pub struct ApiContext<S> {
    pub service: Arc<QueryService<S>>,
    /// Lane whose checkpoint freshness decides `/health`.
    pub health_lane: String,
    /// `/health` reports unhealthy once the lane checkpoint is older than this.
    pub stale_after: Duration,
}

impl<S> Clone for ApiContext<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            health_lane: self.health_lane.clone(),
            stale_after: self.stale_after,
        }
    }
}

/// Build the router over a store-backed query service.
pub fn router<S: IndexStore + 'static>(context: ApiContext<S>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/height", get(heights::<S>))
        .route("/events", get(events::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// Bind and serve until the task is cancelled.
pub async fn serve(router: Router, listen: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "query API listening");
    axum::serve(listener, router).await
}

// ─── Error mapping ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueryError::OutOfRange { .. } | QueryError::UnknownLane(_) => StatusCode::BAD_REQUEST,
            QueryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    lane: String,
    height: Option<u64>,
}

async fn health<S: IndexStore>(
    State(ctx): State<ApiContext<S>>,
) -> Result<Response, ApiError> {
    let checkpoint = ctx.service.checkpoint(&ctx.health_lane).await?;

    let (status, code, height) = match checkpoint {
        Some(cp) => {
            let age = chrono::Utc::now().timestamp().saturating_sub(cp.updated_at);
            if age <= ctx.stale_after.as_secs() as i64 {
                ("ok", StatusCode::OK, Some(cp.height))
            } else {
                ("stale", StatusCode::SERVICE_UNAVAILABLE, Some(cp.height))
            }
        }
        None => ("uninitialized", StatusCode::SERVICE_UNAVAILABLE, None),
    };

    let body = HealthBody { status, lane: ctx.health_lane.clone(), height };
    Ok((code, Json(body)).into_response())
}

async fn heights<S: IndexStore>(
    State(ctx): State<ApiContext<S>>,
) -> Result<Json<std::collections::BTreeMap<String, Option<u64>>>, ApiError> {
    Ok(Json(ctx.service.heights().await?))
}

#[derive(Deserialize)]
struct EventsParams {
    from: u64,
    to: u64,
}

#[derive(Serialize)]
struct EventsBody {
    from: u64,
    /// Upper bound actually served after clipping to the visible tip.
    /// `null` while any lane is still uninitialized.
    to: Option<u64>,
    events: Vec<ShieldedEvent>,
}

async fn events<S: IndexStore>(
    State(ctx): State<ApiContext<S>>,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventsBody>, ApiError> {
    let (events, to) = ctx.service.events_in_range(params.from, params.to).await?;
    Ok(Json(EventsBody { from: params.from, to, events }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use maspindex_core::checkpoint::CRAWLER_LANE;
    use maspindex_core::store::MemoryStore;
    use maspindex_core::types::{Block, EventKind};

    fn blk(height: u64, hash: &str) -> Block {
        Block {
            height,
            hash: hash.into(),
            parent_hash: format!("p{height}"),
            time: height as i64,
            tx_count: 0,
        }
    }

    fn ev(height: u64, position: u32) -> ShieldedEvent {
        ShieldedEvent {
            height,
            kind: EventKind::Commitment,
            position,
            tx_index: 0,
            payload: vec![0xab],
        }
    }

    async fn seeded_router() -> Router {
        let store = MemoryStore::new();
        store
            .advance(CRAWLER_LANE, None, &blk(100, "a"), &[ev(100, 0), ev(100, 1)])
            .await
            .unwrap();
        store
            .advance(CRAWLER_LANE, Some(100), &blk(101, "b"), &[ev(101, 0)])
            .await
            .unwrap();

        let service = QueryService::new(store, vec![CRAWLER_LANE.to_string()], 100);
        router(ApiContext {
            service: Arc::new(service),
            health_lane: CRAWLER_LANE.to_string(),
            stale_after: Duration::from_secs(60),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok_for_a_fresh_checkpoint() {
        let app = seeded_router().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["height"], 101);
    }

    #[tokio::test]
    async fn health_is_unavailable_before_bootstrap() {
        let service = QueryService::new(MemoryStore::new(), vec![CRAWLER_LANE.to_string()], 0);
        let app = router(ApiContext {
            service: Arc::new(service),
            health_lane: CRAWLER_LANE.to_string(),
            stale_after: Duration::from_secs(60),
        });

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = body_json(response).await;
        assert_eq!(json["status"], "uninitialized");
    }

    #[tokio::test]
    async fn heights_lists_lanes() {
        let app = seeded_router().await;
        let response = app
            .oneshot(Request::get("/height").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json[CRAWLER_LANE], 101);
    }

    #[tokio::test]
    async fn events_are_served_in_order_with_hex_payloads() {
        let app = seeded_router().await;
        let response = app
            .oneshot(
                Request::get("/events?from=100&to=999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["to"], 101);
        let events = json["events"].as_array().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["height"], 100);
        assert_eq!(events[0]["position"], 0);
        assert_eq!(events[0]["payload"], "ab");
        assert_eq!(events[2]["height"], 101);
    }

    #[tokio::test]
    async fn below_floor_is_a_bad_request() {
        let app = seeded_router().await;
        let response = app
            .oneshot(
                Request::get("/events?from=10&to=200")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("indexing begins"));
    }

    #[tokio::test]
    async fn missing_params_are_a_bad_request() {
        let app = seeded_router().await;
        let response = app
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
