use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use log::info;

use crate::data::{RegistryStats, SymbolStreamRegistry};

#[derive(Clone)]
pub struct ApiState {
    pub registry: SymbolStreamRegistry,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: RegistryStats,
    pub retention: &'static str,
    pub active_symbols: Vec<String>,
}

// GET /stocks/{symbol} - Server-sent price events.
// axum drops the stream on client disconnect, which drops the subscription.
pub async fn stream_prices(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!("SSE client attached to {}", symbol);
    let events = state.registry
        .subscribe(&symbol)
        .map(|sample| Event::default().json_data(&sample));

    Sse::new(events).keep_alive(KeepAlive::default())
}

// GET /api/health - Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "stock_service",
        "timestamp": chrono::Utc::now()
    }))
}

// GET /api/stats - Registry snapshot
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.registry.stats(),
        retention: state.registry.retention().as_str(),
        active_symbols: state.registry.symbols(),
    })
}

// Create the API router
pub fn create_api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats));

    Router::new()
        .route("/stocks/:symbol", get(stream_prices))
        .nest("/api", api_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::data::{PriceSample, RetentionPolicy};

    fn make_state() -> ApiState {
        ApiState {
            registry: SymbolStreamRegistry::new(16, RetentionPolicy::KeepAlive),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_api_router(make_state());

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_prices_emits_json_events() {
        let state = make_state();
        let app = create_api_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/stocks/DEMO").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(state.registry.subscriber_count("DEMO"), 1);

        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        let payload = text
            .lines()
            .find_map(|line| line.strip_prefix("data:"))
            .unwrap()
            .trim();

        let sample: PriceSample = serde_json::from_str(payload).unwrap();
        assert_eq!(sample.symbol, "DEMO");
        assert!(sample.price >= 0.0 && sample.price < 100.0);

        drop(body);
        assert_eq!(state.registry.subscriber_count("DEMO"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_reports_symbols() {
        let state = make_state();
        let _a = state.registry.subscribe("A");
        let _b = state.registry.subscribe("B");
        let app = create_api_router(state);

        let response = app
            .oneshot(Request::builder().uri("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["symbols"], 2);
        assert_eq!(value["subscribers"], 2);
        assert_eq!(value["streams_started"], 2);
        assert_eq!(value["retention"], "keep_alive");
        assert_eq!(value["active_symbols"], serde_json::json!(["A", "B"]));
    }
}
