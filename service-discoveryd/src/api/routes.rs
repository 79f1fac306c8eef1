use std::convert::Infallible;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use shared::protocol::API_PREFIX;
use shared::types::{DiscoveryRecord, ServiceCategory};
use crate::aggregator::AggregatorHandle;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: AggregatorHandle,
}

#[derive(Deserialize)]
pub struct ServiceQuery {
    pub category: Option<ServiceCategory>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{}/services", API_PREFIX), get(get_services))
        .route(&format!("{}/services/sessions", API_PREFIX), get(get_sessions))
        .route(&format!("{}/services/scan", API_PREFIX), post(request_scan))
        .route(&format!("{}/services/hash", API_PREFIX), get(get_hash))
        .route(&format!("{}/events", API_PREFIX), get(events))
        .with_state(state)
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    tracing::error!("Failed to query aggregator: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// One category (cleaned up and rescanned) or everything (pure read)
async fn get_services(
    State(state): State<AppState>,
    Query(params): Query<ServiceQuery>,
) -> Result<Json<Vec<DiscoveryRecord>>, StatusCode> {
    let services = match params.category {
        Some(category) => state.aggregator.get_services(category).await,
        None => state.aggregator.get_all_services().await,
    };

    services.map(Json).map_err(internal_error)
}

async fn get_sessions(State(state): State<AppState>) -> Result<Json<Vec<DiscoveryRecord>>, StatusCode> {
    state
        .aggregator
        .get_hyperhdr_sessions()
        .await
        .map(Json)
        .map_err(internal_error)
}

/// Scan one category, or every scannable category when none is given.
/// Serial board categories are scanned through the SerialPort trigger.
async fn request_scan(
    State(state): State<AppState>,
    Query(params): Query<ServiceQuery>,
) -> StatusCode {
    let result = match params.category {
        Some(category) => match category.scan_category() {
            Some(scan) => state.aggregator.scan_request(scan).await,
            None => return StatusCode::BAD_REQUEST,
        },
        None => state.aggregator.request_services_scan().await,
    };

    match result {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => internal_error(e),
    }
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.aggregator.fingerprint()
}

/// Server-sent stream of category change notifications
async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.aggregator.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    let event = match Event::default().event("category_changed").json_data(&change) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::error!("Failed to encode change notification: {}", e);
                            continue;
                        }
                    };
                    return Some((Ok::<_, Infallible>(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} notifications", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
