//! HTTP handlers.
//!
//! POST /api/snapshots/stream
//!
//! Validates the batch, then answers immediately with an NDJSON body fed by
//! a background driver: one `progress` line per domain as it starts and one
//! `result` or `error` line as it ends. A client that disconnects stops the
//! driver from starting further domains.
//!
//! POST /api/snapshots
//!
//! Same batch, aggregated into one JSON document once every domain is done.

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;
use waymark_core::{BatchRequest, drive_batch, run_bulk};

use crate::app::AppState;
use crate::error::ApiError;

const NDJSON: &str = "application/x-ndjson";
const REQUEST_ID: &str = "x-request-id";

/// Events buffered between the driver and a slow client.
const EVENT_BUFFER: usize = 32;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// Validates the payload against the server limits.
fn accept(state: &AppState, payload: Result<Json<BatchRequest>, JsonRejection>) -> Result<BatchRequest, ApiError> {
    let Json(request) = payload?;
    Ok(request.validate(&state.limits)?)
}

pub async fn stream_snapshots(
    State(state): State<AppState>, payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = accept(&state, payload)?;
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("batch", %request_id, mode = "stream", domains = request.domains.len());

    let options = request.process_options(state.remote_classifier(request.credential.as_deref()));
    let processor = state.processor.clone();
    let domains = request.domains;
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(
        async move {
            drive_batch(&processor, domains, &options, tx).await;
        }
        .instrument(span),
    );

    let lines = ReceiverStream::new(rx).map(|event| event.to_line().map(Bytes::from));

    Ok((
        [(CONTENT_TYPE, NDJSON)],
        [(REQUEST_ID, request_id.to_string())],
        Body::from_stream(lines),
    )
        .into_response())
}

pub async fn bulk_snapshots(
    State(state): State<AppState>, payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = accept(&state, payload)?;
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("batch", %request_id, mode = "bulk", domains = request.domains.len());

    let options = request.process_options(state.remote_classifier(request.credential.as_deref()));
    let response = run_bulk(&state.processor, request.domains, &options)
        .instrument(span)
        .await;

    Ok(([(REQUEST_ID, request_id.to_string())], Json(response)).into_response())
}
