//! HTTP surface for browser and device publishers.
//!
//! `POST /publish/offer` starts a single-file recording, `POST /publish/stop`
//! finalizes it, and `GET /status` reports what the controller is doing.

use crate::{AppError, AppResult};

use stream_recorder_core::{
    BoundaryPolicy, SessionController, SessionDescription, SessionStatus, StopOutcome,
};

use std::{panic::Location, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    controller: Arc<SessionController>,
}

/// Reply to an accepted offer.
#[derive(Debug, Serialize)]
pub(crate) struct OfferResponse {
    sdp: String,
    #[serde(rename = "type")]
    kind: String,
    session_id: Uuid,
}

/// Optional body of a stop request.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StopRequest {
    #[serde(default)]
    session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StopResponse {
    ok: bool,
    #[serde(flatten)]
    outcome: StopOutcome,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub(crate) fn router(controller: Arc<SessionController>) -> Router {
    Router::new()
        .route("/publish/offer", post(publish_offer))
        .route("/publish/stop", post(publish_stop))
        .route("/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(AppState { controller })
}

/// Serve until Ctrl-C, then stop whatever is still recording.
#[instrument(skip(controller))]
pub(crate) async fn serve(port: u16, controller: Arc<SessionController>) -> AppResult<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::ServerError {
            reason: format!("Failed to bind to {}: {}", addr, e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!(%addr, "Recorder listening");

    axum::serve(listener, router(Arc::clone(&controller)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::ServerError {
            reason: format!("Server error: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let outcome = controller.stop(None).await;
    info!(
        finalized = outcome.finalized,
        path = ?outcome.path,
        "Shutdown complete"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = ?e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C, shutting down");
}

async fn publish_offer(
    State(state): State<AppState>,
    Json(offer): Json<SessionDescription>,
) -> Response {
    match state.controller.start(offer, BoundaryPolicy::Single).await {
        Ok(started) => Json(OfferResponse {
            sdp: started.answer.sdp,
            kind: started.answer.kind,
            session_id: started.session_id,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to start recording");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn publish_stop(State(state): State<AppState>, body: Bytes) -> Json<StopResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StopRequest::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring malformed stop body");
            StopRequest::default()
        })
    };

    let outcome = state.controller.stop(request.session_id).await;

    Json(StopResponse { ok: true, outcome })
}

async fn status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.controller.status().await)
}
