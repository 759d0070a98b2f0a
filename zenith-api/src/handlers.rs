//! JSON handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use zenith_common::{CampaignId, StoreError, TrackingKey, incoming};
use zenith_delivery::{ControlError, LaunchError};

use crate::AppState;

fn failure(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.to_string() })),
    )
        .into_response()
}

fn store_failure(error: &StoreError) -> Response {
    match error {
        StoreError::CampaignNotFound(_) | StoreError::SubscriberNotFound(_) => {
            failure(StatusCode::NOT_FOUND, error)
        }
        _ => {
            incoming!(level = ERROR, error = %error, "Store failure while serving request");
            failure(StatusCode::INTERNAL_SERVER_ERROR, error)
        }
    }
}

/// `POST /api/campaigns/{id}/launch`
pub async fn launch(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = CampaignId::from(id);
    incoming!(level = INFO, campaign_id = %id, "Launch requested");

    match state.engine.launch(&id).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({ "success": true, "count": report.enqueued })),
        )
            .into_response(),
        Err(e @ LaunchError::NotFound(_)) => failure(StatusCode::NOT_FOUND, e),
        Err(e) if e.is_conflict() => failure(StatusCode::CONFLICT, e),
        Err(e) => {
            incoming!(level = ERROR, campaign_id = %id, error = %e, "Launch failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

fn control_response(result: Result<zenith_common::Campaign, ControlError>) -> Response {
    match result {
        Ok(campaign) => Json(campaign).into_response(),
        Err(e @ ControlError::NotFound(_)) => failure(StatusCode::NOT_FOUND, e),
        Err(e @ ControlError::InvalidStatus { .. }) => failure(StatusCode::CONFLICT, e),
        Err(ControlError::Store(e)) => store_failure(&e),
    }
}

/// `POST /api/campaigns/{id}/pause`
pub async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = CampaignId::from(id);
    incoming!(level = INFO, campaign_id = %id, "Pause requested");
    control_response(state.engine.pause(&id).await)
}

/// `POST /api/campaigns/{id}/resume`
pub async fn resume(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = CampaignId::from(id);
    incoming!(level = INFO, campaign_id = %id, "Resume requested");
    control_response(state.engine.resume(&id).await)
}

/// `GET /api/campaigns`
pub async fn campaigns(State(state): State<AppState>) -> Response {
    match state.engine.campaigns().await {
        Ok(campaigns) => Json(campaigns).into_response(),
        Err(e) => store_failure(&e),
    }
}

/// `GET /api/campaigns/{id}`
pub async fn campaign(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.campaign(&CampaignId::from(id)).await {
        Ok(campaign) => Json(campaign).into_response(),
        Err(e) => store_failure(&e),
    }
}

/// `GET /api/deliveries/{key}`
pub async fn deliveries(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let key = match TrackingKey::parse(&key) {
        Ok(key) => key,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };

    match state.engine.deliveries(&key).await {
        Ok(records) if records.is_empty() => {
            failure(StatusCode::NOT_FOUND, format!("No deliveries for {key}"))
        }
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            incoming!(level = ERROR, tracking_key = %key, error = %e, "Ledger read failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// `GET /health/live`
pub async fn liveness(State(state): State<AppState>) -> Response {
    if state.health.is_alive() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
    }
}

/// `GET /health/ready`
pub async fn readiness(State(state): State<AppState>) -> Response {
    state.health.set_queue_depth(state.engine.queue().depth());

    let status = state.health.status();
    if status.ready {
        (StatusCode::OK, "OK").into_response()
    } else {
        incoming!(
            level = WARN,
            queue_ready = status.queue_ready,
            workers_ready = status.workers_ready,
            queue_depth = status.queue_depth,
            max_queue_depth = status.max_queue_depth,
            "Readiness probe failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}
