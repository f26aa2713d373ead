use std::{sync::Arc, time::Duration};

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use tracing::info;

use crate::{
    config::Config,
    error::AppError,
    policy::FormAdmissionPolicy,
    state::AppState,
    status::WaitingRoomStatusDto,
    utils::client_id_from_headers,
};

/// Admin payload enabling or updating protection for a form. Omitted tuning
/// fields fall back to the service-wide defaults.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBody {
    pub max_concurrent: u32,
    pub ticket_ttl_secs: Option<u64>,
    pub avg_processing_secs: Option<u64>,
    pub max_wait_minutes: Option<u32>,
    #[serde(default)]
    pub locked: bool,
    pub lock_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockBody {
    pub locked: bool,
    pub message: Option<String>,
}

pub fn policy_from_body(form_id: &str, body: PolicyBody, config: &Config) -> FormAdmissionPolicy {
    FormAdmissionPolicy {
        form_id: form_id.to_string(),
        max_concurrent: body.max_concurrent,
        ticket_ttl: Duration::from_secs(body.ticket_ttl_secs.unwrap_or(config.ticket_ttl_secs)),
        locked: body.locked,
        lock_message: body.lock_message,
        avg_processing: Duration::from_secs(
            body.avg_processing_secs.unwrap_or(config.avg_processing_secs),
        ),
        max_wait_minutes: body.max_wait_minutes.unwrap_or(config.max_wait_minutes),
    }
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<WaitingRoomStatusDto>, AppError> {
    let client_id = client_id_from_headers(&headers)?;

    state
        .responder
        .get_status(&form_id, &client_id)
        .await
        .map(Json)
}

/// Submission-pipeline callback: the client finished, free its slot now
/// instead of waiting out the TTL. Always 204 — release is idempotent.
pub async fn release_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let client_id = client_id_from_headers(&headers)?;

    state.gate.release(&form_id, &client_id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn policy_upsert_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    Json(body): Json<PolicyBody>,
) -> StatusCode {
    let policy = policy_from_body(&form_id, body, &state.config);
    info!(%form_id, max_concurrent = policy.max_concurrent, "waiting room enabled");

    state.policies.upsert(policy).await;
    StatusCode::NO_CONTENT
}

pub async fn policy_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
) -> StatusCode {
    if state.policies.remove(&form_id).await {
        info!(%form_id, "waiting room disabled");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn lock_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    Json(body): Json<LockBody>,
) -> StatusCode {
    if state.lock.set_locked(&form_id, body.locked, body.message).await {
        info!(%form_id, locked = body.locked, "waiting room lock updated");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
