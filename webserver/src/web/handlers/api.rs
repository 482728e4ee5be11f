//! REST API handlers
//!
//! Tenant-facing endpoints for managing sequence definitions and lead
//! enrollments. Handlers are generic over the store traits so tests run
//! them against the in-memory implementations directly.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

use sequencer::traits::{EnrollmentStore, SequenceStore};
use sequencer::SequencerError;
use shared::{
    EnrollmentId, EnrollmentStatus, LeadEnrollment, LeadId, LeadProfile, SequenceDefinition,
    SequenceId, TenantId, Touch,
};

use crate::state::AppState;

/// CAS retries before a cancel request gives up against a busy enrollment
const CANCEL_CAS_RETRIES: usize = 3;

#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertSequenceRequest {
    /// Omitted on create; a fresh id is assigned
    pub id: Option<String>,
    pub tenant_id: String,
    pub name: String,
    pub touches: Vec<Touch>,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

/// Create or replace a sequence definition - POST /api/sequences
pub async fn upsert_sequence<S, L>(
    State(state): State<AppState<S, L>>,
    Json(request): Json<UpsertSequenceRequest>,
) -> Result<Json<Value>, StatusCode>
where
    S: SequenceStore + 'static,
    L: EnrollmentStore + 'static,
{
    let tenant_id =
        TenantId::from_string(&request.tenant_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let id = match &request.id {
        Some(raw) => SequenceId::from_string(raw).map_err(|_| StatusCode::BAD_REQUEST)?,
        None => SequenceId::new(),
    };

    let definition = SequenceDefinition {
        id: id.clone(),
        tenant_id,
        name: request.name,
        touches: request.touches,
        is_active: request.is_active,
    };

    match state.sequences.upsert_definition(definition).await {
        Ok(()) => {
            info!(sequence_id = %id, "Sequence definition stored");
            Ok(Json(json!({
                "status": "ok",
                "data": { "sequence_id": id.to_string() }
            })))
        }
        Err(SequencerError::SharedError(err)) => {
            warn!(sequence_id = %id, error = %err, "Rejected sequence definition");
            Err(StatusCode::BAD_REQUEST)
        }
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSequencesQuery {
    pub tenant_id: String,
}

/// List a tenant's active sequences - GET /api/sequences
pub async fn list_sequences<S, L>(
    State(state): State<AppState<S, L>>,
    Query(query): Query<ListSequencesQuery>,
) -> Result<Json<Value>, StatusCode>
where
    S: SequenceStore + 'static,
    L: EnrollmentStore + 'static,
{
    let tenant_id = TenantId::from_string(&query.tenant_id).map_err(|_| StatusCode::BAD_REQUEST)?;

    let definitions = state
        .sequences
        .fetch_active_for_tenant(&tenant_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!({
        "status": "ok",
        "data": { "sequences": definitions }
    })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEnrollmentRequest {
    pub tenant_id: String,
    pub sequence_id: String,
    /// Omitted for anonymous leads; a fresh id is assigned
    pub lead_id: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// Enroll a lead into a sequence - POST /api/enrollments
pub async fn create_enrollment<S, L>(
    State(state): State<AppState<S, L>>,
    Json(request): Json<CreateEnrollmentRequest>,
) -> Result<Json<Value>, StatusCode>
where
    S: SequenceStore + 'static,
    L: EnrollmentStore + 'static,
{
    let tenant_id =
        TenantId::from_string(&request.tenant_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let sequence_id =
        SequenceId::from_string(&request.sequence_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let lead_id = match &request.lead_id {
        Some(raw) => LeadId::from_string(raw).map_err(|_| StatusCode::BAD_REQUEST)?,
        None => LeadId::new(),
    };

    let definition = state
        .sequences
        .fetch_definition(&sequence_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Another tenant's sequence looks like a missing one
    if definition.tenant_id != tenant_id {
        return Err(StatusCode::NOT_FOUND);
    }

    let profile = LeadProfile::new(request.fields);
    let enrollment = LeadEnrollment::enroll(lead_id, &definition, profile, Utc::now())
        .map_err(|err| {
            warn!(sequence_id = %sequence_id, error = %err, "Rejected enrollment");
            StatusCode::BAD_REQUEST
        })?;

    let response = json!({
        "status": "ok",
        "data": {
            "enrollment_id": enrollment.id.to_string(),
            "status": enrollment.status,
            "next_fire_at": enrollment.next_fire_at,
        }
    });

    match state.enrollments.insert(enrollment).await {
        Ok(()) => Ok(Json(response)),
        Err(SequencerError::EnrollmentExists { .. }) => Err(StatusCode::CONFLICT),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Fetch one enrollment with its dispatch log - GET /api/enrollments/:id
pub async fn get_enrollment<S, L>(
    State(state): State<AppState<S, L>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode>
where
    S: SequenceStore + 'static,
    L: EnrollmentStore + 'static,
{
    let enrollment_id = EnrollmentId::from_string(&id).map_err(|_| StatusCode::BAD_REQUEST)?;

    let snapshot = state
        .enrollments
        .get(&enrollment_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(json!({
        "status": "ok",
        "data": { "enrollment": snapshot.enrollment }
    })))
}

/// Cancel an enrollment - POST /api/enrollments/:id/cancel
///
/// Races against the tick loop's claim-and-dispatch writes, so the status
/// flip goes through the same compare-and-swap with a small retry budget.
/// Cancelling an already terminal enrollment is a no-op.
pub async fn cancel_enrollment<S, L>(
    State(state): State<AppState<S, L>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode>
where
    S: SequenceStore + 'static,
    L: EnrollmentStore + 'static,
{
    let enrollment_id = EnrollmentId::from_string(&id).map_err(|_| StatusCode::BAD_REQUEST)?;

    for _ in 0..CANCEL_CAS_RETRIES {
        let snapshot = state
            .enrollments
            .get(&enrollment_id)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;

        if snapshot.enrollment.status.is_terminal() {
            return Ok(Json(json!({
                "status": "ok",
                "data": {
                    "enrollment_id": enrollment_id.to_string(),
                    "status": snapshot.enrollment.status,
                    "already_terminal": true,
                }
            })));
        }

        let mut enrollment = snapshot.enrollment;
        enrollment.status = EnrollmentStatus::Cancelled;
        enrollment.next_fire_at = None;

        match state.enrollments.update(enrollment, snapshot.version).await {
            Ok(()) => {
                info!(enrollment_id = %enrollment_id, "Enrollment cancelled");
                return Ok(Json(json!({
                    "status": "ok",
                    "data": {
                        "enrollment_id": enrollment_id.to_string(),
                        "status": EnrollmentStatus::Cancelled,
                        "already_terminal": false,
                    }
                })));
            }
            Err(err) if err.is_conflict() => continue,
            Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    warn!(enrollment_id = %enrollment_id, "Cancel lost the version race repeatedly");
    Err(StatusCode::CONFLICT)
}

/// Get system status - GET /api/status
pub async fn get_status<S, L>(
    State(state): State<AppState<S, L>>,
) -> Result<Json<Value>, StatusCode>
where
    S: SequenceStore + 'static,
    L: EnrollmentStore + 'static,
{
    let response = json!({
        "status": "ok",
        "data": {
            "server_status": "running",
            "uptime_seconds": state.uptime_seconds(),
            "server_time": Utc::now().timestamp(),
            "version": env!("CARGO_PKG_VERSION")
        }
    });

    Ok(Json(response))
}

/// Liveness check - GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
