use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use milkrun_core::model::{ContainerRecord, DeliveryRequest};
use milkrun_request::batch::{BatchError, BatchOutcome};
use milkrun_request::registry::PendingEntry;
use milkrun_request::AdmitCommand;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/requests", get(list_requests))
        .route(
            "/api/requests/{serial_no}",
            post(create_request).delete(delete_request),
        )
        .route(
            "/api/master-units/{master_unit}/requests",
            post(create_master_unit_requests),
        )
        .route("/api/parts/{part_no}/containers", get(list_part_containers))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub part_no: String,
    #[serde(default)]
    pub revision: String,
    pub quantity: Option<f64>,
    pub location: Option<String>,
    pub deliver_to: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub serial_no: String,
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct MasterUnitRequestBody {
    pub deliver_to: String,
}

#[derive(Debug, Serialize)]
pub struct TaggedContainer {
    #[serde(flatten)]
    pub container: ContainerRecord,
    pub is_requested: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/requests/{serial_no}
/// Admit a delivery request; re-admitting a pending serial returns the
/// existing record
pub async fn create_request(
    State(state): State<AppState>,
    Path(serial_no): Path<String>,
    Json(body): Json<CreateRequestBody>,
) -> Result<Json<DeliveryRequest>, ApiError> {
    let command = AdmitCommand {
        serial_no,
        part_no: body.part_no,
        revision: body.revision,
        quantity: body.quantity,
        location: body.location,
        deliver_to: body.deliver_to,
    };

    let request = state
        .gateway
        .admit(command)
        .await
        .map_err(|e| ApiError::ValidationError(e.to_string()))?;

    Ok(Json(request))
}

/// DELETE /api/requests/{serial_no}
/// Cancel a request. Deleting an absent serial succeeds, so an explicit
/// cancel can race auto-cleanup
pub async fn delete_request(
    State(state): State<AppState>,
    Path(serial_no): Path<String>,
) -> Json<DeleteResponse> {
    let removed = state.gateway.cancel(&serial_no).await.is_some();
    Json(DeleteResponse { serial_no, removed })
}

/// GET /api/requests
/// All pending requests ordered by request time, for initial load and
/// viewer catch-up
pub async fn list_requests(State(state): State<AppState>) -> Json<Vec<PendingEntry>> {
    Json(state.registry.list().await)
}

/// POST /api/master-units/{master_unit}/requests
/// Admit every container under a master unit, tolerating per-item failures
pub async fn create_master_unit_requests(
    State(state): State<AppState>,
    Path(master_unit): Path<String>,
    Json(body): Json<MasterUnitRequestBody>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let outcome = state
        .batch
        .request_all(&master_unit, &body.deliver_to)
        .await
        .map_err(|e| match e {
            BatchError::MissingWorkcenter => ApiError::ValidationError(e.to_string()),
            BatchError::Inventory { .. } => ApiError::UpstreamError(e.to_string()),
        })?;

    Ok(Json(outcome))
}

/// GET /api/parts/{part_no}/containers
/// Inventory containers for a part, oldest stock first, each tagged whether
/// it is already requested. Containers in blocked storage areas are hidden
pub async fn list_part_containers(
    State(state): State<AppState>,
    Path(part_no): Path<String>,
) -> Result<Json<Vec<TaggedContainer>>, ApiError> {
    let containers = state
        .inventory
        .containers_by_part(&part_no)
        .await
        .map_err(|e| ApiError::UpstreamError(e.to_string()))?;

    let mut containers: Vec<ContainerRecord> = containers
        .into_iter()
        .filter(|container| {
            !state
                .excluded_location_prefixes
                .iter()
                .any(|prefix| container.location.starts_with(prefix.as_str()))
        })
        .collect();
    containers.sort_by(|a, b| {
        a.add_date
            .cmp(&b.add_date)
            .then_with(|| a.serial_no.cmp(&b.serial_no))
    });

    let mut tagged = Vec::with_capacity(containers.len());
    for container in containers {
        let is_requested = state.registry.contains(&container.serial_no).await;
        tagged.push(TaggedContainer {
            container,
            is_requested,
        });
    }

    Ok(Json(tagged))
}
