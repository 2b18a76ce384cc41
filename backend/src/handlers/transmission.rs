//! HTTP handlers for INSW transmission

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{BatchStatus, TransactionType, TransmissionFilter, TransmissionRecord, TransmissionStatus};
use uuid::Uuid;

use super::{JsonBody, PathParam, QueryParams};
use crate::error::{AppResult, FieldError};
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::services::{BatchOutcome, TransmissionService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TransmitBatchRequest {
    pub record_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransmitPendingRequest {
    pub transaction_type: Option<TransactionType>,
    pub limit: Option<usize>,
}

/// Batch envelope: `status` is the batch status and `errors` lists failed records
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub status: BatchStatus,
    pub message: String,
    pub data: BatchOutcome,
    pub errors: Vec<FieldError>,
}

impl From<BatchOutcome> for BatchResponse {
    fn from(outcome: BatchOutcome) -> Self {
        let summary = outcome.summary;
        let message = format!(
            "{} of {} record(s) transmitted, {} failed, {} skipped",
            summary.success_count, summary.total, summary.failed_count, summary.skipped_count
        );
        let errors = outcome
            .results
            .iter()
            .filter(|r| r.status == TransmissionStatus::Failed)
            .map(|r| FieldError::new(r.record_id.to_string(), "TRANSMISSION_FAILED", r.message.clone()))
            .collect();

        Self {
            status: summary.status,
            message,
            data: outcome,
            errors,
        }
    }
}

fn service(state: &AppState) -> TransmissionService {
    TransmissionService::new(
        state.store.clone(),
        state.insw.clone(),
        state.config.transmission.clone(),
    )
}

/// Transmit specific records
pub async fn transmit_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(request), _): JsonBody<TransmitBatchRequest>,
) -> AppResult<Json<BatchResponse>> {
    let outcome = service(&state)
        .transmit_batch(&current_user.0, request.record_ids)
        .await?;
    Ok(Json(outcome.into()))
}

/// Transmit every PENDING or FAILED record, up to a limit
pub async fn transmit_pending(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(request), _): JsonBody<TransmitPendingRequest>,
) -> AppResult<Json<BatchResponse>> {
    let outcome = service(&state)
        .transmit_pending(&current_user.0, request.transaction_type, request.limit)
        .await?;
    Ok(Json(outcome.into()))
}

/// Transmission log
pub async fn list_transmissions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Query(filter), _): QueryParams<TransmissionFilter>,
) -> AppResult<Json<ApiResponse<Vec<TransmissionRecord>>>> {
    let records = service(&state).list(&current_user.0, &filter).await?;
    Ok(Json(ApiResponse::ok(records)))
}

/// Customs document detail from INSW
pub async fn get_insw_document(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Path(number), _): PathParam<String>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let detail = service(&state).document_detail(&current_user.0, &number).await?;
    Ok(Json(ApiResponse::ok(detail)))
}
