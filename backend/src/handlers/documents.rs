//! HTTP handlers for goods documents

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use shared::{CreateDocumentInput, InventoryDocument, TransactionType};
use uuid::Uuid;

use super::{JsonBody, PathParam};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::services::documents::{DocumentService, RecordedDocument};
use crate::AppState;

async fn record(
    state: AppState,
    current_user: CurrentUser,
    transaction_type: TransactionType,
    input: CreateDocumentInput,
) -> AppResult<(StatusCode, Json<ApiResponse<RecordedDocument>>)> {
    let service = DocumentService::new(state.store);
    let recorded = service
        .record_document(&current_user.0, transaction_type, input)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(recorded, "Document recorded and queued for INSW")),
    ))
}

/// Record an incoming goods document
pub async fn record_incoming(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(input), _): JsonBody<CreateDocumentInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<RecordedDocument>>)> {
    record(state, current_user, TransactionType::Incoming, input).await
}

/// Record an outgoing goods document
pub async fn record_outgoing(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(input), _): JsonBody<CreateDocumentInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<RecordedDocument>>)> {
    record(state, current_user, TransactionType::Outgoing, input).await
}

/// Record an opening balance (saldo awal)
pub async fn record_initial_balance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(input), _): JsonBody<CreateDocumentInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<RecordedDocument>>)> {
    record(state, current_user, TransactionType::SaldoAwal, input).await
}

/// Get a document by id
pub async fn get_document(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Path(id), _): PathParam<Uuid>,
) -> AppResult<Json<ApiResponse<InventoryDocument>>> {
    let service = DocumentService::new(state.store);
    let document = service.get_document(&current_user.0, id).await?;
    Ok(Json(ApiResponse::ok(document)))
}
