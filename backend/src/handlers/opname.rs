//! HTTP handlers for stock opname

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use shared::{CreateOpnameInput, OpnameStatus, StockOpname};

use super::{JsonBody, PathParam, QueryParams};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::services::opname::{ConfirmedOpname, OpnameService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OpnameListQuery {
    pub status: Option<OpnameStatus>,
}

/// Create an opname from physical counts
pub async fn create_opname(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(input), _): JsonBody<CreateOpnameInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<StockOpname>>)> {
    let service = OpnameService::new(state.store);
    let opname = service.create_opname(&current_user.0, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(opname, "Stock opname created")),
    ))
}

/// List opnames, optionally by status
pub async fn list_opnames(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Query(query), _): QueryParams<OpnameListQuery>,
) -> AppResult<Json<ApiResponse<Vec<StockOpname>>>> {
    let service = OpnameService::new(state.store);
    let opnames = service.list_opnames(&current_user.0, query.status).await?;
    Ok(Json(ApiResponse::ok(opnames)))
}

/// Get an opname by its WMS id
pub async fn get_opname(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Path(wms_id), _): PathParam<String>,
) -> AppResult<Json<ApiResponse<StockOpname>>> {
    let service = OpnameService::new(state.store);
    let opname = service.get_opname(&current_user.0, &wms_id).await?;
    Ok(Json(ApiResponse::ok(opname)))
}

/// Confirm an ACTIVE opname
pub async fn confirm_opname(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Path(wms_id), _): PathParam<String>,
) -> AppResult<Json<ApiResponse<ConfirmedOpname>>> {
    let service = OpnameService::new(state.store);
    let confirmed = service.confirm_opname(&current_user.0, &wms_id).await?;
    let message = format!(
        "Stock opname confirmed with {} adjustment(s)",
        confirmed.adjustments.len()
    );
    Ok(Json(ApiResponse::with_message(confirmed, message)))
}

/// Cancel an ACTIVE opname
pub async fn cancel_opname(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Path(wms_id), _): PathParam<String>,
) -> AppResult<Json<ApiResponse<StockOpname>>> {
    let service = OpnameService::new(state.store);
    let opname = service.cancel_opname(&current_user.0, &wms_id).await?;
    Ok(Json(ApiResponse::with_message(opname, "Stock opname cancelled")))
}
