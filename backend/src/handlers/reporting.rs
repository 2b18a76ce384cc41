//! Reporting handlers

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::NaiveDate;
use serde::Deserialize;

use super::QueryParams;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::services::ReportingService;
use crate::AppState;

#[derive(Deserialize)]
pub struct MutationQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub item_type: Option<String>,
    pub format: Option<String>, // "json" or "csv"
}

/// Stock mutation report
pub async fn get_mutation_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Query(query), _): QueryParams<MutationQuery>,
) -> AppResult<impl IntoResponse> {
    let service = ReportingService::new(state.store);
    let rows = service
        .mutation_report(&current_user.0, query.from, query.to, query.item_type)
        .await?;

    if query.format.as_deref() == Some("csv") {
        let csv = ReportingService::export_to_csv(&rows)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"mutation_report.csv\""),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(ApiResponse::ok(rows)).into_response())
    }
}
