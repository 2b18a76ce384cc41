//! HTTP handlers

use axum::{
    extract::{Path, Query},
    Json,
};
use axum_extra::extract::WithRejection;

use crate::error::AppError;

pub mod documents;
pub mod health;
pub mod opname;
pub mod reporting;
pub mod transmission;

pub use documents::{get_document, record_incoming, record_initial_balance, record_outgoing};
pub use health::health_check;
pub use opname::{cancel_opname, confirm_opname, create_opname, get_opname, list_opnames};
pub use reporting::get_mutation_report;
pub use transmission::{get_insw_document, list_transmissions, transmit_batch, transmit_pending};

/// Extractors whose rejections render as the failure envelope
pub type JsonBody<T> = WithRejection<Json<T>, AppError>;
pub type PathParam<T> = WithRejection<Path<T>, AppError>;
pub type QueryParams<T> = WithRejection<Query<T>, AppError>;
