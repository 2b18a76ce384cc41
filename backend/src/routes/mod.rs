//! Route definitions for the bonded inventory service

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - goods documents
        .nest("/documents", document_routes(state.clone()))
        // Protected routes - stock opname
        .nest("/opnames", opname_routes(state.clone()))
        // Protected routes - INSW transmission
        .nest("/transmissions", transmission_routes(state.clone()))
        .nest("/insw", insw_routes(state.clone()))
        // Protected routes - reports
        .nest("/reports", report_routes(state))
}

/// Goods document routes (protected)
fn document_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/incoming", post(handlers::record_incoming))
        .route("/outgoing", post(handlers::record_outgoing))
        .route("/initial-balance", post(handlers::record_initial_balance))
        .route("/:id", get(handlers::get_document))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Stock opname routes (protected)
fn opname_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_opnames).post(handlers::create_opname))
        .route("/:wms_id", get(handlers::get_opname))
        .route("/:wms_id/confirm", post(handlers::confirm_opname))
        .route("/:wms_id/cancel", post(handlers::cancel_opname))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Transmission routes (protected)
fn transmission_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_transmissions))
        .route("/batch", post(handlers::transmit_batch))
        .route("/pending", post(handlers::transmit_pending))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// INSW lookups (protected)
fn insw_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/documents/:number", get(handlers::get_insw_document))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Report routes (protected)
fn report_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/mutation", get(handlers::get_mutation_report))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
