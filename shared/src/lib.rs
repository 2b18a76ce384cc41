//! Shared types and models for the bonded-zone inventory service
//!
//! Domain models, ledger arithmetic and request payloads used by the backend.
//! Nothing in this crate performs I/O.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
