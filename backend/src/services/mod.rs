//! Business logic services for the bonded inventory service

pub mod conversion;
pub mod documents;
pub mod opname;
pub mod reporting;
pub mod transmission;

pub use documents::DocumentService;
pub use opname::OpnameService;
pub use reporting::ReportingService;
pub use transmission::{BatchOutcome, TransmissionService};
