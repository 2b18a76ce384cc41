//! Domain models for the bonded-zone inventory service

mod company;
mod document;
mod ledger;
mod opname;
mod transmission;

pub use company::*;
pub use document::*;
pub use ledger::*;
pub use opname::*;
pub use transmission::*;
