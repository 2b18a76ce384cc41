//! External API integrations

pub mod insw;

pub use insw::{GatewayError, InswCategory, InswClient, InswGateway, InswPayload};
