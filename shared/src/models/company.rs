//! Company profile used for INSW reporting

use serde::{Deserialize, Serialize};

/// A bonded-zone company operating the warehouse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Company {
    pub code: String,
    pub name: String,
    /// Tax id, required on every INSW payload
    pub npwp: Option<String>,
    /// PPKEK registration number
    pub ppkek_number: Option<String>,
}
