//! Stock opname (physical count) models and reconciliation

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ItemKey, LedgerPosition, MovementDirection};
use crate::types::{display_qty, ParseEnumError};

/// Lifecycle of an opname. Both CONFIRMED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpnameStatus {
    Active,
    Confirmed,
    Cancelled,
}

impl OpnameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpnameStatus::Active => "ACTIVE",
            OpnameStatus::Confirmed => "CONFIRMED",
            OpnameStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn can_transition_to(&self, next: OpnameStatus) -> bool {
        matches!(
            (self, next),
            (OpnameStatus::Active, OpnameStatus::Confirmed)
                | (OpnameStatus::Active, OpnameStatus::Cancelled)
        )
    }
}

impl std::str::FromStr for OpnameStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(OpnameStatus::Active),
            "CONFIRMED" => Ok(OpnameStatus::Confirmed),
            "CANCELLED" => Ok(OpnameStatus::Cancelled),
            other => Err(ParseEnumError::new("opname status", other)),
        }
    }
}

impl std::fmt::Display for OpnameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign of a count variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Gain,
    Loss,
}

impl AdjustmentType {
    /// GAIN for a positive variance, LOSS for a negative one, none for zero.
    /// Uses the exact value; a variance of 0.001 is still a gain.
    pub fn from_variance(variance: Decimal) -> Option<Self> {
        if variance > Decimal::ZERO {
            Some(AdjustmentType::Gain)
        } else if variance < Decimal::ZERO {
            Some(AdjustmentType::Loss)
        } else {
            None
        }
    }

    pub fn direction(&self) -> MovementDirection {
        match self {
            AdjustmentType::Gain => MovementDirection::In,
            AdjustmentType::Loss => MovementDirection::Out,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Gain => "GAIN",
            AdjustmentType::Loss => "LOSS",
        }
    }
}

impl std::str::FromStr for AdjustmentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GAIN" => Ok(AdjustmentType::Gain),
            "LOSS" => Ok(AdjustmentType::Loss),
            other => Err(ParseEnumError::new("adjustment type", other)),
        }
    }
}

/// A counted item with the ledger snapshot it was reconciled against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockOpnameItem {
    pub item_code: String,
    pub item_type: String,
    pub item_name: String,
    pub uom: String,
    #[serde(serialize_with = "display_qty::serialize")]
    pub physical_qty: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub beginning_qty: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub incoming_qty_on_date: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub outgoing_qty_on_date: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub system_qty: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub variance_qty: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub adjustment_qty_signed: Decimal,
    pub adjustment_type: Option<AdjustmentType>,
}

impl StockOpnameItem {
    /// Reconcile a physical count against the item's ledger position
    pub fn reconcile(count: &OpnameCountInput, position: &LedgerPosition) -> Self {
        let system_qty = position.system_qty();
        let variance_qty = count.physical_qty - system_qty;

        Self {
            item_code: count.item_code.clone(),
            item_type: count.item_type.clone(),
            item_name: count.item_name.clone(),
            uom: count.uom.clone(),
            physical_qty: count.physical_qty,
            beginning_qty: position.beginning_qty,
            incoming_qty_on_date: position.incoming_qty_on_date,
            outgoing_qty_on_date: position.outgoing_qty_on_date,
            system_qty,
            variance_qty,
            adjustment_qty_signed: variance_qty,
            adjustment_type: AdjustmentType::from_variance(variance_qty),
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.item_code, &self.item_type)
    }
}

/// An opname header with its counted items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockOpname {
    pub id: Uuid,
    pub company_code: String,
    pub wms_id: String,
    pub document_date: NaiveDate,
    pub status: OpnameStatus,
    pub notes: Option<String>,
    pub items: Vec<StockOpnameItem>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Adjustment emitted for one item when an opname is confirmed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdjustmentDetail {
    pub item_code: String,
    pub item_type: String,
    pub item_name: String,
    pub adjustment_type: AdjustmentType,
    /// Absolute variance
    #[serde(serialize_with = "display_qty::serialize")]
    pub adjustment_qty: Decimal,
    pub uom: String,
}

/// One adjustment per item with a non-zero variance, in item order
pub fn derive_adjustments(items: &[StockOpnameItem]) -> Vec<AdjustmentDetail> {
    items
        .iter()
        .filter_map(|item| {
            let adjustment_type = AdjustmentType::from_variance(item.variance_qty)?;
            Some(AdjustmentDetail {
                item_code: item.item_code.clone(),
                item_type: item.item_type.clone(),
                item_name: item.item_name.clone(),
                adjustment_type,
                adjustment_qty: item.variance_qty.abs(),
                uom: item.uom.clone(),
            })
        })
        .collect()
}

/// Request body for creating an opname
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOpnameInput {
    #[validate(length(min = 1, max = 64))]
    pub wms_id: String,
    pub document_date: NaiveDate,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    #[validate]
    pub items: Vec<OpnameCountInput>,
}

/// One physical count line
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OpnameCountInput {
    #[validate(length(min = 1, max = 64))]
    pub item_code: String,
    #[validate(length(min = 1, max = 32))]
    pub item_type: String,
    #[validate(length(min = 1, max = 255))]
    pub item_name: String,
    #[validate(length(min = 1, max = 16))]
    pub uom: String,
    #[validate(custom = "crate::validation::non_negative_quantity")]
    pub physical_qty: Decimal,
}

impl OpnameCountInput {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.item_code, &self.item_type)
    }
}
