//! Goods documents: incoming, outgoing, adjustment and initial balance

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    AdjustmentDetail, AdjustmentType, ItemKey, MovementDirection, MovementKind, StockMovement,
    StockOpname, TransactionType,
};
use crate::types::display_qty;

/// Customs document (BC form) backing a goods movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct CustomsDocument {
    /// Document code, e.g. "BC23" or "BC30"
    #[validate(length(min = 1, max = 10))]
    pub code: String,
    #[validate(length(min = 1, max = 64))]
    pub number: String,
    pub date: NaiveDate,
}

/// A line of a goods document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentItem {
    pub item_code: String,
    pub item_type: String,
    pub item_name: String,
    pub uom: String,
    #[serde(serialize_with = "display_qty::serialize")]
    pub quantity: Decimal,
    pub value_amount: Option<Decimal>,
    pub currency: Option<String>,
    /// Only set on adjustment documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_type: Option<AdjustmentType>,
}

impl DocumentItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.item_code, &self.item_type)
    }
}

/// A stored goods document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryDocument {
    pub id: Uuid,
    pub company_code: String,
    pub wms_id: String,
    pub transaction_type: TransactionType,
    pub document_date: NaiveDate,
    pub customs_document: Option<CustomsDocument>,
    pub counterparty: Option<String>,
    pub items: Vec<DocumentItem>,
    pub created_at: DateTime<Utc>,
}

impl InventoryDocument {
    /// Build a document from a validated request
    pub fn from_input(
        company_code: &str,
        transaction_type: TransactionType,
        input: CreateDocumentInput,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_code: company_code.to_string(),
            wms_id: input.wms_id,
            transaction_type,
            document_date: input.document_date,
            customs_document: input.customs_document,
            counterparty: input.counterparty,
            items: input
                .items
                .into_iter()
                .map(|item| DocumentItem {
                    item_code: item.item_code,
                    item_type: item.item_type,
                    item_name: item.item_name,
                    uom: item.uom,
                    quantity: item.quantity,
                    value_amount: item.value_amount,
                    currency: item.currency,
                    adjustment_type: None,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    /// Adjustment document generated when an opname is confirmed
    pub fn adjustment_for(opname: &StockOpname, adjustments: &[AdjustmentDetail]) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_code: opname.company_code.clone(),
            wms_id: adjustment_wms_id(&opname.wms_id),
            transaction_type: TransactionType::Adjustment,
            document_date: opname.document_date,
            customs_document: None,
            counterparty: None,
            items: adjustments
                .iter()
                .map(|adj| DocumentItem {
                    item_code: adj.item_code.clone(),
                    item_type: adj.item_type.clone(),
                    item_name: adj.item_name.clone(),
                    uom: adj.uom.clone(),
                    quantity: adj.adjustment_qty,
                    value_amount: None,
                    currency: None,
                    adjustment_type: Some(adj.adjustment_type),
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    /// Ledger rows this document contributes
    pub fn movements(&self) -> Vec<StockMovement> {
        self.items
            .iter()
            .filter_map(|item| {
                let (kind, direction) = match self.transaction_type {
                    TransactionType::Incoming => (MovementKind::Incoming, MovementDirection::In),
                    TransactionType::Outgoing => (MovementKind::Outgoing, MovementDirection::Out),
                    TransactionType::SaldoAwal => (MovementKind::InitialBalance, MovementDirection::In),
                    TransactionType::Adjustment => {
                        (MovementKind::Adjustment, item.adjustment_type?.direction())
                    }
                    TransactionType::StockOpname => return None,
                };
                Some(StockMovement {
                    id: Uuid::new_v4(),
                    company_code: self.company_code.clone(),
                    item_code: item.item_code.clone(),
                    item_type: item.item_type.clone(),
                    item_name: item.item_name.clone(),
                    uom: item.uom.clone(),
                    kind,
                    direction,
                    quantity: item.quantity,
                    movement_date: self.document_date,
                    source_document_id: self.id,
                })
            })
            .collect()
    }
}

/// WMS id of the adjustment document generated for an opname
pub fn adjustment_wms_id(opname_wms_id: &str) -> String {
    format!("ADJ-{}", opname_wms_id)
}

/// Request body for recording a goods document
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDocumentInput {
    #[validate(length(min = 1, max = 64))]
    pub wms_id: String,
    pub document_date: NaiveDate,
    #[validate]
    pub customs_document: Option<CustomsDocument>,
    #[validate(length(max = 255))]
    pub counterparty: Option<String>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    #[validate]
    pub items: Vec<DocumentItemInput>,
}

/// Request line for a goods document
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DocumentItemInput {
    #[validate(length(min = 1, max = 64))]
    pub item_code: String,
    #[validate(length(min = 1, max = 32))]
    pub item_type: String,
    #[validate(length(min = 1, max = 255))]
    pub item_name: String,
    #[validate(length(min = 1, max = 16))]
    pub uom: String,
    #[validate(custom = "crate::validation::positive_quantity")]
    pub quantity: Decimal,
    #[validate(custom = "crate::validation::non_negative_amount")]
    pub value_amount: Option<Decimal>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
}

impl DocumentItemInput {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.item_code, &self.item_type)
    }
}
