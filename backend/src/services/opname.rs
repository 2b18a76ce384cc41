//! Stock opname (physical count) reconciliation

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use shared::{
    find_duplicate_key, position_as_of, AdjustmentDetail, CreateOpnameInput, ItemKey, OpnameStatus,
    StockOpname, StockOpnameItem,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{permissions, AuthContext};
use crate::repository::{MovementFilter, OpnameTransition, Store};

/// Opname service
#[derive(Clone)]
pub struct OpnameService {
    store: Arc<dyn Store>,
}

/// Result of confirming an opname
#[derive(Debug, Serialize)]
pub struct ConfirmedOpname {
    pub opname: StockOpname,
    pub adjustments: Vec<AdjustmentDetail>,
    /// Generated adjustment document, absent when nothing differed
    pub adjustment_document_id: Option<Uuid>,
    pub adjustment_wms_id: Option<String>,
}

impl OpnameService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create an ACTIVE opname, snapshotting each item's ledger position on the count date
    pub async fn create_opname(&self, ctx: &AuthContext, input: CreateOpnameInput) -> AppResult<StockOpname> {
        ctx.require(permissions::OPNAME_WRITE)?;
        input.validate()?;

        let keys: Vec<ItemKey> = input.items.iter().map(|i| i.key()).collect();
        if let Some(key) = find_duplicate_key(keys.iter().cloned()) {
            return Err(AppError::validation("items", format!("Item {} is counted more than once", key)));
        }

        if self.store.opname_exists(&ctx.company_code, &input.wms_id).await? {
            return Err(AppError::DuplicateEntry("wms_id".to_string()));
        }

        let movements = self
            .store
            .movements_until(&ctx.company_code, input.document_date, &MovementFilter::for_keys(keys))
            .await?;

        let items: Vec<StockOpnameItem> = input
            .items
            .iter()
            .map(|count| {
                let position = position_as_of(&movements, &count.key(), input.document_date);
                StockOpnameItem::reconcile(count, &position)
            })
            .collect();

        let opname = StockOpname {
            id: Uuid::new_v4(),
            company_code: ctx.company_code.clone(),
            wms_id: input.wms_id,
            document_date: input.document_date,
            status: OpnameStatus::Active,
            notes: input.notes,
            items,
            created_at: Utc::now(),
            confirmed_at: None,
            cancelled_at: None,
        };

        self.store.insert_opname(&opname).await?;

        tracing::info!(
            company = %opname.company_code,
            wms_id = %opname.wms_id,
            items = opname.items.len(),
            "Created stock opname"
        );

        Ok(opname)
    }

    /// ACTIVE -> CONFIRMED, emitting one adjustment per item with a variance
    pub async fn confirm_opname(&self, ctx: &AuthContext, wms_id: &str) -> AppResult<ConfirmedOpname> {
        ctx.require(permissions::OPNAME_CONFIRM)?;

        match self.store.confirm_opname(&ctx.company_code, wms_id).await? {
            OpnameTransition::Applied {
                opname,
                adjustments,
                adjustment_document,
            } => {
                tracing::info!(
                    company = %opname.company_code,
                    wms_id = %opname.wms_id,
                    adjustments = adjustments.len(),
                    "Confirmed stock opname"
                );
                Ok(ConfirmedOpname {
                    opname,
                    adjustments,
                    adjustment_document_id: adjustment_document.as_ref().map(|d| d.id),
                    adjustment_wms_id: adjustment_document.map(|d| d.wms_id),
                })
            }
            OpnameTransition::Rejected(status) => Err(not_active("confirm", wms_id, status)),
            OpnameTransition::NotFound => Err(AppError::NotFound("Stock opname".to_string())),
        }
    }

    /// ACTIVE -> CANCELLED, no adjustments
    pub async fn cancel_opname(&self, ctx: &AuthContext, wms_id: &str) -> AppResult<StockOpname> {
        ctx.require(permissions::OPNAME_WRITE)?;

        match self.store.cancel_opname(&ctx.company_code, wms_id).await? {
            OpnameTransition::Applied { opname, .. } => {
                tracing::info!(company = %opname.company_code, wms_id = %opname.wms_id, "Cancelled stock opname");
                Ok(opname)
            }
            OpnameTransition::Rejected(status) => Err(not_active("cancel", wms_id, status)),
            OpnameTransition::NotFound => Err(AppError::NotFound("Stock opname".to_string())),
        }
    }

    pub async fn get_opname(&self, ctx: &AuthContext, wms_id: &str) -> AppResult<StockOpname> {
        ctx.require(permissions::OPNAME_WRITE)?;

        self.store
            .find_opname(&ctx.company_code, wms_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock opname".to_string()))
    }

    pub async fn list_opnames(
        &self,
        ctx: &AuthContext,
        status: Option<OpnameStatus>,
    ) -> AppResult<Vec<StockOpname>> {
        ctx.require(permissions::OPNAME_WRITE)?;
        self.store.list_opnames(&ctx.company_code, status).await
    }
}

fn not_active(action: &str, wms_id: &str, status: OpnameStatus) -> AppError {
    AppError::InvalidStateTransition(format!(
        "Cannot {} stock opname {}: status is {}, expected ACTIVE",
        action, wms_id, status
    ))
}
