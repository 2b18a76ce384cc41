//! Persistence seams
//!
//! Services talk to storage only through these traits. [`PgStore`] is the
//! production implementation; [`MemoryStore`] keeps everything in process and
//! backs the test suite.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    AdjustmentDetail, Company, InventoryDocument, ItemKey, OpnameStatus,
    StockMovement, StockOpname, TransactionType, TransmissionFilter, TransmissionRecord,
};
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which ledger rows to load
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub item_type: Option<String>,
    /// Restrict to these items; empty means every item
    pub keys: Vec<ItemKey>,
}

impl MovementFilter {
    pub fn for_keys(keys: Vec<ItemKey>) -> Self {
        Self {
            item_type: None,
            keys,
        }
    }

    pub fn matches(&self, movement: &StockMovement) -> bool {
        if let Some(item_type) = &self.item_type {
            if &movement.item_type != item_type {
                return false;
            }
        }
        self.keys.is_empty()
            || self
                .keys
                .iter()
                .any(|k| k.item_code == movement.item_code && k.item_type == movement.item_type)
    }
}

/// Result of a compare-and-swap on an opname's status
#[derive(Debug, Clone)]
pub enum OpnameTransition {
    /// The opname was ACTIVE and now has the requested status
    Applied {
        opname: StockOpname,
        adjustments: Vec<AdjustmentDetail>,
        adjustment_document: Option<InventoryDocument>,
    },
    /// The opname exists but was not ACTIVE
    Rejected(OpnameStatus),
    NotFound,
}

/// One batch's hold on a transmission record. `claimed_at` is the `sent_at`
/// written by the claim; a later takeover writes a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimToken {
    pub id: Uuid,
    pub claimed_at: DateTime<Utc>,
}

/// Result of trying to claim a transmission record for sending
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The record is now SENT and owned by the caller
    Claimed {
        record: TransmissionRecord,
        token: ClaimToken,
    },
    /// The record is SUCCESS, or SENT by another batch whose claim is still fresh
    Unavailable(TransmissionRecord),
    NotFound,
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn find_company(&self, code: &str) -> AppResult<Option<Company>>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn document_exists(
        &self,
        company_code: &str,
        transaction_type: TransactionType,
        wms_id: &str,
    ) -> AppResult<bool>;

    /// Store the document, its ledger movements and a PENDING transmission
    /// record in one transaction
    async fn insert_document(&self, document: &InventoryDocument) -> AppResult<TransmissionRecord>;

    async fn find_document(&self, company_code: &str, id: Uuid) -> AppResult<Option<InventoryDocument>>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Movements dated on or before `up_to`, oldest first
    async fn movements_until(
        &self,
        company_code: &str,
        up_to: NaiveDate,
        filter: &MovementFilter,
    ) -> AppResult<Vec<StockMovement>>;
}

#[async_trait]
pub trait OpnameRepository: Send + Sync {
    async fn opname_exists(&self, company_code: &str, wms_id: &str) -> AppResult<bool>;

    /// Fails with `DuplicateEntry` when the wms id is already taken
    async fn insert_opname(&self, opname: &StockOpname) -> AppResult<()>;

    async fn find_opname(&self, company_code: &str, wms_id: &str) -> AppResult<Option<StockOpname>>;

    async fn find_opname_by_id(&self, company_code: &str, id: Uuid) -> AppResult<Option<StockOpname>>;

    async fn list_opnames(
        &self,
        company_code: &str,
        status: Option<OpnameStatus>,
    ) -> AppResult<Vec<StockOpname>>;

    /// ACTIVE -> CONFIRMED. In the same transaction: stores the adjustment
    /// document and its movements, and queues the opname and the adjustment
    /// for transmission.
    async fn confirm_opname(&self, company_code: &str, wms_id: &str) -> AppResult<OpnameTransition>;

    /// ACTIVE -> CANCELLED, no side effects
    async fn cancel_opname(&self, company_code: &str, wms_id: &str) -> AppResult<OpnameTransition>;
}

#[async_trait]
pub trait TransmissionRepository: Send + Sync {
    /// Move a PENDING or FAILED record (or a SENT one claimed before
    /// `stale_before`) to SENT
    async fn claim_transmission(
        &self,
        company_code: &str,
        id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome>;

    /// SENT -> SUCCESS, stores the response and resets the retry counter.
    /// `None` when the claim was taken over and the record left untouched.
    async fn mark_transmission_success(
        &self,
        claim: &ClaimToken,
        response: &serde_json::Value,
    ) -> AppResult<Option<TransmissionRecord>>;

    /// SENT -> FAILED, stores the error and increments the retry counter.
    /// `None` when the claim was taken over and the record left untouched.
    async fn mark_transmission_failed(
        &self,
        claim: &ClaimToken,
        error: &str,
    ) -> AppResult<Option<TransmissionRecord>>;

    async fn find_transmission(&self, company_code: &str, id: Uuid) -> AppResult<Option<TransmissionRecord>>;

    /// Newest first
    async fn list_transmissions(
        &self,
        company_code: &str,
        filter: &TransmissionFilter,
    ) -> AppResult<Vec<TransmissionRecord>>;

    /// PENDING and FAILED record ids, oldest first
    async fn retryable_transmission_ids(
        &self,
        company_code: &str,
        transaction_type: Option<TransactionType>,
        limit: i64,
    ) -> AppResult<Vec<Uuid>>;
}

/// Everything the services need from storage
#[async_trait]
pub trait Store:
    CompanyRepository + DocumentRepository + LedgerRepository + OpnameRepository + TransmissionRepository
{
    /// Cheap connectivity check for the health endpoint
    async fn ping(&self) -> AppResult<()>;
}
