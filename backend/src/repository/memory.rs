//! In-process store used by tests and local experiments

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use shared::{
    derive_adjustments, Company, InventoryDocument, NewTransmission, OpnameStatus, StockMovement,
    StockOpname, TransactionType, TransmissionFilter, TransmissionRecord, TransmissionStatus,
};
use uuid::Uuid;

use super::{
    ClaimOutcome, ClaimToken, CompanyRepository, DocumentRepository, LedgerRepository, MovementFilter,
    OpnameRepository, OpnameTransition, Store, TransmissionRepository,
};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct MemoryState {
    companies: HashMap<String, Company>,
    documents: Vec<InventoryDocument>,
    movements: Vec<StockMovement>,
    opnames: Vec<StockOpname>,
    transmissions: Vec<TransmissionRecord>,
}

impl MemoryState {
    fn queue(&mut self, new: &NewTransmission) -> TransmissionRecord {
        if let Some(existing) = self.transmissions.iter().find(|t| {
            t.company_code == new.company_code
                && t.transaction_type == new.transaction_type
                && t.internal_id == new.internal_id
        }) {
            return existing.clone();
        }

        let now = Utc::now();
        let record = TransmissionRecord {
            id: Uuid::new_v4(),
            internal_id: new.internal_id,
            external_wms_id: new.external_wms_id.clone(),
            company_code: new.company_code.clone(),
            transaction_type: new.transaction_type,
            status: TransmissionStatus::Pending,
            sent_at: None,
            response_payload: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.transmissions.push(record.clone());
        record
    }

    fn store_document(&mut self, document: &InventoryDocument) -> TransmissionRecord {
        self.documents.push(document.clone());
        self.movements.extend(document.movements());
        self.queue(&NewTransmission::new(
            &document.company_code,
            document.transaction_type,
            document.id,
            &document.wms_id,
        ))
    }

    fn opname_mut(&mut self, company_code: &str, wms_id: &str) -> Option<&mut StockOpname> {
        self.opnames
            .iter_mut()
            .find(|o| o.company_code == company_code && o.wms_id == wms_id)
    }

    fn claimed_transmission_mut(&mut self, claim: &ClaimToken) -> Option<&mut TransmissionRecord> {
        self.transmissions.iter_mut().find(|t| {
            t.id == claim.id
                && t.status == TransmissionStatus::Sent
                && t.sent_at == Some(claim.claimed_at)
        })
    }
}

/// Store that keeps all rows in memory behind a mutex
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a company profile
    pub fn with_company(self, company: Company) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.companies.insert(company.code.clone(), company);
        }
        self
    }

    fn state(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CompanyRepository for MemoryStore {
    async fn find_company(&self, code: &str) -> AppResult<Option<Company>> {
        Ok(self.state()?.companies.get(code).cloned())
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn document_exists(
        &self,
        company_code: &str,
        transaction_type: TransactionType,
        wms_id: &str,
    ) -> AppResult<bool> {
        Ok(self.state()?.documents.iter().any(|d| {
            d.company_code == company_code && d.transaction_type == transaction_type && d.wms_id == wms_id
        }))
    }

    async fn insert_document(&self, document: &InventoryDocument) -> AppResult<TransmissionRecord> {
        let mut state = self.state()?;
        let taken = state.documents.iter().any(|d| {
            d.company_code == document.company_code
                && d.transaction_type == document.transaction_type
                && d.wms_id == document.wms_id
        });
        if taken {
            return Err(AppError::DuplicateEntry("wms_id".to_string()));
        }
        Ok(state.store_document(document))
    }

    async fn find_document(&self, company_code: &str, id: Uuid) -> AppResult<Option<InventoryDocument>> {
        Ok(self
            .state()?
            .documents
            .iter()
            .find(|d| d.id == id && d.company_code == company_code)
            .cloned())
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn movements_until(
        &self,
        company_code: &str,
        up_to: NaiveDate,
        filter: &MovementFilter,
    ) -> AppResult<Vec<StockMovement>> {
        let mut movements: Vec<StockMovement> = self
            .state()?
            .movements
            .iter()
            .filter(|m| m.company_code == company_code && m.movement_date <= up_to && filter.matches(m))
            .cloned()
            .collect();
        movements.sort_by_key(|m| m.movement_date);
        Ok(movements)
    }
}

#[async_trait]
impl OpnameRepository for MemoryStore {
    async fn opname_exists(&self, company_code: &str, wms_id: &str) -> AppResult<bool> {
        Ok(self
            .state()?
            .opnames
            .iter()
            .any(|o| o.company_code == company_code && o.wms_id == wms_id))
    }

    async fn insert_opname(&self, opname: &StockOpname) -> AppResult<()> {
        let mut state = self.state()?;
        if state.opname_mut(&opname.company_code, &opname.wms_id).is_some() {
            return Err(AppError::DuplicateEntry("wms_id".to_string()));
        }
        state.opnames.push(opname.clone());
        Ok(())
    }

    async fn find_opname(&self, company_code: &str, wms_id: &str) -> AppResult<Option<StockOpname>> {
        Ok(self
            .state()?
            .opnames
            .iter()
            .find(|o| o.company_code == company_code && o.wms_id == wms_id)
            .cloned())
    }

    async fn find_opname_by_id(&self, company_code: &str, id: Uuid) -> AppResult<Option<StockOpname>> {
        Ok(self
            .state()?
            .opnames
            .iter()
            .find(|o| o.company_code == company_code && o.id == id)
            .cloned())
    }

    async fn list_opnames(
        &self,
        company_code: &str,
        status: Option<OpnameStatus>,
    ) -> AppResult<Vec<StockOpname>> {
        let mut opnames: Vec<StockOpname> = self
            .state()?
            .opnames
            .iter()
            .filter(|o| o.company_code == company_code && status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        opnames.sort_by(|a, b| b.document_date.cmp(&a.document_date).then(b.created_at.cmp(&a.created_at)));
        Ok(opnames)
    }

    async fn confirm_opname(&self, company_code: &str, wms_id: &str) -> AppResult<OpnameTransition> {
        let mut state = self.state()?;

        let opname = match state.opname_mut(company_code, wms_id) {
            None => return Ok(OpnameTransition::NotFound),
            Some(opname) if !opname.status.can_transition_to(OpnameStatus::Confirmed) => {
                return Ok(OpnameTransition::Rejected(opname.status))
            }
            Some(opname) => {
                opname.status = OpnameStatus::Confirmed;
                opname.confirmed_at = Some(Utc::now());
                opname.clone()
            }
        };

        state.queue(&NewTransmission::new(
            company_code,
            TransactionType::StockOpname,
            opname.id,
            &opname.wms_id,
        ));

        let adjustments = derive_adjustments(&opname.items);
        let adjustment_document = if adjustments.is_empty() {
            None
        } else {
            let document = InventoryDocument::adjustment_for(&opname, &adjustments);
            state.store_document(&document);
            Some(document)
        };

        Ok(OpnameTransition::Applied {
            opname,
            adjustments,
            adjustment_document,
        })
    }

    async fn cancel_opname(&self, company_code: &str, wms_id: &str) -> AppResult<OpnameTransition> {
        let mut state = self.state()?;

        match state.opname_mut(company_code, wms_id) {
            None => Ok(OpnameTransition::NotFound),
            Some(opname) if !opname.status.can_transition_to(OpnameStatus::Cancelled) => {
                Ok(OpnameTransition::Rejected(opname.status))
            }
            Some(opname) => {
                opname.status = OpnameStatus::Cancelled;
                opname.cancelled_at = Some(Utc::now());
                Ok(OpnameTransition::Applied {
                    opname: opname.clone(),
                    adjustments: Vec::new(),
                    adjustment_document: None,
                })
            }
        }
    }
}

#[async_trait]
impl TransmissionRepository for MemoryStore {
    async fn claim_transmission(
        &self,
        company_code: &str,
        id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome> {
        let mut state = self.state()?;
        let Some(record) = state
            .transmissions
            .iter_mut()
            .find(|t| t.id == id && t.company_code == company_code)
        else {
            return Ok(ClaimOutcome::NotFound);
        };

        let stale_claim = record.status == TransmissionStatus::Sent
            && record.sent_at.map_or(true, |sent| sent < stale_before);
        if !(record.status.is_claimable() || stale_claim) {
            return Ok(ClaimOutcome::Unavailable(record.clone()));
        }

        // Every claim needs a distinct sent_at to act as its token
        let now = Utc::now();
        let claimed_at = match record.sent_at {
            Some(previous) if previous >= now => previous + Duration::microseconds(1),
            _ => now,
        };
        record.status = TransmissionStatus::Sent;
        record.sent_at = Some(claimed_at);
        record.updated_at = now;
        Ok(ClaimOutcome::Claimed {
            record: record.clone(),
            token: ClaimToken { id, claimed_at },
        })
    }

    async fn mark_transmission_success(
        &self,
        claim: &ClaimToken,
        response: &serde_json::Value,
    ) -> AppResult<Option<TransmissionRecord>> {
        let mut state = self.state()?;
        Ok(state.claimed_transmission_mut(claim).map(|record| {
            record.status = TransmissionStatus::Success;
            record.response_payload = Some(response.clone());
            record.error_message = None;
            record.retry_count = 0;
            record.updated_at = Utc::now();
            record.clone()
        }))
    }

    async fn mark_transmission_failed(
        &self,
        claim: &ClaimToken,
        error: &str,
    ) -> AppResult<Option<TransmissionRecord>> {
        let mut state = self.state()?;
        Ok(state.claimed_transmission_mut(claim).map(|record| {
            record.status = TransmissionStatus::Failed;
            record.error_message = Some(error.to_string());
            record.retry_count += 1;
            record.updated_at = Utc::now();
            record.clone()
        }))
    }

    async fn find_transmission(&self, company_code: &str, id: Uuid) -> AppResult<Option<TransmissionRecord>> {
        Ok(self
            .state()?
            .transmissions
            .iter()
            .find(|t| t.id == id && t.company_code == company_code)
            .cloned())
    }

    async fn list_transmissions(
        &self,
        company_code: &str,
        filter: &TransmissionFilter,
    ) -> AppResult<Vec<TransmissionRecord>> {
        let limit = filter.effective_limit() as usize;
        Ok(self
            .state()?
            .transmissions
            .iter()
            .rev()
            .filter(|t| {
                t.company_code == company_code
                    && filter.transaction_type.map_or(true, |tt| t.transaction_type == tt)
                    && filter.status.map_or(true, |s| t.status == s)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn retryable_transmission_ids(
        &self,
        company_code: &str,
        transaction_type: Option<TransactionType>,
        limit: i64,
    ) -> AppResult<Vec<Uuid>> {
        Ok(self
            .state()?
            .transmissions
            .iter()
            .filter(|t| {
                t.company_code == company_code
                    && t.status.is_claimable()
                    && transaction_type.map_or(true, |tt| t.transaction_type == tt)
            })
            .take(limit.max(0) as usize)
            .map(|t| t.id)
            .collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        self.state().map(|_| ())
    }
}
