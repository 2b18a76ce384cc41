//! Batch transmission of queued records to INSW
//!
//! Each record is claimed with a conditional update before anything is sent,
//! so two overlapping batches can never both report the same record. One
//! record failing never aborts the rest of the batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use shared::{
    BatchSummary, Company, TransactionType, TransmissionFilter, TransmissionRecord, TransmissionResult,
    TransmissionStatus,
};
use uuid::Uuid;

use crate::config::TransmissionConfig;
use crate::error::{AppError, AppResult};
use crate::external::insw::{InswGateway, InswPayload};
use crate::middleware::auth::{permissions, AuthContext};
use crate::repository::{ClaimOutcome, ClaimToken, Store};
use crate::services::conversion::{self, ConversionError};

/// Transmission service
#[derive(Clone)]
pub struct TransmissionService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn InswGateway>,
    config: TransmissionConfig,
}

/// Summary plus one result per distinct record id, in request order
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub summary: BatchSummary,
    pub results: Vec<TransmissionResult>,
}

impl BatchOutcome {
    fn from_results(results: Vec<TransmissionResult>) -> Self {
        Self {
            summary: BatchSummary::from_results(&results),
            results,
        }
    }
}

impl TransmissionService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn InswGateway>, config: TransmissionConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Transmit the given records of the caller's company
    pub async fn transmit_batch(&self, ctx: &AuthContext, record_ids: Vec<Uuid>) -> AppResult<BatchOutcome> {
        ctx.require(permissions::TRANSMISSION_SEND)?;

        if record_ids.is_empty() {
            return Err(AppError::validation("record_ids", "At least one record id is required"));
        }

        let mut seen = HashSet::new();
        let record_ids: Vec<Uuid> = record_ids.into_iter().filter(|id| seen.insert(*id)).collect();

        if record_ids.len() > self.config.max_batch_size {
            return Err(AppError::validation(
                "record_ids",
                format!("A batch may hold at most {} records", self.config.max_batch_size),
            ));
        }

        Ok(self.run_batch(&ctx.company_code, &record_ids).await)
    }

    /// Transmit PENDING and FAILED records, oldest first
    pub async fn transmit_pending(
        &self,
        ctx: &AuthContext,
        transaction_type: Option<TransactionType>,
        limit: Option<usize>,
    ) -> AppResult<BatchOutcome> {
        ctx.require(permissions::TRANSMISSION_SEND)?;

        let limit = limit
            .unwrap_or(self.config.max_batch_size)
            .clamp(1, self.config.max_batch_size);

        let record_ids = self
            .store
            .retryable_transmission_ids(&ctx.company_code, transaction_type, limit as i64)
            .await?;

        if record_ids.is_empty() {
            tracing::debug!(company = %ctx.company_code, "No pending transmissions");
        }

        Ok(self.run_batch(&ctx.company_code, &record_ids).await)
    }

    /// Transmission log, newest first
    pub async fn list(&self, ctx: &AuthContext, filter: &TransmissionFilter) -> AppResult<Vec<TransmissionRecord>> {
        ctx.require(permissions::TRANSMISSION_READ)?;
        self.store.list_transmissions(&ctx.company_code, filter).await
    }

    /// Look up a customs document on INSW
    pub async fn document_detail(&self, ctx: &AuthContext, number: &str) -> AppResult<Value> {
        ctx.require(permissions::TRANSMISSION_READ)?;

        let number = number.trim();
        if number.is_empty() {
            return Err(AppError::validation("number", "Document number is required"));
        }

        Ok(self.gateway.document_detail(number).await?)
    }

    async fn run_batch(&self, company_code: &str, record_ids: &[Uuid]) -> BatchOutcome {
        let mut companies = CompanyCache::default();
        let mut results = Vec::with_capacity(record_ids.len());

        for &id in record_ids {
            let result = match self.claim(company_code, id).await {
                Ok(Ok((record, token))) => match self.deliver(&record, &token, &mut companies).await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(record_id = %id, "Transmission aborted: {}", err);
                        self.fail_after_error(&record, &token, &err).await
                    }
                },
                Ok(Err(result)) => result,
                Err(err) => {
                    tracing::error!(record_id = %id, "Could not claim record: {}", err);
                    TransmissionResult::unknown(id, err.to_string())
                }
            };

            tracing::info!(
                record_id = %id,
                status = %result.status,
                "Transmission attempt finished: {}",
                result.message
            );
            results.push(result);
        }

        let outcome = BatchOutcome::from_results(results);
        tracing::info!(
            company = %company_code,
            total = outcome.summary.total,
            success = outcome.summary.success_count,
            failed = outcome.summary.failed_count,
            skipped = outcome.summary.skipped_count,
            "Transmission batch finished"
        );
        outcome
    }

    /// Claim a record for this batch, or the result to report when it cannot be claimed
    async fn claim(
        &self,
        company_code: &str,
        id: Uuid,
    ) -> AppResult<Result<(TransmissionRecord, ClaimToken), TransmissionResult>> {
        let stale_before = Utc::now() - Duration::seconds(self.config.stale_claim_secs);

        Ok(match self.store.claim_transmission(company_code, id, stale_before).await? {
            ClaimOutcome::Claimed { record, token } => Ok((record, token)),
            ClaimOutcome::Unavailable(record) if record.status == TransmissionStatus::Success => Err(
                TransmissionResult::for_record(&record, TransmissionStatus::Skipped, "Already transmitted"),
            ),
            ClaimOutcome::Unavailable(record) => Err(TransmissionResult::for_record(
                &record,
                TransmissionStatus::Skipped,
                "Transmission already in progress",
            )),
            ClaimOutcome::NotFound => Err(TransmissionResult::unknown(id, "Transmission record not found")),
        })
    }

    /// Convert and send a claimed record, then finalize it
    async fn deliver(
        &self,
        record: &TransmissionRecord,
        token: &ClaimToken,
        companies: &mut CompanyCache,
    ) -> AppResult<TransmissionResult> {
        let payload = match self.convert(record, companies).await? {
            Ok(payload) => payload,
            Err(err) => {
                let message = err.to_string();
                return Ok(match self.store.mark_transmission_failed(token, &message).await? {
                    Some(failed) => TransmissionResult::for_record(&failed, TransmissionStatus::Failed, message),
                    None => claim_lost(record, "Claim taken over by another batch"),
                });
            }
        };

        match self.gateway.send(payload.category(), &payload).await {
            Ok(response) => {
                Ok(match self.store.mark_transmission_success(token, &response).await? {
                    Some(done) => TransmissionResult::for_record(&done, TransmissionStatus::Success, "Transmitted to INSW"),
                    None => claim_lost(
                        record,
                        "Accepted by INSW after the claim was taken over by another batch",
                    ),
                })
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(record_id = %record.id, wms_id = %record.external_wms_id, "INSW call failed: {}", message);
                Ok(match self.store.mark_transmission_failed(token, &message).await? {
                    Some(failed) => TransmissionResult::for_record(&failed, TransmissionStatus::Failed, message),
                    None => claim_lost(record, "Claim taken over by another batch"),
                })
            }
        }
    }

    /// Outer error is a storage failure, inner error a record that cannot be reported
    async fn convert(
        &self,
        record: &TransmissionRecord,
        companies: &mut CompanyCache,
    ) -> AppResult<Result<InswPayload, ConversionError>> {
        let Some(company) = companies.get(self.store.as_ref(), &record.company_code).await? else {
            return Ok(Err(ConversionError::UnknownCompany(record.company_code.clone())));
        };

        let missing = || ConversionError::MissingSource {
            transaction_type: record.transaction_type,
            wms_id: record.external_wms_id.clone(),
        };

        if record.transaction_type.is_document() {
            let document = self.store.find_document(&record.company_code, record.internal_id).await?;
            Ok(match document {
                Some(doc) if doc.transaction_type != record.transaction_type => {
                    Err(ConversionError::TypeMismatch(doc.wms_id, record.transaction_type))
                }
                Some(doc) => conversion::document_payload(&company, &doc),
                None => Err(missing()),
            })
        } else {
            let opname = self
                .store
                .find_opname_by_id(&record.company_code, record.internal_id)
                .await?;
            Ok(match opname {
                Some(opname) => conversion::opname_payload(&company, &opname),
                None => Err(missing()),
            })
        }
    }

    /// Release a claimed record after a storage error so it can be retried
    async fn fail_after_error(
        &self,
        record: &TransmissionRecord,
        token: &ClaimToken,
        err: &AppError,
    ) -> TransmissionResult {
        let message = err.to_string();
        match self.store.mark_transmission_failed(token, &message).await {
            Ok(Some(failed)) => TransmissionResult::for_record(&failed, TransmissionStatus::Failed, message),
            Ok(None) => claim_lost(record, "Claim taken over by another batch"),
            Err(_) => TransmissionResult::for_record(record, TransmissionStatus::Failed, message),
        }
    }
}

/// The record now belongs to a newer claim; leave its state to that batch
fn claim_lost(record: &TransmissionRecord, message: &str) -> TransmissionResult {
    tracing::warn!(record_id = %record.id, wms_id = %record.external_wms_id, "{}", message);
    TransmissionResult::for_record(record, TransmissionStatus::Skipped, message)
}

/// Company profiles loaded once per batch
#[derive(Default)]
struct CompanyCache {
    loaded: HashMap<String, Option<Company>>,
}

impl CompanyCache {
    async fn get(&mut self, store: &dyn Store, code: &str) -> AppResult<Option<Company>> {
        if let Some(company) = self.loaded.get(code) {
            return Ok(company.clone());
        }
        let company = store.find_company(code).await?;
        self.loaded.insert(code.to_string(), company.clone());
        Ok(company)
    }
}
