//! INSW transmission ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ParseEnumError;

/// Kind of source transaction reported to INSW
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Incoming,
    Outgoing,
    Adjustment,
    StockOpname,
    SaldoAwal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Incoming => "incoming",
            TransactionType::Outgoing => "outgoing",
            TransactionType::Adjustment => "adjustment",
            TransactionType::StockOpname => "stock_opname",
            TransactionType::SaldoAwal => "saldo_awal",
        }
    }

    /// INSW activity code (`kdKegiatan`). Initial balances are posted to their
    /// own endpoint and carry no activity code.
    pub fn activity_code(&self) -> Option<&'static str> {
        match self {
            TransactionType::Incoming => Some("30"),
            TransactionType::Outgoing => Some("31"),
            TransactionType::Adjustment => Some("32"),
            TransactionType::StockOpname => Some("33"),
            TransactionType::SaldoAwal => None,
        }
    }

    /// Whether records of this type are stored as goods documents
    pub fn is_document(&self) -> bool {
        !matches!(self, TransactionType::StockOpname)
    }
}

impl std::str::FromStr for TransactionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(TransactionType::Incoming),
            "outgoing" => Ok(TransactionType::Outgoing),
            "adjustment" => Ok(TransactionType::Adjustment),
            "stock_opname" => Ok(TransactionType::StockOpname),
            "saldo_awal" => Ok(TransactionType::SaldoAwal),
            other => Err(ParseEnumError::new("transaction type", other)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a transmission record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionStatus {
    Pending,
    /// Claimed by a running batch, the external call is in flight
    Sent,
    Success,
    Failed,
    Skipped,
}

impl TransmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionStatus::Pending => "PENDING",
            TransmissionStatus::Sent => "SENT",
            TransmissionStatus::Success => "SUCCESS",
            TransmissionStatus::Failed => "FAILED",
            TransmissionStatus::Skipped => "SKIPPED",
        }
    }

    /// Statuses a batch may claim without waiting for a stale claim to expire
    pub fn is_claimable(&self) -> bool {
        matches!(self, TransmissionStatus::Pending | TransmissionStatus::Failed)
    }
}

impl std::str::FromStr for TransmissionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransmissionStatus::Pending),
            "SENT" => Ok(TransmissionStatus::Sent),
            "SUCCESS" => Ok(TransmissionStatus::Success),
            "FAILED" => Ok(TransmissionStatus::Failed),
            "SKIPPED" => Ok(TransmissionStatus::Skipped),
            other => Err(ParseEnumError::new("transmission status", other)),
        }
    }
}

impl std::fmt::Display for TransmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the transmission audit ledger.
///
/// Rows are created when a source transaction is queued and are only ever
/// updated by the transmission orchestrator. They are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransmissionRecord {
    pub id: Uuid,
    /// Id of the source document or opname
    pub internal_id: Uuid,
    pub external_wms_id: String,
    pub company_code: String,
    pub transaction_type: TransactionType,
    pub status: TransmissionStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub response_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A source transaction to queue for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransmission {
    pub internal_id: Uuid,
    pub external_wms_id: String,
    pub company_code: String,
    pub transaction_type: TransactionType,
}

impl NewTransmission {
    pub fn new(
        company_code: &str,
        transaction_type: TransactionType,
        internal_id: Uuid,
        external_wms_id: &str,
    ) -> Self {
        Self {
            internal_id,
            external_wms_id: external_wms_id.to_string(),
            company_code: company_code.to_string(),
            transaction_type,
        }
    }
}

/// Filter for the transmission log
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransmissionFilter {
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransmissionStatus>,
    pub limit: Option<i64>,
}

impl TransmissionFilter {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 500;

    /// Requested limit clamped to `1..=MAX_LIMIT`
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// Outcome of one record within a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransmissionResult {
    pub record_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_wms_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    /// SUCCESS, FAILED or SKIPPED
    pub status: TransmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i32>,
    pub message: String,
}

impl TransmissionResult {
    pub fn for_record(record: &TransmissionRecord, status: TransmissionStatus, message: impl Into<String>) -> Self {
        Self {
            record_id: record.id,
            external_wms_id: Some(record.external_wms_id.clone()),
            transaction_type: Some(record.transaction_type),
            status,
            retry_count: Some(record.retry_count),
            message: message.into(),
        }
    }

    pub fn unknown(record_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            record_id,
            external_wms_id: None,
            transaction_type: None,
            status: TransmissionStatus::Failed,
            retry_count: None,
            message: message.into(),
        }
    }
}

/// Overall outcome of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Partial,
    Failed,
}

/// Counts for a finished batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[TransmissionResult]) -> Self {
        let count = |status: TransmissionStatus| results.iter().filter(|r| r.status == status).count();

        let success_count = count(TransmissionStatus::Success);
        let failed_count = count(TransmissionStatus::Failed);
        let skipped_count = count(TransmissionStatus::Skipped);
        let total = results.len();

        let status = if failed_count == 0 {
            BatchStatus::Success
        } else if failed_count == total {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        };

        Self {
            status,
            total,
            success_count,
            failed_count,
            skipped_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: TransmissionStatus) -> TransmissionResult {
        TransmissionResult {
            record_id: Uuid::new_v4(),
            external_wms_id: None,
            transaction_type: None,
            status,
            retry_count: None,
            message: String::new(),
        }
    }

    #[test]
    fn test_batch_summary_mixed_is_partial() {
        let results = vec![
            result(TransmissionStatus::Success),
            result(TransmissionStatus::Skipped),
            result(TransmissionStatus::Failed),
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.status, BatchStatus::Partial);
    }

    #[test]
    fn test_batch_summary_all_failed() {
        let results = vec![result(TransmissionStatus::Failed), result(TransmissionStatus::Failed)];
        assert_eq!(BatchSummary::from_results(&results).status, BatchStatus::Failed);
    }

    #[test]
    fn test_batch_summary_success_with_skips() {
        let results = vec![result(TransmissionStatus::Success), result(TransmissionStatus::Skipped)];
        assert_eq!(BatchSummary::from_results(&results).status, BatchStatus::Success);
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            TransmissionStatus::Pending,
            TransmissionStatus::Sent,
            TransmissionStatus::Success,
            TransmissionStatus::Failed,
            TransmissionStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<TransmissionStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<TransmissionStatus>().is_err());
    }

    #[test]
    fn test_filter_limit_is_clamped() {
        let filter = TransmissionFilter { limit: Some(10_000), ..Default::default() };
        assert_eq!(filter.effective_limit(), TransmissionFilter::MAX_LIMIT);
        assert_eq!(TransmissionFilter::default().effective_limit(), 50);
        let filter = TransmissionFilter { limit: Some(0), ..Default::default() };
        assert_eq!(filter.effective_limit(), 1);
    }
}
