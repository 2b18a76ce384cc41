//! INSW (Indonesia National Single Window) reporting client
//!
//! Bonded zone operators report goods movements, stock counts and opening
//! balances to INSW. Requests carry two credentials: `x-insw-key` (API key)
//! and `x-unique-key` (per-operator secret).

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::config::{InswConfig, InswEndpoints};
use crate::error::{AppError, AppResult};

/// Which INSW endpoint a payload is posted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InswCategory {
    InitialBalance,
    Transaction,
    DocumentDetail,
}

impl InswCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InswCategory::InitialBalance => "initial_balance",
            InswCategory::Transaction => "transaction",
            InswCategory::DocumentDetail => "document_detail",
        }
    }
}

/// Customs document reference inside a transaction payload
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InswCustomsDocument {
    pub kd_dokumen: String,
    pub nomor_dokumen: String,
    pub tanggal_dokumen: NaiveDate,
}

/// One goods line of a transaction payload
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InswGoodsLine {
    pub kd_barang: String,
    pub kategori_barang: String,
    pub uraian_barang: String,
    pub kd_satuan: String,
    pub jumlah: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nilai: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kd_valuta: Option<String>,
}

/// Goods movement, adjustment or stock count report
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InswTransactionPayload {
    pub kd_kegiatan: String,
    pub npwp: String,
    pub nomor_ppkek: String,
    pub wms_id: String,
    pub tanggal_kegiatan: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dokumen_pabean: Option<InswCustomsDocument>,
    pub barang: Vec<InswGoodsLine>,
}

/// One line of an opening balance declaration
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InswBalanceLine {
    pub kd_barang: String,
    pub kategori_barang: String,
    pub uraian_barang: String,
    pub kd_satuan: String,
    pub jumlah: Decimal,
}

/// Opening balance declaration
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InswInitialBalancePayload {
    pub npwp: String,
    pub nomor_ppkek: String,
    pub tanggal_declare: NaiveDate,
    pub barang_saldo: Vec<InswBalanceLine>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum InswPayload {
    Transaction(InswTransactionPayload),
    InitialBalance(InswInitialBalancePayload),
}

impl InswPayload {
    pub fn category(&self) -> InswCategory {
        match self {
            InswPayload::Transaction(_) => InswCategory::Transaction,
            InswPayload::InitialBalance(_) => InswCategory::InitialBalance,
        }
    }
}

/// Why an INSW call did not produce an accepted response
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("INSW request failed: {0}")]
    Transport(String),

    #[error("INSW request timed out")]
    Timeout,

    #[error("INSW returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("INSW response could not be read: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::ExternalService(err.to_string())
    }
}

/// Outbound INSW calls
#[async_trait]
pub trait InswGateway: Send + Sync {
    /// Post a payload to the endpoint for `category`
    async fn send(&self, category: InswCategory, payload: &InswPayload) -> Result<Value, GatewayError>;

    /// Look up a customs document by its number
    async fn document_detail(&self, number: &str) -> Result<Value, GatewayError>;
}

/// HTTP implementation of [`InswGateway`]
#[derive(Clone)]
pub struct InswClient {
    http_client: Client,
    endpoints: InswEndpoints,
    api_key: String,
    secret_key: String,
}

impl InswClient {
    /// Build a client for the configured mode
    pub fn new(config: &InswConfig) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoints: config.endpoints().clone(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn endpoint(&self, category: InswCategory) -> &str {
        match category {
            InswCategory::InitialBalance => &self.endpoints.initial_balance,
            InswCategory::Transaction => &self.endpoints.transaction,
            InswCategory::DocumentDetail => &self.endpoints.document_detail,
        }
    }

    async fn read_response(response: reqwest::Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl InswGateway for InswClient {
    async fn send(&self, category: InswCategory, payload: &InswPayload) -> Result<Value, GatewayError> {
        let url = self.endpoint(category);

        tracing::debug!(category = category.as_str(), url, "Posting to INSW");

        let response = self
            .http_client
            .post(url)
            .header("x-insw-key", &self.api_key)
            .header("x-unique-key", &self.secret_key)
            .json(payload)
            .send()
            .await?;

        Self::read_response(response).await
    }

    async fn document_detail(&self, number: &str) -> Result<Value, GatewayError> {
        let url = self.endpoint(InswCategory::DocumentDetail);

        let response = self
            .http_client
            .get(url)
            .query(&[("nomorDokumen", number)])
            .header("x-insw-key", &self.api_key)
            .header("x-unique-key", &self.secret_key)
            .send()
            .await?;

        Self::read_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_transaction_payload_uses_insw_field_names() {
        let payload = InswPayload::Transaction(InswTransactionPayload {
            kd_kegiatan: "30".to_string(),
            npwp: "012345678901234".to_string(),
            nomor_ppkek: "PPKEK-01".to_string(),
            wms_id: "GRN-001".to_string(),
            tanggal_kegiatan: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            dokumen_pabean: None,
            barang: vec![InswGoodsLine {
                kd_barang: "RM-01".to_string(),
                kategori_barang: "raw_material".to_string(),
                uraian_barang: "Resin".to_string(),
                kd_satuan: "KGM".to_string(),
                jumlah: dec("10.125"),
                nilai: None,
                kd_valuta: None,
            }],
        });

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kdKegiatan"], "30");
        assert_eq!(json["nomorPpkek"], "PPKEK-01");
        assert_eq!(json["tanggalKegiatan"], "2026-01-15");
        assert!(json.get("dokumenPabean").is_none());
        assert_eq!(json["barang"][0]["kdBarang"], "RM-01");
        // Quantities go out unrounded
        assert_eq!(json["barang"][0]["jumlah"], "10.125");
        assert!(json["barang"][0].get("nilai").is_none());
        assert_eq!(payload.category(), InswCategory::Transaction);
    }

    #[test]
    fn test_gateway_error_becomes_external_service_error() {
        let err: AppError = GatewayError::Rejected {
            status: 422,
            body: "npwp tidak valid".to_string(),
        }
        .into();
        match err {
            AppError::ExternalService(msg) => assert!(msg.contains("422")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
