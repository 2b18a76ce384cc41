//! Goods documents: the source transactions that feed the ledger

use std::sync::Arc;

use serde::Serialize;
use shared::{find_duplicate_key, CreateDocumentInput, InventoryDocument, TransactionType, TransmissionRecord};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{permissions, AuthContext};
use crate::repository::Store;

/// Document service for recording incoming, outgoing and opening balance documents
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn Store>,
}

/// A stored document with the transmission record queued for it
#[derive(Debug, Serialize)]
pub struct RecordedDocument {
    pub document: InventoryDocument,
    pub transmission: TransmissionRecord,
}

impl DocumentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a goods document and queue it for INSW reporting
    pub async fn record_document(
        &self,
        ctx: &AuthContext,
        transaction_type: TransactionType,
        input: CreateDocumentInput,
    ) -> AppResult<RecordedDocument> {
        ctx.require(permissions::DOCUMENT_WRITE)?;

        if !matches!(
            transaction_type,
            TransactionType::Incoming | TransactionType::Outgoing | TransactionType::SaldoAwal
        ) {
            return Err(AppError::validation(
                "transaction_type",
                format!("{} documents cannot be recorded directly", transaction_type),
            ));
        }

        input.validate()?;

        let needs_customs = transaction_type != TransactionType::SaldoAwal;
        if needs_customs && input.customs_document.is_none() {
            return Err(AppError::validation(
                "customs_document",
                "Customs document is required for incoming and outgoing goods",
            ));
        }

        if let Some(key) = find_duplicate_key(input.items.iter().map(|i| i.key())) {
            return Err(AppError::validation("items", format!("Item {} is listed more than once", key)));
        }

        if self
            .store
            .document_exists(&ctx.company_code, transaction_type, &input.wms_id)
            .await?
        {
            return Err(AppError::DuplicateEntry("wms_id".to_string()));
        }

        let document = InventoryDocument::from_input(&ctx.company_code, transaction_type, input);
        let transmission = self.store.insert_document(&document).await?;

        tracing::info!(
            company = %ctx.company_code,
            wms_id = %document.wms_id,
            transaction_type = %transaction_type,
            items = document.items.len(),
            "Recorded inventory document"
        );

        Ok(RecordedDocument {
            document,
            transmission,
        })
    }

    /// Get a document of the caller's company
    pub async fn get_document(&self, ctx: &AuthContext, id: Uuid) -> AppResult<InventoryDocument> {
        ctx.require(permissions::DOCUMENT_READ)?;

        self.store
            .find_document(&ctx.company_code, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document".to_string()))
    }
}
