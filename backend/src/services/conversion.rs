//! Conversion of stored documents into INSW payloads

use shared::{Company, InventoryDocument, StockOpname, TransactionType};

use crate::external::insw::{
    InswBalanceLine, InswCustomsDocument, InswGoodsLine, InswInitialBalancePayload, InswPayload,
    InswTransactionPayload,
};

/// A stored record that cannot be reported as-is
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("Company {0} has no NPWP")]
    MissingNpwp(String),

    #[error("Company {0} has an invalid NPWP: {1}")]
    InvalidNpwp(String, &'static str),

    #[error("Company {0} has no PPKEK number")]
    MissingPpkek(String),

    #[error("Company profile {0} not found")]
    UnknownCompany(String),

    #[error("{0} has no items")]
    NoItems(String),

    #[error("{0} has no customs document")]
    MissingCustomsDocument(String),

    #[error("Source {transaction_type} {wms_id} not found")]
    MissingSource {
        transaction_type: TransactionType,
        wms_id: String,
    },

    #[error("{0} cannot be reported as a {1} transaction")]
    TypeMismatch(String, TransactionType),
}

struct Registration<'a> {
    npwp: &'a str,
    ppkek: &'a str,
}

fn registration(company: &Company) -> Result<Registration<'_>, ConversionError> {
    let npwp = company
        .npwp
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConversionError::MissingNpwp(company.code.clone()))?;
    shared::validate_npwp(npwp).map_err(|reason| ConversionError::InvalidNpwp(company.code.clone(), reason))?;
    let ppkek = company
        .ppkek_number
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConversionError::MissingPpkek(company.code.clone()))?;
    Ok(Registration { npwp, ppkek })
}

/// Payload for a goods document (incoming, outgoing, adjustment or saldo awal)
pub fn document_payload(
    company: &Company,
    document: &InventoryDocument,
) -> Result<InswPayload, ConversionError> {
    let reg = registration(company)?;

    if document.items.is_empty() {
        return Err(ConversionError::NoItems(document.wms_id.clone()));
    }

    if document.transaction_type == TransactionType::SaldoAwal {
        return Ok(InswPayload::InitialBalance(InswInitialBalancePayload {
            npwp: shared::normalize_npwp(reg.npwp),
            nomor_ppkek: reg.ppkek.to_string(),
            tanggal_declare: document.document_date,
            barang_saldo: document
                .items
                .iter()
                .map(|item| InswBalanceLine {
                    kd_barang: item.item_code.clone(),
                    kategori_barang: item.item_type.clone(),
                    uraian_barang: item.item_name.clone(),
                    kd_satuan: item.uom.clone(),
                    jumlah: item.quantity,
                })
                .collect(),
        }));
    }

    let Some(activity_code) = document.transaction_type.activity_code() else {
        return Err(ConversionError::TypeMismatch(
            document.wms_id.clone(),
            document.transaction_type,
        ));
    };

    let needs_customs = matches!(
        document.transaction_type,
        TransactionType::Incoming | TransactionType::Outgoing
    );
    if needs_customs && document.customs_document.is_none() {
        return Err(ConversionError::MissingCustomsDocument(document.wms_id.clone()));
    }

    Ok(InswPayload::Transaction(InswTransactionPayload {
        kd_kegiatan: activity_code.to_string(),
        npwp: shared::normalize_npwp(reg.npwp),
        nomor_ppkek: reg.ppkek.to_string(),
        wms_id: document.wms_id.clone(),
        tanggal_kegiatan: document.document_date,
        dokumen_pabean: document
            .customs_document
            .as_ref()
            .map(|doc| InswCustomsDocument {
                kd_dokumen: doc.code.clone(),
                nomor_dokumen: doc.number.clone(),
                tanggal_dokumen: doc.date,
            }),
        barang: document
            .items
            .iter()
            .map(|item| InswGoodsLine {
                kd_barang: item.item_code.clone(),
                kategori_barang: item.item_type.clone(),
                uraian_barang: item.item_name.clone(),
                kd_satuan: item.uom.clone(),
                jumlah: item.quantity,
                nilai: item.value_amount,
                kd_valuta: item.currency.clone(),
            })
            .collect(),
    }))
}

/// Payload for a confirmed stock count; reports the physical quantities
pub fn opname_payload(company: &Company, opname: &StockOpname) -> Result<InswPayload, ConversionError> {
    let reg = registration(company)?;

    if opname.items.is_empty() {
        return Err(ConversionError::NoItems(opname.wms_id.clone()));
    }

    let activity_code = TransactionType::StockOpname
        .activity_code()
        .unwrap_or("33")
        .to_string();

    Ok(InswPayload::Transaction(InswTransactionPayload {
        kd_kegiatan: activity_code,
        npwp: shared::normalize_npwp(reg.npwp),
        nomor_ppkek: reg.ppkek.to_string(),
        wms_id: opname.wms_id.clone(),
        tanggal_kegiatan: opname.document_date,
        dokumen_pabean: None,
        barang: opname
            .items
            .iter()
            .map(|item| InswGoodsLine {
                kd_barang: item.item_code.clone(),
                kategori_barang: item.item_type.clone(),
                uraian_barang: item.item_name.clone(),
                kd_satuan: item.uom.clone(),
                jumlah: item.physical_qty,
                nilai: None,
                kd_valuta: None,
            })
            .collect(),
    }))
}
