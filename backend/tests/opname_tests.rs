//! Stock opname reconciliation tests
//!
//! - Reconciliation arithmetic (property tests)
//! - Confirm/cancel state machine over the in-memory store
//! - Adjustments feeding later ledger positions

mod common;

use std::sync::Arc;

use bonded_inventory::error::AppError;
use bonded_inventory::repository::{MemoryStore, TransmissionRepository};
use bonded_inventory::services::{DocumentService, OpnameService};
use common::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    AdjustmentType, CreateDocumentInput, CreateOpnameInput, LedgerPosition, OpnameCountInput,
    OpnameStatus, StockOpnameItem, TransactionType, TransmissionFilter,
};

fn count(code: &str, physical: &str) -> OpnameCountInput {
    OpnameCountInput {
        item_code: code.to_string(),
        item_type: "raw_material".to_string(),
        item_name: format!("Item {}", code),
        uom: "KGM".to_string(),
        physical_qty: dec(physical),
    }
}

fn opname_input(wms_id: &str, on: chrono::NaiveDate, items: Vec<OpnameCountInput>) -> CreateOpnameInput {
    CreateOpnameInput {
        wms_id: wms_id.to_string(),
        document_date: on,
        notes: None,
        items,
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    documents: DocumentService,
    opnames: OpnameService,
}

impl Fixture {
    /// Opening balance of 10 for X, Y and Z on 2026-01-01
    async fn seeded() -> Self {
        let store = memory_store();
        let fx = Self {
            documents: DocumentService::new(store.clone()),
            opnames: OpnameService::new(store.clone()),
            store,
        };
        fx.documents
            .record_document(
                &admin(COMPANY),
                TransactionType::SaldoAwal,
                CreateDocumentInput {
                    customs_document: None,
                    ..document_input(
                        "SA-1",
                        date(2026, 1, 1),
                        vec![item("X", "10"), item("Y", "10"), item("Z", "10")],
                    )
                },
            )
            .await
            .unwrap();
        fx
    }

    async fn queued(&self) -> usize {
        self.store
            .list_transmissions(COMPANY, &TransmissionFilter::default())
            .await
            .unwrap()
            .len()
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn qty_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000, 0u32..4).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// system = beginning + incoming - outgoing, exactly
    #[test]
    fn prop_system_qty_is_ledger_sum(
        beginning in qty_strategy(),
        incoming in qty_strategy(),
        outgoing in qty_strategy(),
        physical in qty_strategy(),
    ) {
        let position = LedgerPosition {
            item_code: "X".to_string(),
            item_type: "raw_material".to_string(),
            beginning_qty: beginning,
            incoming_qty_on_date: incoming,
            outgoing_qty_on_date: outgoing,
        };
        let mut input = count("X", "0");
        input.physical_qty = physical;

        let item = StockOpnameItem::reconcile(&input, &position);
        prop_assert_eq!(item.system_qty, beginning + incoming - outgoing);
        prop_assert_eq!(item.variance_qty, physical - item.system_qty);
        prop_assert_eq!(item.adjustment_qty_signed, item.variance_qty);
    }

    /// GAIN iff variance > 0, LOSS iff variance < 0, none iff zero
    #[test]
    fn prop_adjustment_type_follows_variance_sign(
        system in qty_strategy(),
        physical in qty_strategy(),
    ) {
        let position = LedgerPosition {
            item_code: "X".to_string(),
            item_type: "raw_material".to_string(),
            beginning_qty: system,
            incoming_qty_on_date: Decimal::ZERO,
            outgoing_qty_on_date: Decimal::ZERO,
        };
        let mut input = count("X", "0");
        input.physical_qty = physical;

        let item = StockOpnameItem::reconcile(&input, &position);
        let expected = if physical > system {
            Some(AdjustmentType::Gain)
        } else if physical < system {
            Some(AdjustmentType::Loss)
        } else {
            None
        };
        prop_assert_eq!(item.adjustment_type, expected);
    }
}

#[test]
fn test_tiny_variance_is_not_rounded_away() {
    let position = LedgerPosition {
        item_code: "X".to_string(),
        item_type: "raw_material".to_string(),
        beginning_qty: dec("10.000"),
        incoming_qty_on_date: Decimal::ZERO,
        outgoing_qty_on_date: Decimal::ZERO,
    };
    let item = StockOpnameItem::reconcile(&count("X", "10.001"), &position);
    assert_eq!(item.adjustment_type, Some(AdjustmentType::Gain));
    assert_eq!(item.variance_qty, dec("0.001"));
}

// ============================================================================
// Workflow Tests
// ============================================================================

#[tokio::test]
async fn test_confirm_emits_gain_and_loss_only_for_variances() {
    let fx = Fixture::seeded().await;

    let opname = fx
        .opnames
        .create_opname(
            &admin(COMPANY),
            opname_input("OP-1", date(2026, 1, 31), vec![count("X", "15"), count("Y", "7"), count("Z", "10")]),
        )
        .await
        .unwrap();
    assert_eq!(opname.status, OpnameStatus::Active);
    assert_eq!(opname.items[0].variance_qty, dec("5"));
    assert_eq!(opname.items[1].variance_qty, dec("-3"));
    assert_eq!(opname.items[2].adjustment_type, None);

    let confirmed = fx.opnames.confirm_opname(&admin(COMPANY), "OP-1").await.unwrap();
    assert_eq!(confirmed.opname.status, OpnameStatus::Confirmed);
    assert!(confirmed.opname.confirmed_at.is_some());
    assert_eq!(confirmed.adjustments.len(), 2);
    assert_eq!(confirmed.adjustments[0].item_code, "X");
    assert_eq!(confirmed.adjustments[0].adjustment_type, AdjustmentType::Gain);
    assert_eq!(confirmed.adjustments[0].adjustment_qty, dec("5"));
    assert_eq!(confirmed.adjustments[1].item_code, "Y");
    assert_eq!(confirmed.adjustments[1].adjustment_type, AdjustmentType::Loss);
    assert_eq!(confirmed.adjustments[1].adjustment_qty, dec("3"));
    assert_eq!(confirmed.adjustment_wms_id.as_deref(), Some("ADJ-OP-1"));

    // saldo awal + stock opname + adjustment
    assert_eq!(fx.queued().await, 3);

    let adjustment = fx
        .documents
        .get_document(&admin(COMPANY), confirmed.adjustment_document_id.unwrap())
        .await
        .unwrap();
    assert_eq!(adjustment.transaction_type, TransactionType::Adjustment);
    assert_eq!(adjustment.items.len(), 2);
}

#[tokio::test]
async fn test_confirmed_adjustments_feed_later_counts() {
    let fx = Fixture::seeded().await;
    fx.opnames
        .create_opname(
            &admin(COMPANY),
            opname_input("OP-1", date(2026, 1, 31), vec![count("X", "15"), count("Y", "7")]),
        )
        .await
        .unwrap();
    fx.opnames.confirm_opname(&admin(COMPANY), "OP-1").await.unwrap();

    let later = fx
        .opnames
        .create_opname(
            &admin(COMPANY),
            opname_input("OP-2", date(2026, 2, 28), vec![count("X", "15"), count("Y", "7")]),
        )
        .await
        .unwrap();

    for item in &later.items {
        assert_eq!(item.variance_qty, Decimal::ZERO, "item {}", item.item_code);
        assert_eq!(item.adjustment_type, None);
    }
    assert_eq!(later.items[0].beginning_qty, dec("15"));
}

#[tokio::test]
async fn test_same_day_movements_are_split_out() {
    let fx = Fixture::seeded().await;
    let on = date(2026, 1, 20);

    fx.documents
        .record_document(
            &admin(COMPANY),
            TransactionType::Incoming,
            document_input("GRN-1", on, vec![item("X", "4")]),
        )
        .await
        .unwrap();
    fx.documents
        .record_document(
            &admin(COMPANY),
            TransactionType::Outgoing,
            document_input("GI-1", on, vec![item("X", "1.5")]),
        )
        .await
        .unwrap();
    fx.documents
        .record_document(
            &admin(COMPANY),
            TransactionType::Incoming,
            document_input("GRN-2", date(2026, 1, 21), vec![item("X", "100")]),
        )
        .await
        .unwrap();

    let opname = fx
        .opnames
        .create_opname(&admin(COMPANY), opname_input("OP-1", on, vec![count("X", "12.5")]))
        .await
        .unwrap();

    let x = &opname.items[0];
    assert_eq!(x.beginning_qty, dec("10"));
    assert_eq!(x.incoming_qty_on_date, dec("4"));
    assert_eq!(x.outgoing_qty_on_date, dec("1.5"));
    assert_eq!(x.system_qty, dec("12.5"));
    assert_eq!(x.adjustment_type, None);
}

#[tokio::test]
async fn test_terminal_opnames_reject_confirm_and_cancel() {
    let fx = Fixture::seeded().await;
    fx.opnames
        .create_opname(&admin(COMPANY), opname_input("OP-1", date(2026, 1, 31), vec![count("X", "11")]))
        .await
        .unwrap();
    fx.opnames.confirm_opname(&admin(COMPANY), "OP-1").await.unwrap();
    let queued = fx.queued().await;

    let again = fx.opnames.confirm_opname(&admin(COMPANY), "OP-1").await;
    assert!(matches!(again, Err(AppError::InvalidStateTransition(_))));
    let cancel = fx.opnames.cancel_opname(&admin(COMPANY), "OP-1").await;
    assert!(matches!(cancel, Err(AppError::InvalidStateTransition(_))));
    assert_eq!(fx.queued().await, queued);

    fx.opnames
        .create_opname(&admin(COMPANY), opname_input("OP-2", date(2026, 2, 1), vec![count("X", "3")]))
        .await
        .unwrap();
    let cancelled = fx.opnames.cancel_opname(&admin(COMPANY), "OP-2").await.unwrap();
    assert_eq!(cancelled.status, OpnameStatus::Cancelled);
    assert_eq!(fx.queued().await, queued);

    let confirm_cancelled = fx.opnames.confirm_opname(&admin(COMPANY), "OP-2").await;
    assert!(matches!(confirm_cancelled, Err(AppError::InvalidStateTransition(_))));

    let missing = fx.opnames.confirm_opname(&admin(COMPANY), "OP-404").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_create_rejects_duplicates() {
    let fx = Fixture::seeded().await;
    fx.opnames
        .create_opname(&admin(COMPANY), opname_input("OP-1", date(2026, 1, 31), vec![count("X", "10")]))
        .await
        .unwrap();

    let same_wms = fx
        .opnames
        .create_opname(&admin(COMPANY), opname_input("OP-1", date(2026, 2, 1), vec![count("Y", "10")]))
        .await;
    assert!(matches!(same_wms, Err(AppError::DuplicateEntry(_))));

    // Another company may reuse the id
    fx.opnames
        .create_opname(&admin(OTHER_COMPANY), opname_input("OP-1", date(2026, 2, 1), vec![count("Y", "0")]))
        .await
        .unwrap();

    let same_item = fx
        .opnames
        .create_opname(
            &admin(COMPANY),
            opname_input("OP-2", date(2026, 2, 1), vec![count("X", "1"), count("X", "2")]),
        )
        .await;
    assert!(matches!(same_item, Err(AppError::Validation { .. })));

    let negative = fx
        .opnames
        .create_opname(&admin(COMPANY), opname_input("OP-3", date(2026, 2, 1), vec![count("X", "-1")]))
        .await;
    match negative {
        Err(AppError::InvalidFields(fields)) => assert_eq!(fields[0].field, "items[0].physical_qty"),
        other => panic!("expected field errors, got {:?}", other.map(|o| o.wms_id)),
    }

    // Finer than the stored scale would reconcile against a value that is never persisted
    let too_fine = fx
        .opnames
        .create_opname(&admin(COMPANY), opname_input("OP-4", date(2026, 2, 1), vec![count("Y", "10.0000001")]))
        .await;
    match too_fine {
        Err(AppError::InvalidFields(fields)) => {
            assert_eq!(fields[0].field, "items[0].physical_qty");
            assert_eq!(fields[0].code, "scale");
        }
        other => panic!("expected field errors, got {:?}", other.map(|o| o.wms_id)),
    }
}

#[tokio::test]
async fn test_list_and_get_are_company_scoped() {
    let fx = Fixture::seeded().await;
    fx.opnames
        .create_opname(&admin(COMPANY), opname_input("OP-1", date(2026, 1, 31), vec![count("X", "10")]))
        .await
        .unwrap();
    fx.opnames
        .create_opname(&admin(COMPANY), opname_input("OP-2", date(2026, 2, 28), vec![count("X", "10")]))
        .await
        .unwrap();
    fx.opnames.cancel_opname(&admin(COMPANY), "OP-1").await.unwrap();

    let active = fx
        .opnames
        .list_opnames(&admin(COMPANY), Some(OpnameStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].wms_id, "OP-2");

    let all = fx.opnames.list_opnames(&admin(COMPANY), None).await.unwrap();
    assert_eq!(all.len(), 2);

    let elsewhere = fx.opnames.get_opname(&admin(OTHER_COMPANY), "OP-1").await;
    assert!(matches!(elsewhere, Err(AppError::NotFound(_))));
}
