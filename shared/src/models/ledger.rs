//! Stock movement ledger and the balances derived from it

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{display_qty, DateRange, ParseEnumError};

/// Identity of a stocked item within a company
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub item_type: String,
    pub item_code: String,
}

impl ItemKey {
    pub fn new(item_code: &str, item_type: &str) -> Self {
        Self {
            item_type: item_type.to_string(),
            item_code: item_code.to_string(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.item_type, self.item_code)
    }
}

/// What produced a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    InitialBalance,
    Incoming,
    Outgoing,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::InitialBalance => "initial_balance",
            MovementKind::Incoming => "incoming",
            MovementKind::Outgoing => "outgoing",
            MovementKind::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for MovementKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial_balance" => Ok(MovementKind::InitialBalance),
            "incoming" => Ok(MovementKind::Incoming),
            "outgoing" => Ok(MovementKind::Outgoing),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(ParseEnumError::new("movement kind", other)),
        }
    }
}

/// Movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "in",
            MovementDirection::Out => "out",
        }
    }
}

impl std::str::FromStr for MovementDirection {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementDirection::In),
            "out" => Ok(MovementDirection::Out),
            other => Err(ParseEnumError::new("movement direction", other)),
        }
    }
}

/// An append-only ledger row. `quantity` is always positive; the sign comes
/// from `direction`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub id: Uuid,
    pub company_code: String,
    pub item_code: String,
    pub item_type: String,
    pub item_name: String,
    pub uom: String,
    pub kind: MovementKind,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub movement_date: NaiveDate,
    pub source_document_id: Uuid,
}

impl StockMovement {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.item_code, &self.item_type)
    }

    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            MovementDirection::In => self.quantity,
            MovementDirection::Out => -self.quantity,
        }
    }
}

/// Ledger quantities for one item as seen by a stock count on a given date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerPosition {
    pub item_code: String,
    pub item_type: String,
    pub beginning_qty: Decimal,
    pub incoming_qty_on_date: Decimal,
    pub outgoing_qty_on_date: Decimal,
}

impl LedgerPosition {
    pub fn empty(key: &ItemKey) -> Self {
        Self {
            item_code: key.item_code.clone(),
            item_type: key.item_type.clone(),
            beginning_qty: Decimal::ZERO,
            incoming_qty_on_date: Decimal::ZERO,
            outgoing_qty_on_date: Decimal::ZERO,
        }
    }

    /// `beginning + incoming_on_date - outgoing_on_date`
    pub fn system_qty(&self) -> Decimal {
        self.beginning_qty + self.incoming_qty_on_date - self.outgoing_qty_on_date
    }
}

/// Fold the movements of `key` into its position as of `date`.
///
/// Everything dated before `date` (and initial balances dated on it) forms the
/// beginning quantity. Other movements dated on `date` are reported as that
/// day's incoming and outgoing quantities. Later movements are ignored.
pub fn position_as_of<'a, I>(movements: I, key: &ItemKey, date: NaiveDate) -> LedgerPosition
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    let mut position = LedgerPosition::empty(key);

    for movement in movements {
        if movement.item_code != key.item_code || movement.item_type != key.item_type {
            continue;
        }
        if movement.movement_date > date {
            continue;
        }

        let opening = movement.movement_date < date || movement.kind == MovementKind::InitialBalance;
        if opening {
            position.beginning_qty += movement.signed_quantity();
            continue;
        }

        match movement.direction {
            MovementDirection::In => position.incoming_qty_on_date += movement.quantity,
            MovementDirection::Out => position.outgoing_qty_on_date += movement.quantity,
        }
    }

    position
}

/// One line of the stock mutation report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationRow {
    pub item_type: String,
    pub item_code: String,
    pub item_name: String,
    pub uom: String,
    #[serde(serialize_with = "display_qty::serialize")]
    pub beginning: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub incoming: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub outgoing: Decimal,
    /// Net adjustment, gains positive
    #[serde(serialize_with = "display_qty::serialize")]
    pub adjustment: Decimal,
    #[serde(serialize_with = "display_qty::serialize")]
    pub ending: Decimal,
}

/// Build the mutation report for `range` from every movement up to `range.to`.
///
/// Rows are ordered by item type, then item code. The name and unit shown are
/// those of the most recent movement of the item.
pub fn mutation_report(movements: &[StockMovement], range: DateRange) -> Vec<MutationRow> {
    let mut rows: BTreeMap<ItemKey, MutationRow> = BTreeMap::new();

    for movement in movements.iter().filter(|m| m.movement_date <= range.to) {
        let row = rows.entry(movement.key()).or_insert_with(|| MutationRow {
            item_type: movement.item_type.clone(),
            item_code: movement.item_code.clone(),
            item_name: movement.item_name.clone(),
            uom: movement.uom.clone(),
            beginning: Decimal::ZERO,
            incoming: Decimal::ZERO,
            outgoing: Decimal::ZERO,
            adjustment: Decimal::ZERO,
            ending: Decimal::ZERO,
        });
        row.item_name = movement.item_name.clone();
        row.uom = movement.uom.clone();

        if movement.movement_date < range.from || movement.kind == MovementKind::InitialBalance {
            row.beginning += movement.signed_quantity();
            continue;
        }

        match movement.kind {
            MovementKind::Adjustment => row.adjustment += movement.signed_quantity(),
            _ => match movement.direction {
                MovementDirection::In => row.incoming += movement.quantity,
                MovementDirection::Out => row.outgoing += movement.quantity,
            },
        }
    }

    rows.into_values()
        .map(|mut row| {
            row.ending = row.beginning + row.incoming - row.outgoing + row.adjustment;
            row
        })
        .collect()
}
