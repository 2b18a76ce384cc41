//! PostgreSQL store

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    derive_adjustments, AdjustmentType, Company, CustomsDocument, DocumentItem, InventoryDocument,
    NewTransmission, OpnameStatus, ParseEnumError, StockMovement, StockOpname, StockOpnameItem,
    TransactionType, TransmissionFilter, TransmissionRecord,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{
    ClaimOutcome, ClaimToken, CompanyRepository, DocumentRepository, LedgerRepository, MovementFilter,
    OpnameRepository, OpnameTransition, Store, TransmissionRepository,
};
use crate::error::{AppError, AppResult};

const TRANSMISSION_COLUMNS: &str = "id, internal_id, external_wms_id, company_code, transaction_type, status, \
     sent_at, response_payload, error_message, retry_count, created_at, updated_at";

const OPNAME_COLUMNS: &str =
    "id, company_code, wms_id, document_date, status, notes, created_at, confirmed_at, cancelled_at";

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn parse<T: FromStr<Err = ParseEnumError>>(value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|e: ParseEnumError| AppError::Internal(e.to_string()))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Debug, FromRow)]
struct CompanyRow {
    code: String,
    name: String,
    npwp: Option<String>,
    ppkek_number: Option<String>,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    company_code: String,
    wms_id: String,
    transaction_type: String,
    document_date: NaiveDate,
    customs_code: Option<String>,
    customs_number: Option<String>,
    customs_date: Option<NaiveDate>,
    counterparty: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DocumentItemRow {
    item_code: String,
    item_type: String,
    item_name: String,
    uom: String,
    quantity: Decimal,
    value_amount: Option<Decimal>,
    currency: Option<String>,
    adjustment_type: Option<String>,
}

impl DocumentItemRow {
    fn into_item(self) -> AppResult<DocumentItem> {
        Ok(DocumentItem {
            item_code: self.item_code,
            item_type: self.item_type,
            item_name: self.item_name,
            uom: self.uom,
            quantity: self.quantity,
            value_amount: self.value_amount,
            currency: self.currency,
            adjustment_type: self.adjustment_type.as_deref().map(parse::<AdjustmentType>).transpose()?,
        })
    }
}

impl DocumentRow {
    fn into_document(self, items: Vec<DocumentItem>) -> AppResult<InventoryDocument> {
        let customs_document = match (self.customs_code, self.customs_number, self.customs_date) {
            (Some(code), Some(number), Some(date)) => Some(CustomsDocument { code, number, date }),
            _ => None,
        };
        Ok(InventoryDocument {
            id: self.id,
            company_code: self.company_code,
            wms_id: self.wms_id,
            transaction_type: parse(&self.transaction_type)?,
            document_date: self.document_date,
            customs_document,
            counterparty: self.counterparty,
            items,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    company_code: String,
    item_code: String,
    item_type: String,
    item_name: String,
    uom: String,
    kind: String,
    direction: String,
    quantity: Decimal,
    movement_date: NaiveDate,
    source_document_id: Uuid,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> AppResult<Self> {
        Ok(StockMovement {
            id: row.id,
            company_code: row.company_code,
            item_code: row.item_code,
            item_type: row.item_type,
            item_name: row.item_name,
            uom: row.uom,
            kind: parse(&row.kind)?,
            direction: parse(&row.direction)?,
            quantity: row.quantity,
            movement_date: row.movement_date,
            source_document_id: row.source_document_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct OpnameRow {
    id: Uuid,
    company_code: String,
    wms_id: String,
    document_date: NaiveDate,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl OpnameRow {
    fn into_opname(self, items: Vec<StockOpnameItem>) -> AppResult<StockOpname> {
        Ok(StockOpname {
            id: self.id,
            company_code: self.company_code,
            wms_id: self.wms_id,
            document_date: self.document_date,
            status: parse(&self.status)?,
            notes: self.notes,
            items,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OpnameItemRow {
    opname_id: Uuid,
    item_code: String,
    item_type: String,
    item_name: String,
    uom: String,
    physical_qty: Decimal,
    beginning_qty: Decimal,
    incoming_qty_on_date: Decimal,
    outgoing_qty_on_date: Decimal,
    system_qty: Decimal,
    variance_qty: Decimal,
    adjustment_qty_signed: Decimal,
    adjustment_type: Option<String>,
}

impl TryFrom<OpnameItemRow> for StockOpnameItem {
    type Error = AppError;

    fn try_from(row: OpnameItemRow) -> AppResult<Self> {
        Ok(StockOpnameItem {
            item_code: row.item_code,
            item_type: row.item_type,
            item_name: row.item_name,
            uom: row.uom,
            physical_qty: row.physical_qty,
            beginning_qty: row.beginning_qty,
            incoming_qty_on_date: row.incoming_qty_on_date,
            outgoing_qty_on_date: row.outgoing_qty_on_date,
            system_qty: row.system_qty,
            variance_qty: row.variance_qty,
            adjustment_qty_signed: row.adjustment_qty_signed,
            adjustment_type: row
                .adjustment_type
                .as_deref()
                .map(parse::<AdjustmentType>)
                .transpose()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransmissionRow {
    id: Uuid,
    internal_id: Uuid,
    external_wms_id: String,
    company_code: String,
    transaction_type: String,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    response_payload: Option<serde_json::Value>,
    error_message: Option<String>,
    retry_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransmissionRow> for TransmissionRecord {
    type Error = AppError;

    fn try_from(row: TransmissionRow) -> AppResult<Self> {
        Ok(TransmissionRecord {
            id: row.id,
            internal_id: row.internal_id,
            external_wms_id: row.external_wms_id,
            company_code: row.company_code,
            transaction_type: parse(&row.transaction_type)?,
            status: parse(&row.status)?,
            sent_at: row.sent_at,
            response_payload: row.response_payload,
            error_message: row.error_message,
            retry_count: row.retry_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

async fn insert_movements(conn: &mut PgConnection, movements: &[StockMovement]) -> AppResult<()> {
    for movement in movements {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, company_code, item_code, item_type, item_name, uom,
                                         kind, direction, quantity, movement_date, source_document_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(movement.id)
        .bind(&movement.company_code)
        .bind(&movement.item_code)
        .bind(&movement.item_type)
        .bind(&movement.item_name)
        .bind(&movement.uom)
        .bind(movement.kind.as_str())
        .bind(movement.direction.as_str())
        .bind(movement.quantity)
        .bind(movement.movement_date)
        .bind(movement.source_document_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_transmission(
    conn: &mut PgConnection,
    new: &NewTransmission,
) -> AppResult<TransmissionRecord> {
    sqlx::query(
        r#"
        INSERT INTO transmission_records (id, internal_id, external_wms_id, company_code,
                                          transaction_type, status, retry_count)
        VALUES ($1, $2, $3, $4, $5, 'PENDING', 0)
        ON CONFLICT (company_code, transaction_type, internal_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.internal_id)
    .bind(&new.external_wms_id)
    .bind(&new.company_code)
    .bind(new.transaction_type.as_str())
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, TransmissionRow>(&format!(
        "SELECT {} FROM transmission_records \
         WHERE company_code = $1 AND transaction_type = $2 AND internal_id = $3",
        TRANSMISSION_COLUMNS
    ))
    .bind(&new.company_code)
    .bind(new.transaction_type.as_str())
    .bind(new.internal_id)
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Header, items, movements and the PENDING transmission record
async fn insert_document_rows(
    conn: &mut PgConnection,
    document: &InventoryDocument,
) -> AppResult<TransmissionRecord> {
    let customs = document.customs_document.as_ref();
    sqlx::query(
        r#"
        INSERT INTO inventory_documents (id, company_code, wms_id, transaction_type, document_date,
                                         customs_code, customs_number, customs_date, counterparty, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(document.id)
    .bind(&document.company_code)
    .bind(&document.wms_id)
    .bind(document.transaction_type.as_str())
    .bind(document.document_date)
    .bind(customs.map(|c| c.code.as_str()))
    .bind(customs.map(|c| c.number.as_str()))
    .bind(customs.map(|c| c.date))
    .bind(&document.counterparty)
    .bind(document.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateEntry("wms_id".to_string())
        } else {
            AppError::DatabaseError(e)
        }
    })?;

    for (line_no, item) in document.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO inventory_document_items (document_id, line_no, item_code, item_type, item_name,
                                                  uom, quantity, value_amount, currency, adjustment_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(document.id)
        .bind(line_no as i32)
        .bind(&item.item_code)
        .bind(&item.item_type)
        .bind(&item.item_name)
        .bind(&item.uom)
        .bind(item.quantity)
        .bind(item.value_amount)
        .bind(&item.currency)
        .bind(item.adjustment_type.map(|t| t.as_str()))
        .execute(&mut *conn)
        .await?;
    }

    insert_movements(conn, &document.movements()).await?;

    insert_transmission(
        conn,
        &NewTransmission::new(
            &document.company_code,
            document.transaction_type,
            document.id,
            &document.wms_id,
        ),
    )
    .await
}

async fn load_opname_items(
    conn: &mut PgConnection,
    opname_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<StockOpnameItem>>> {
    let rows = sqlx::query_as::<_, OpnameItemRow>(
        r#"
        SELECT opname_id, item_code, item_type, item_name, uom, physical_qty, beginning_qty,
               incoming_qty_on_date, outgoing_qty_on_date, system_qty, variance_qty,
               adjustment_qty_signed, adjustment_type
        FROM stock_opname_items
        WHERE opname_id = ANY($1)
        ORDER BY opname_id, line_no
        "#,
    )
    .bind(opname_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<StockOpnameItem>> = HashMap::new();
    for row in rows {
        let opname_id = row.opname_id;
        grouped.entry(opname_id).or_default().push(row.try_into()?);
    }
    Ok(grouped)
}

async fn hydrate_opnames(conn: &mut PgConnection, rows: Vec<OpnameRow>) -> AppResult<Vec<StockOpname>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut items = load_opname_items(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let opname_items = items.remove(&row.id).unwrap_or_default();
            row.into_opname(opname_items)
        })
        .collect()
}

/// Status of an opname that the CAS update did not match, if it exists
async fn current_opname_status(
    conn: &mut PgConnection,
    company_code: &str,
    wms_id: &str,
) -> AppResult<OpnameTransition> {
    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM stock_opnames WHERE company_code = $1 AND wms_id = $2",
    )
    .bind(company_code)
    .bind(wms_id)
    .fetch_optional(&mut *conn)
    .await?;

    match status {
        Some(status) => Ok(OpnameTransition::Rejected(parse(&status)?)),
        None => Ok(OpnameTransition::NotFound),
    }
}

#[async_trait]
impl CompanyRepository for PgStore {
    async fn find_company(&self, code: &str) -> AppResult<Option<Company>> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "SELECT code, name, npwp, ppkek_number FROM companies WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Company {
            code: r.code,
            name: r.name,
            npwp: r.npwp,
            ppkek_number: r.ppkek_number,
        }))
    }
}

#[async_trait]
impl DocumentRepository for PgStore {
    async fn document_exists(
        &self,
        company_code: &str,
        transaction_type: TransactionType,
        wms_id: &str,
    ) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM inventory_documents
                WHERE company_code = $1 AND transaction_type = $2 AND wms_id = $3
            )
            "#,
        )
        .bind(company_code)
        .bind(transaction_type.as_str())
        .bind(wms_id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn insert_document(&self, document: &InventoryDocument) -> AppResult<TransmissionRecord> {
        let mut tx = self.db.begin().await?;
        let record = insert_document_rows(&mut *tx, document).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn find_document(&self, company_code: &str, id: Uuid) -> AppResult<Option<InventoryDocument>> {
        let Some(row) = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, company_code, wms_id, transaction_type, document_date, customs_code,
                   customs_number, customs_date, counterparty, created_at
            FROM inventory_documents
            WHERE id = $1 AND company_code = $2
            "#,
        )
        .bind(id)
        .bind(company_code)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, DocumentItemRow>(
            r#"
            SELECT item_code, item_type, item_name, uom, quantity, value_amount, currency, adjustment_type
            FROM inventory_document_items
            WHERE document_id = $1
            ORDER BY line_no
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(DocumentItemRow::into_item)
        .collect::<AppResult<Vec<_>>>()?;

        row.into_document(items).map(Some)
    }
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn movements_until(
        &self,
        company_code: &str,
        up_to: NaiveDate,
        filter: &MovementFilter,
    ) -> AppResult<Vec<StockMovement>> {
        let codes: Vec<String> = filter.keys.iter().map(|k| k.item_code.clone()).collect();

        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, company_code, item_code, item_type, item_name, uom, kind, direction,
                   quantity, movement_date, source_document_id
            FROM stock_movements
            WHERE company_code = $1
              AND movement_date <= $2
              AND ($3::text IS NULL OR item_type = $3)
              AND (cardinality($4::text[]) = 0 OR item_code = ANY($4))
            ORDER BY movement_date, id
            "#,
        )
        .bind(company_code)
        .bind(up_to)
        .bind(filter.item_type.as_deref())
        .bind(&codes)
        .fetch_all(&self.db)
        .await?;

        let mut movements = Vec::with_capacity(rows.len());
        for row in rows {
            let movement = StockMovement::try_from(row)?;
            // codes narrow the scan, the full key is checked here
            if filter.matches(&movement) {
                movements.push(movement);
            }
        }
        Ok(movements)
    }
}

#[async_trait]
impl OpnameRepository for PgStore {
    async fn opname_exists(&self, company_code: &str, wms_id: &str) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM stock_opnames WHERE company_code = $1 AND wms_id = $2)",
        )
        .bind(company_code)
        .bind(wms_id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn insert_opname(&self, opname: &StockOpname) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stock_opnames (id, company_code, wms_id, document_date, status, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(opname.id)
        .bind(&opname.company_code)
        .bind(&opname.wms_id)
        .bind(opname.document_date)
        .bind(opname.status.as_str())
        .bind(&opname.notes)
        .bind(opname.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateEntry("wms_id".to_string())
            } else {
                AppError::DatabaseError(e)
            }
        })?;

        for (line_no, item) in opname.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO stock_opname_items (opname_id, line_no, item_code, item_type, item_name, uom,
                                                physical_qty, beginning_qty, incoming_qty_on_date,
                                                outgoing_qty_on_date, system_qty, variance_qty,
                                                adjustment_qty_signed, adjustment_type)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(opname.id)
            .bind(line_no as i32)
            .bind(&item.item_code)
            .bind(&item.item_type)
            .bind(&item.item_name)
            .bind(&item.uom)
            .bind(item.physical_qty)
            .bind(item.beginning_qty)
            .bind(item.incoming_qty_on_date)
            .bind(item.outgoing_qty_on_date)
            .bind(item.system_qty)
            .bind(item.variance_qty)
            .bind(item.adjustment_qty_signed)
            .bind(item.adjustment_type.map(|t| t.as_str()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_opname(&self, company_code: &str, wms_id: &str) -> AppResult<Option<StockOpname>> {
        let mut conn = self.db.acquire().await?;
        let row = sqlx::query_as::<_, OpnameRow>(&format!(
            "SELECT {} FROM stock_opnames WHERE company_code = $1 AND wms_id = $2",
            OPNAME_COLUMNS
        ))
        .bind(company_code)
        .bind(wms_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(hydrate_opnames(&mut *conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_opname_by_id(&self, company_code: &str, id: Uuid) -> AppResult<Option<StockOpname>> {
        let mut conn = self.db.acquire().await?;
        let row = sqlx::query_as::<_, OpnameRow>(&format!(
            "SELECT {} FROM stock_opnames WHERE company_code = $1 AND id = $2",
            OPNAME_COLUMNS
        ))
        .bind(company_code)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(hydrate_opnames(&mut *conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_opnames(
        &self,
        company_code: &str,
        status: Option<OpnameStatus>,
    ) -> AppResult<Vec<StockOpname>> {
        let mut conn = self.db.acquire().await?;
        let rows = sqlx::query_as::<_, OpnameRow>(&format!(
            "SELECT {} FROM stock_opnames \
             WHERE company_code = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY document_date DESC, created_at DESC",
            OPNAME_COLUMNS
        ))
        .bind(company_code)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&mut *conn)
        .await?;

        hydrate_opnames(&mut *conn, rows).await
    }

    async fn confirm_opname(&self, company_code: &str, wms_id: &str) -> AppResult<OpnameTransition> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, OpnameRow>(&format!(
            "UPDATE stock_opnames SET status = 'CONFIRMED', confirmed_at = NOW() \
             WHERE company_code = $1 AND wms_id = $2 AND status = 'ACTIVE' \
             RETURNING {}",
            OPNAME_COLUMNS
        ))
        .bind(company_code)
        .bind(wms_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return current_opname_status(&mut *tx, company_code, wms_id).await;
        };

        let opname = hydrate_opnames(&mut *tx, vec![row])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("confirmed opname vanished".to_string()))?;

        insert_transmission(
            &mut *tx,
            &NewTransmission::new(company_code, TransactionType::StockOpname, opname.id, &opname.wms_id),
        )
        .await?;

        let adjustments = derive_adjustments(&opname.items);
        let adjustment_document = if adjustments.is_empty() {
            None
        } else {
            let document = InventoryDocument::adjustment_for(&opname, &adjustments);
            insert_document_rows(&mut *tx, &document).await?;
            Some(document)
        };

        tx.commit().await?;

        Ok(OpnameTransition::Applied {
            opname,
            adjustments,
            adjustment_document,
        })
    }

    async fn cancel_opname(&self, company_code: &str, wms_id: &str) -> AppResult<OpnameTransition> {
        let mut conn = self.db.acquire().await?;

        let row = sqlx::query_as::<_, OpnameRow>(&format!(
            "UPDATE stock_opnames SET status = 'CANCELLED', cancelled_at = NOW() \
             WHERE company_code = $1 AND wms_id = $2 AND status = 'ACTIVE' \
             RETURNING {}",
            OPNAME_COLUMNS
        ))
        .bind(company_code)
        .bind(wms_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let opname = hydrate_opnames(&mut *conn, vec![row])
                    .await?
                    .pop()
                    .ok_or_else(|| AppError::Internal("cancelled opname vanished".to_string()))?;
                Ok(OpnameTransition::Applied {
                    opname,
                    adjustments: Vec::new(),
                    adjustment_document: None,
                })
            }
            None => current_opname_status(&mut *conn, company_code, wms_id).await,
        }
    }
}

#[async_trait]
impl TransmissionRepository for PgStore {
    async fn claim_transmission(
        &self,
        company_code: &str,
        id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome> {
        let claimed = sqlx::query_as::<_, TransmissionRow>(&format!(
            "UPDATE transmission_records \
             SET status = 'SENT', sent_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND company_code = $2 \
               AND (status IN ('PENDING', 'FAILED') \
                    OR (status = 'SENT' AND (sent_at IS NULL OR sent_at < $3))) \
             RETURNING {}",
            TRANSMISSION_COLUMNS
        ))
        .bind(id)
        .bind(company_code)
        .bind(stale_before)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = claimed {
            let record: TransmissionRecord = row.try_into()?;
            let claimed_at = record
                .sent_at
                .ok_or_else(|| AppError::Internal(format!("Claimed transmission {} has no sent_at", id)))?;
            return Ok(ClaimOutcome::Claimed {
                token: ClaimToken { id, claimed_at },
                record,
            });
        }

        match self.find_transmission(company_code, id).await? {
            Some(record) => Ok(ClaimOutcome::Unavailable(record)),
            None => Ok(ClaimOutcome::NotFound),
        }
    }

    async fn mark_transmission_success(
        &self,
        claim: &ClaimToken,
        response: &serde_json::Value,
    ) -> AppResult<Option<TransmissionRecord>> {
        let row = sqlx::query_as::<_, TransmissionRow>(&format!(
            "UPDATE transmission_records \
             SET status = 'SUCCESS', response_payload = $3, error_message = NULL, retry_count = 0, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'SENT' AND sent_at = $2 \
             RETURNING {}",
            TRANSMISSION_COLUMNS
        ))
        .bind(claim.id)
        .bind(claim.claimed_at)
        .bind(response)
        .fetch_optional(&self.db)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn mark_transmission_failed(
        &self,
        claim: &ClaimToken,
        error: &str,
    ) -> AppResult<Option<TransmissionRecord>> {
        let row = sqlx::query_as::<_, TransmissionRow>(&format!(
            "UPDATE transmission_records \
             SET status = 'FAILED', error_message = $3, retry_count = retry_count + 1, updated_at = NOW() \
             WHERE id = $1 AND status = 'SENT' AND sent_at = $2 \
             RETURNING {}",
            TRANSMISSION_COLUMNS
        ))
        .bind(claim.id)
        .bind(claim.claimed_at)
        .bind(error)
        .fetch_optional(&self.db)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_transmission(&self, company_code: &str, id: Uuid) -> AppResult<Option<TransmissionRecord>> {
        let row = sqlx::query_as::<_, TransmissionRow>(&format!(
            "SELECT {} FROM transmission_records WHERE id = $1 AND company_code = $2",
            TRANSMISSION_COLUMNS
        ))
        .bind(id)
        .bind(company_code)
        .fetch_optional(&self.db)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_transmissions(
        &self,
        company_code: &str,
        filter: &TransmissionFilter,
    ) -> AppResult<Vec<TransmissionRecord>> {
        let rows = sqlx::query_as::<_, TransmissionRow>(&format!(
            "SELECT {} FROM transmission_records \
             WHERE company_code = $1 \
               AND ($2::text IS NULL OR transaction_type = $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY created_at DESC \
             LIMIT $4",
            TRANSMISSION_COLUMNS
        ))
        .bind(company_code)
        .bind(filter.transaction_type.map(|t| t.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.effective_limit())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn retryable_transmission_ids(
        &self,
        company_code: &str,
        transaction_type: Option<TransactionType>,
        limit: i64,
    ) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM transmission_records
            WHERE company_code = $1
              AND status IN ('PENDING', 'FAILED')
              AND ($2::text IS NULL OR transaction_type = $2)
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(company_code)
        .bind(transaction_type.map(|t| t.as_str()))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
