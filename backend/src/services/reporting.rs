//! Stock mutation reporting and CSV export

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use shared::{mutation_report, DateRange, MutationRow};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{permissions, AuthContext};
use crate::repository::{MovementFilter, Store};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn Store>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Beginning, in, out, adjustment and ending quantities per item for `[from, to]`
    pub async fn mutation_report(
        &self,
        ctx: &AuthContext,
        from: NaiveDate,
        to: NaiveDate,
        item_type: Option<String>,
    ) -> AppResult<Vec<MutationRow>> {
        ctx.require(permissions::REPORT_READ)?;

        let range = DateRange::new(from, to).map_err(|msg| AppError::validation("from", msg))?;

        let filter = MovementFilter {
            item_type: item_type.filter(|t| !t.trim().is_empty()),
            keys: Vec::new(),
        };
        let movements = self
            .store
            .movements_until(&ctx.company_code, range.to, &filter)
            .await?;

        let rows = mutation_report(&movements, range);
        tracing::debug!(company = %ctx.company_code, rows = rows.len(), "Built mutation report");
        Ok(rows)
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_csv_export_has_header_and_rounded_quantities() {
        let rows = vec![MutationRow {
            item_type: "raw_material".to_string(),
            item_code: "RM-01".to_string(),
            item_name: "Resin".to_string(),
            uom: "KGM".to_string(),
            beginning: Decimal::new(10005, 3),
            incoming: Decimal::new(5, 0),
            outgoing: Decimal::ZERO,
            adjustment: Decimal::new(-1, 0),
            ending: Decimal::new(14005, 3),
        }];

        let csv = ReportingService::export_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("item_type,item_code,item_name,uom,beginning,incoming,outgoing,adjustment,ending")
        );
        assert_eq!(lines.next(), Some("raw_material,RM-01,Resin,KGM,10.01,5,0,-1,14.01"));
    }
}
