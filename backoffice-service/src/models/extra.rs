//! Extra billing entries: one-off services billed to the automatic extra
//! client, each backed by a receivable and an EXTRA workflow record.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::expense::ExpenseStatus;
use super::ledger::validate_amount;

pub const EXTRA_CLIENT_NAME: &str = "CLIENTE EXTRA (AUTO)";
pub const EXTRA_CLIENT_TAX_ID: &str = "00000000000";
pub const EXTRA_SUPPLIER_NAME: &str = "LANÇAMENTOS EXTRAS (AUTO)";
pub const EXTRA_SUPPLIER_TAX_ID: &str = "00000000000000";
pub const EXTRA_KIND_LABEL: &str = "Extra";

/// Label shown for entries whose workflow record has not been created.
pub const NO_WORKFLOW_LABEL: &str = "Pendente";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExtraEntry {
    pub extra_id: i64,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub kind_label: String,
    pub amount: Decimal,
    pub provider_company_id: i64,
    pub receiving_bank_id: i64,
    pub administrative_user_id: i64,
    pub coverage_start: Option<NaiveDate>,
    pub coverage_end: Option<NaiveDate>,
    pub service_taker_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub absence_reason_id: Option<i64>,
    pub absent_employee_id: Option<i64>,
    pub receivable_id: Option<i64>,
    pub expense_id: Option<i64>,
}

impl ExtraEntry {
    /// Document number of the receivable billing this entry.
    pub fn receivable_document(&self) -> String {
        receivable_document(&self.invoice_number)
    }

    pub fn receivable_notes(&self) -> String {
        format!("Tipo: {} | NF: {}", self.kind_label, self.invoice_number)
    }

    pub fn workflow_notes(&self) -> String {
        format!("Origem: {} | NF: {}", self.kind_label, self.invoice_number)
    }
}

pub fn receivable_document(invoice_number: &str) -> String {
    format!("EXTRA-{}", invoice_number)
}

/// Create or update an extra entry. Invoice number and issue date are
/// assigned by the service.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExtraInput {
    pub due_date: NaiveDate,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Decimal,
    pub provider_company_id: i64,
    pub receiving_bank_id: i64,
    pub administrative_user_id: i64,
    pub coverage_start: Option<NaiveDate>,
    pub coverage_end: Option<NaiveDate>,
    pub service_taker_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub absence_reason_id: Option<i64>,
    pub absent_employee_id: Option<i64>,
}

/// Listing row: the entry plus the status of its workflow record.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExtraListRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub entry: ExtraEntry,
    #[serde(skip)]
    pub workflow_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtraSummary {
    #[serde(flatten)]
    pub entry: ExtraEntry,
    pub workflow_label: &'static str,
}

impl From<ExtraListRow> for ExtraSummary {
    fn from(row: ExtraListRow) -> Self {
        Self {
            workflow_label: workflow_label(row.workflow_status.as_deref()),
            entry: row.entry,
        }
    }
}

pub fn workflow_label(status: Option<&str>) -> &'static str {
    status
        .and_then(ExpenseStatus::from_code)
        .map(|s| s.label())
        .unwrap_or(NO_WORKFLOW_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_texts_embed_invoice_number() {
        let entry = ExtraEntry {
            extra_id: 1,
            invoice_number: "LE0007".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
            kind_label: EXTRA_KIND_LABEL.to_string(),
            amount: Decimal::new(1000, 0),
            provider_company_id: 1,
            receiving_bank_id: 1,
            administrative_user_id: 1,
            coverage_start: None,
            coverage_end: None,
            service_taker_id: None,
            branch_id: None,
            absence_reason_id: None,
            absent_employee_id: None,
            receivable_id: None,
            expense_id: None,
        };
        assert_eq!(entry.receivable_document(), "EXTRA-LE0007");
        assert_eq!(entry.receivable_notes(), "Tipo: Extra | NF: LE0007");
        assert_eq!(entry.workflow_notes(), "Origem: Extra | NF: LE0007");
    }

    #[test]
    fn listing_label_falls_back_to_pending() {
        assert_eq!(workflow_label(None), "Pendente");
        assert_eq!(workflow_label(Some("AGUARDANDO_ADM")), "Aguardando Administrativo");
        assert_eq!(workflow_label(Some("PAGO")), "Pago / Finalizado");
    }
}
