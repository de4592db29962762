//! Financial dashboard as of a reference date.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Whether the dashboard shows today or a date picked by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeMode {
    #[serde(rename = "ATUAL")]
    Current,
    #[serde(rename = "HISTORICO")]
    Historical,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub date: Option<String>,
}

/// Resolve the reference date. Missing or unparsable input means today.
pub fn parse_reference_date(raw: Option<&str>, today: NaiveDate) -> (NaiveDate, TimeMode) {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        .map(|d| (d, TimeMode::Historical))
        .unwrap_or((today, TimeMode::Current))
}

/// Settled movement through one bank up to the reference date.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankBalance {
    pub bank_id: i64,
    pub bank_name: String,
    pub inflows: Decimal,
    pub outflows: Decimal,
    pub balance: Decimal,
}

/// Pending records split around the reference date.
#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct DueSummary {
    pub overdue_count: i64,
    pub overdue_total: Decimal,
    pub upcoming_count: i64,
    pub upcoming_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub reference_date: NaiveDate,
    pub mode: TimeMode,
    pub banks: Vec<BankBalance>,
    pub overall_balance: Decimal,
    pub payables: DueSummary,
    pub receivables: DueSummary,
}

impl Dashboard {
    pub fn new(
        reference_date: NaiveDate,
        mode: TimeMode,
        banks: Vec<BankBalance>,
        payables: DueSummary,
        receivables: DueSummary,
    ) -> Self {
        let overall_balance = banks.iter().map(|b| b.balance).sum();
        Self {
            reference_date,
            mode,
            banks,
            overall_balance,
            payables,
            receivables,
        }
    }
}
