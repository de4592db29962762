//! Consolidated balance: one mirror row per settled payable/receivable.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ledger::{LedgerKind, LedgerStatus};

/// Name written when a record was settled without a known user.
pub const SYSTEM_USER_LABEL: &str = "Sistema";

/// Stored mirror row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub balance_entry_id: i64,
    pub origin: String,
    pub origin_id: i64,
    pub name: String,
    pub company: String,
    pub issue_date: NaiveDate,
    pub bank: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: String,
    pub settlement_date: Option<NaiveDate>,
    pub settled_by: Option<String>,
}

/// A payable or receivable joined with the display names the mirror keeps.
#[derive(Debug, Clone, FromRow)]
pub struct MirrorSource {
    pub origin_id: i64,
    pub counterpart: String,
    pub company: String,
    pub bank: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: String,
    pub settlement_date: Option<NaiveDate>,
    pub settled_by: Option<String>,
}

/// Values to upsert into the mirror, keyed by `(origin, origin_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceMirror {
    pub origin: &'static str,
    pub origin_id: i64,
    pub name: String,
    pub company: String,
    pub issue_date: NaiveDate,
    pub bank: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: String,
    pub settlement_date: Option<NaiveDate>,
    pub settled_by: String,
}

impl BalanceMirror {
    /// Mirror row for `source`, or `None` when the source is not paid and
    /// therefore must not appear in the balance.
    pub fn from_source(kind: LedgerKind, source: MirrorSource) -> Option<Self> {
        if LedgerStatus::from_code(&source.status) != Some(LedgerStatus::Paid) {
            return None;
        }

        Some(Self {
            origin: kind.origin(),
            origin_id: source.origin_id,
            name: source.counterpart,
            company: source.company,
            issue_date: source.issue_date,
            bank: source.bank,
            due_date: source.due_date,
            amount: kind.signed(source.amount),
            status: source.status,
            settlement_date: source.settlement_date,
            settled_by: source
                .settled_by
                .unwrap_or_else(|| SYSTEM_USER_LABEL.to_string()),
        })
    }
}

/// Filters for the read-only balance listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceFilter {
    pub settled_from: Option<NaiveDate>,
    pub settled_to: Option<NaiveDate>,
    pub origin: Option<LedgerKind>,
    pub company: Option<String>,
    pub bank: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(status: &str, settled_by: Option<&str>) -> MirrorSource {
        MirrorSource {
            origin_id: 42,
            counterpart: "Fornecedor X".to_string(),
            company: "Empresa".to_string(),
            bank: "Banco".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
            amount: Decimal::new(10000, 2),
            status: status.to_string(),
            settlement_date: NaiveDate::from_ymd_opt(2024, 1, 29),
            settled_by: settled_by.map(str::to_string),
        }
    }

    #[test]
    fn paid_payable_mirrors_negative() {
        let mirror = BalanceMirror::from_source(LedgerKind::Payable, source("PAGO", Some("maria")))
            .expect("paid records are mirrored");
        assert_eq!(mirror.origin, "CP");
        assert_eq!(mirror.origin_id, 42);
        assert_eq!(mirror.amount, Decimal::new(-10000, 2));
        assert_eq!(mirror.settled_by, "maria");
    }

    #[test]
    fn paid_receivable_mirrors_positive_with_system_user() {
        let mirror =
            BalanceMirror::from_source(LedgerKind::Receivable, source("PAGO", None)).unwrap();
        assert_eq!(mirror.origin, "CR");
        assert_eq!(mirror.amount, Decimal::new(10000, 2));
        assert_eq!(mirror.settled_by, SYSTEM_USER_LABEL);
    }

    #[test]
    fn unpaid_records_have_no_mirror() {
        assert!(BalanceMirror::from_source(LedgerKind::Payable, source("PENDENTE", None)).is_none());
        assert!(
            BalanceMirror::from_source(LedgerKind::Receivable, source("CANCELADO", None)).is_none()
        );
    }
}
