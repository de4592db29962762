//! Payables and receivables.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// Settlement status shared by payables and receivables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LedgerStatus {
    #[serde(rename = "PENDENTE")]
    #[default]
    Pending,
    #[serde(rename = "PAGO")]
    Paid,
    #[serde(rename = "CANCELADO")]
    Cancelled,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDENTE",
            Self::Paid => "PAGO",
            Self::Cancelled => "CANCELADO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PENDENTE" => Some(Self::Pending),
            "PAGO" => Some(Self::Paid),
            "CANCELADO" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which ledger a record lives in. Doubles as the balance mirror origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerKind {
    #[serde(rename = "CP")]
    Payable,
    #[serde(rename = "CR")]
    Receivable,
}

impl LedgerKind {
    pub fn origin(&self) -> &'static str {
        match self {
            Self::Payable => "CP",
            Self::Receivable => "CR",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Payable => "payables",
            Self::Receivable => "receivables",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            Self::Payable => "payable_id",
            Self::Receivable => "receivable_id",
        }
    }

    pub fn prefix(&self) -> DocumentPrefix {
        match self {
            Self::Payable => DocumentPrefix::Payable,
            Self::Receivable => DocumentPrefix::Receivable,
        }
    }

    /// Money leaves through payables and enters through receivables.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Payable => -amount,
            Self::Receivable => amount,
        }
    }
}

/// Named counters used to number documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPrefix {
    Payable,
    Receivable,
    Extra,
}

impl DocumentPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payable => "CP",
            Self::Receivable => "CR",
            Self::Extra => "LE",
        }
    }

    /// Render an allocated counter value: `CP-00042`, `CR-00007`, `LE0003`.
    pub fn format(&self, number: i32) -> String {
        match self {
            Self::Extra => format!("{}{:04}", self.as_str(), number),
            _ => format!("{}-{:05}", self.as_str(), number),
        }
    }
}

/// Settlement date and settling user after a save.
///
/// The date is stamped with `today` the first time the record is paid and
/// is never overwritten afterwards; the same holds for the settling user.
pub fn stamp_settlement(
    status: LedgerStatus,
    settlement_date: Option<NaiveDate>,
    settled_by: Option<i64>,
    actor_id: i64,
    today: NaiveDate,
) -> (Option<NaiveDate>, Option<i64>) {
    if status == LedgerStatus::Paid {
        (
            settlement_date.or(Some(today)),
            settled_by.or(Some(actor_id)),
        )
    } else {
        (settlement_date, settled_by)
    }
}

/// Outgoing ledger entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payable {
    pub payable_id: i64,
    pub supplier_id: i64,
    pub paying_company_id: i64,
    pub bank_id: i64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub document_number: String,
    pub amount: Decimal,
    pub notes: String,
    pub accounting_account: String,
    pub status: String,
    pub settlement_date: Option<NaiveDate>,
    pub settled_by: Option<i64>,
}

/// Incoming ledger entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Receivable {
    pub receivable_id: i64,
    pub client_id: i64,
    pub provider_company_id: i64,
    pub bank_id: i64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub document_number: String,
    pub amount: Decimal,
    pub hours_schedule: String,
    pub notes: String,
    pub status: String,
    pub settlement_date: Option<NaiveDate>,
    pub settled_by: Option<i64>,
}

pub(crate) fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() {
        return Err(service_core::error::field_error(
            "negative_amount",
            "Amount cannot be negative",
        ));
    }
    Ok(())
}

/// Create or replace a payable. Leaving `document_number` empty allocates
/// the next `CP` number.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PayableInput {
    pub supplier_id: i64,
    pub paying_company_id: i64,
    pub bank_id: i64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[validate(length(max = 50))]
    pub document_number: Option<String>,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Decimal,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub accounting_account: String,
    #[serde(default)]
    pub status: LedgerStatus,
    pub settlement_date: Option<NaiveDate>,
}

/// Create or replace a receivable. Leaving `document_number` empty
/// allocates the next `CR` number.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceivableInput {
    pub client_id: i64,
    pub provider_company_id: i64,
    pub bank_id: i64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[validate(length(max = 50))]
    pub document_number: Option<String>,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Decimal,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub hours_schedule: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: LedgerStatus,
    pub settlement_date: Option<NaiveDate>,
}

/// Detailed situation used to filter ledger listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Situation {
    /// Pending and due before today.
    Overdue,
    /// Pending and due today or later.
    Upcoming,
    Paid,
    Cancelled,
}

impl Situation {
    pub fn matches(&self, status: LedgerStatus, due_date: NaiveDate, today: NaiveDate) -> bool {
        match self {
            Self::Overdue => status == LedgerStatus::Pending && due_date < today,
            Self::Upcoming => status == LedgerStatus::Pending && due_date >= today,
            Self::Paid => status == LedgerStatus::Paid,
            Self::Cancelled => status == LedgerStatus::Cancelled,
        }
    }

    /// Status plus due-date window (`due < before`, `due >= from`) selecting
    /// the same records as [`Situation::matches`].
    pub fn bounds(
        &self,
        today: NaiveDate,
    ) -> (LedgerStatus, Option<NaiveDate>, Option<NaiveDate>) {
        match self {
            Self::Overdue => (LedgerStatus::Pending, Some(today), None),
            Self::Upcoming => (LedgerStatus::Pending, None, Some(today)),
            Self::Paid => (LedgerStatus::Paid, None, None),
            Self::Cancelled => (LedgerStatus::Cancelled, None, None),
        }
    }
}

/// Filters for payable/receivable listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerFilter {
    pub situation: Option<Situation>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub company_id: Option<i64>,
    pub search: Option<String>,
}

/// Mass status change applied to a selection of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Settle: status Paid, settlement date today, settled by the actor.
    MarkPaid,
    MarkCancelled,
    /// Back to pending, clearing settlement date and user.
    MarkPending,
}

impl BulkAction {
    pub fn target(&self) -> LedgerStatus {
        match self {
            Self::MarkPaid => LedgerStatus::Paid,
            Self::MarkCancelled => LedgerStatus::Cancelled,
            Self::MarkPending => LedgerStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn document_numbers_are_zero_padded() {
        assert_eq!(DocumentPrefix::Payable.format(1), "CP-00001");
        assert_eq!(DocumentPrefix::Receivable.format(12345), "CR-12345");
        assert_eq!(DocumentPrefix::Extra.format(7), "LE0007");
    }

    #[test]
    fn settlement_is_stamped_on_first_payment() {
        let today = day(2024, 5, 10);
        let (date, by) = stamp_settlement(LedgerStatus::Paid, None, None, 3, today);
        assert_eq!(date, Some(today));
        assert_eq!(by, Some(3));
    }

    #[test]
    fn settlement_is_never_overwritten() {
        let first = day(2024, 5, 10);
        let later = day(2024, 6, 1);
        let (date, by) = stamp_settlement(LedgerStatus::Paid, Some(first), Some(3), 9, later);
        assert_eq!(date, Some(first));
        assert_eq!(by, Some(3));
    }

    #[test]
    fn pending_records_are_not_stamped() {
        let (date, by) = stamp_settlement(LedgerStatus::Pending, None, None, 3, day(2024, 1, 1));
        assert_eq!(date, None);
        assert_eq!(by, None);
    }

    #[test]
    fn payables_mirror_as_negative_values() {
        let amount = Decimal::new(15050, 2);
        assert_eq!(LedgerKind::Payable.signed(amount), Decimal::new(-15050, 2));
        assert_eq!(LedgerKind::Receivable.signed(amount), amount);
    }

    #[test]
    fn situations_split_pending_by_due_date() {
        let today = day(2024, 3, 15);
        assert!(Situation::Overdue.matches(LedgerStatus::Pending, day(2024, 3, 14), today));
        assert!(!Situation::Overdue.matches(LedgerStatus::Pending, today, today));
        assert!(Situation::Upcoming.matches(LedgerStatus::Pending, today, today));
        assert!(!Situation::Upcoming.matches(LedgerStatus::Paid, today, today));
        assert!(Situation::Paid.matches(LedgerStatus::Paid, day(2020, 1, 1), today));
    }

    #[test]
    fn situation_bounds_agree_with_matches() {
        let today = day(2024, 3, 15);
        let dues = [day(2024, 3, 1), today, day(2024, 4, 1)];
        let statuses = [LedgerStatus::Pending, LedgerStatus::Paid, LedgerStatus::Cancelled];
        for situation in [
            Situation::Overdue,
            Situation::Upcoming,
            Situation::Paid,
            Situation::Cancelled,
        ] {
            let (status, before, from) = situation.bounds(today);
            for s in statuses {
                for due in dues {
                    let selected = s == status
                        && before.map_or(true, |b| due < b)
                        && from.map_or(true, |f| due >= f);
                    assert_eq!(selected, situation.matches(s, due, today), "{situation:?} {s} {due}");
                }
            }
        }
    }

    #[test]
    fn negative_amounts_fail_validation() {
        assert!(validate_amount(&Decimal::new(-1, 0)).is_err());
        assert!(validate_amount(&Decimal::ZERO).is_ok());
    }
}
