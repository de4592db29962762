//! Expense records moving through the approval workflow.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use validator::Validate;

use super::ledger::validate_amount;

/// Expense type, fixed when the record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseKind {
    /// Petty-cash claim.
    #[default]
    Caixinha,
    /// Absence-coverage reimbursement request.
    Solicitacao,
    /// Generated from an extra billing entry.
    Extra,
}

impl ExpenseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caixinha => "CAIXINHA",
            Self::Solicitacao => "SOLICITACAO",
            Self::Extra => "EXTRA",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "CAIXINHA" => Some(Self::Caixinha),
            "SOLICITACAO" => Some(Self::Solicitacao),
            "EXTRA" => Some(Self::Extra),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Caixinha => "Caixinha",
            Self::Solicitacao => "Solicitação",
            Self::Extra => "Extra",
        }
    }
}

/// Workflow status, in approval order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ExpenseStatus {
    #[serde(rename = "AGUARDANDO_ADM")]
    AwaitingAdmin,
    #[serde(rename = "AGUARDANDO_RH")]
    AwaitingHr,
    #[serde(rename = "AGUARDANDO_FIN")]
    AwaitingFinance,
    #[serde(rename = "DIRECIONADO_OP")]
    DirectedToOperator,
    #[serde(rename = "PAGO")]
    Paid,
    #[serde(rename = "CANCELADO")]
    Cancelled,
    /// Legacy draft state, still editable by its requester.
    #[serde(rename = "RASCUNHO")]
    Draft,
}

impl ExpenseStatus {
    pub const ALL: [ExpenseStatus; 7] = [
        ExpenseStatus::AwaitingAdmin,
        ExpenseStatus::AwaitingHr,
        ExpenseStatus::AwaitingFinance,
        ExpenseStatus::DirectedToOperator,
        ExpenseStatus::Paid,
        ExpenseStatus::Cancelled,
        ExpenseStatus::Draft,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingAdmin => "AGUARDANDO_ADM",
            Self::AwaitingHr => "AGUARDANDO_RH",
            Self::AwaitingFinance => "AGUARDANDO_FIN",
            Self::DirectedToOperator => "DIRECIONADO_OP",
            Self::Paid => "PAGO",
            Self::Cancelled => "CANCELADO",
            Self::Draft => "RASCUNHO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == code)
    }

    /// Display label shown to users and written to the audit log.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingAdmin => "Aguardando Administrativo",
            Self::AwaitingHr => "Aguardando RH",
            Self::AwaitingFinance => "Aguardando Financeiro",
            Self::DirectedToOperator => "Direcionado ao Operador",
            Self::Paid => "Pago / Finalizado",
            Self::Cancelled => "Cancelado",
            Self::Draft => "Rascunho",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "PIX")]
    Pix,
    #[serde(rename = "BANCO")]
    BankTransfer,
    #[serde(rename = "DINHEIRO")]
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "PIX",
            Self::BankTransfer => "BANCO",
            Self::Cash => "DINHEIRO",
        }
    }
}

/// Expense workflow record.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Expense {
    pub expense_id: i64,
    pub kind: String,
    pub expense_date: NaiveDate,
    pub supplier_id: i64,
    pub amount: Decimal,
    pub notes: String,
    pub requester_id: i64,
    pub status: String,
    pub receipt_ref: Option<String>,
    pub coverage_start: Option<NaiveDate>,
    pub coverage_end: Option<NaiveDate>,
    pub service_taker_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub absence_reason_id: Option<i64>,
    pub absent_employee_id: Option<i64>,
    pub covered_by_name: Option<String>,
    pub payment_method: Option<String>,
    pub payment_details: Option<String>,
    pub paying_company_id: Option<i64>,
    pub paying_bank_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub cancellation_reason: String,
    pub updated_utc: DateTime<Utc>,
}

impl Expense {
    /// Parsed type. The column is constrained, so the fallback is never hit.
    pub fn kind(&self) -> ExpenseKind {
        ExpenseKind::from_code(&self.kind).unwrap_or_default()
    }

    /// Parsed status. The column is constrained, so the fallback is never hit.
    pub fn status(&self) -> ExpenseStatus {
        ExpenseStatus::from_code(&self.status).unwrap_or(ExpenseStatus::Draft)
    }

    /// Reference carried by the payable created when this expense is paid.
    pub fn payable_reference(&self) -> String {
        payable_reference(self.expense_id)
    }
}

pub fn payable_reference(expense_id: i64) -> String {
    format!("WF-{}", expense_id)
}

/// Editable fields, used for lock-down rules and change tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseField {
    Kind,
    Requester,
    ExpenseDate,
    Supplier,
    Amount,
    Notes,
    Receipt,
    CoverageStart,
    CoverageEnd,
    ServiceTaker,
    Branch,
    AbsenceReason,
    AbsentEmployee,
    CoveredByName,
    PaymentMethod,
    PaymentDetails,
    PayingCompany,
    PayingBank,
    Operator,
    Status,
    CancellationReason,
    UpdatedUtc,
}

impl ExpenseField {
    pub const ALL: [ExpenseField; 22] = [
        ExpenseField::Kind,
        ExpenseField::Requester,
        ExpenseField::ExpenseDate,
        ExpenseField::Supplier,
        ExpenseField::Amount,
        ExpenseField::Notes,
        ExpenseField::Receipt,
        ExpenseField::CoverageStart,
        ExpenseField::CoverageEnd,
        ExpenseField::ServiceTaker,
        ExpenseField::Branch,
        ExpenseField::AbsenceReason,
        ExpenseField::AbsentEmployee,
        ExpenseField::CoveredByName,
        ExpenseField::PaymentMethod,
        ExpenseField::PaymentDetails,
        ExpenseField::PayingCompany,
        ExpenseField::PayingBank,
        ExpenseField::Operator,
        ExpenseField::Status,
        ExpenseField::CancellationReason,
        ExpenseField::UpdatedUtc,
    ];

    /// Fields filled in by the requester when the record is created.
    pub const SUBMITTER: [ExpenseField; 15] = [
        ExpenseField::Requester,
        ExpenseField::ExpenseDate,
        ExpenseField::Supplier,
        ExpenseField::Amount,
        ExpenseField::Notes,
        ExpenseField::Receipt,
        ExpenseField::CoverageStart,
        ExpenseField::CoverageEnd,
        ExpenseField::ServiceTaker,
        ExpenseField::Branch,
        ExpenseField::AbsenceReason,
        ExpenseField::AbsentEmployee,
        ExpenseField::CoveredByName,
        ExpenseField::PaymentMethod,
        ExpenseField::PaymentDetails,
    ];

    /// Field name used in validation errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::Requester => "requester_id",
            Self::ExpenseDate => "expense_date",
            Self::Supplier => "supplier_id",
            Self::Amount => "amount",
            Self::Notes => "notes",
            Self::Receipt => "receipt_ref",
            Self::CoverageStart => "coverage_start",
            Self::CoverageEnd => "coverage_end",
            Self::ServiceTaker => "service_taker_id",
            Self::Branch => "branch_id",
            Self::AbsenceReason => "absence_reason_id",
            Self::AbsentEmployee => "absent_employee_id",
            Self::CoveredByName => "covered_by_name",
            Self::PaymentMethod => "payment_method",
            Self::PaymentDetails => "payment_details",
            Self::PayingCompany => "paying_company_id",
            Self::PayingBank => "paying_bank_id",
            Self::Operator => "operator_id",
            Self::Status => "status",
            Self::CancellationReason => "cancellation_reason",
            Self::UpdatedUtc => "updated_utc",
        }
    }
}

/// Submission of a new expense. Requester and status are decided by the
/// workflow, not by the caller.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewExpense {
    #[serde(default)]
    pub kind: ExpenseKind,
    pub expense_date: Option<NaiveDate>,
    pub supplier_id: i64,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Decimal,
    #[serde(default)]
    pub notes: String,
    #[validate(length(max = 255))]
    pub receipt_ref: Option<String>,
    pub coverage_start: Option<NaiveDate>,
    pub coverage_end: Option<NaiveDate>,
    pub service_taker_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub absence_reason_id: Option<i64>,
    pub absent_employee_id: Option<i64>,
    #[validate(length(max = 150))]
    pub covered_by_name: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_details: Option<String>,
}

/// Partial update of an expense. Omitted fields keep their stored value;
/// an explicit `null` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ExpenseChanges {
    pub requester_id: Option<i64>,
    pub expense_date: Option<NaiveDate>,
    pub supplier_id: Option<i64>,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Option<Decimal>,
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 255))]
    pub receipt_ref: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub coverage_start: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub coverage_end: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub service_taker_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub branch_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub absence_reason_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub absent_employee_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 150))]
    pub covered_by_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub payment_method: Option<Option<PaymentMethod>>,
    #[serde(default, deserialize_with = "nullable")]
    pub payment_details: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub paying_company_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub paying_bank_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub operator_id: Option<Option<i64>>,
    pub status: Option<ExpenseStatus>,
    pub cancellation_reason: Option<String>,
}

/// A present key, `null` included, becomes `Some`; a missing key falls back
/// to the field default (`None`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn assign<T: PartialEq>(
    slot: &mut T,
    value: Option<T>,
    field: ExpenseField,
    changed: &mut BTreeSet<ExpenseField>,
) {
    if let Some(value) = value {
        if *slot != value {
            *slot = value;
            changed.insert(field);
        }
    }
}

/// Names of people who covered an absence are stored upper-case.
pub fn normalize_covered_by(name: Option<String>) -> Option<String> {
    name.map(|n| n.to_uppercase())
}

impl ExpenseChanges {
    /// The record as it would look after the update, and the fields whose
    /// value actually changes.
    pub fn apply(&self, current: &Expense) -> (Expense, BTreeSet<ExpenseField>) {
        let mut next = current.clone();
        let mut changed = BTreeSet::new();
        let c = &mut changed;

        assign(&mut next.requester_id, self.requester_id, ExpenseField::Requester, c);
        assign(&mut next.expense_date, self.expense_date, ExpenseField::ExpenseDate, c);
        assign(&mut next.supplier_id, self.supplier_id, ExpenseField::Supplier, c);
        assign(&mut next.amount, self.amount, ExpenseField::Amount, c);
        assign(&mut next.notes, self.notes.clone(), ExpenseField::Notes, c);
        assign(
            &mut next.receipt_ref,
            self.receipt_ref.clone(),
            ExpenseField::Receipt,
            c,
        );
        assign(
            &mut next.coverage_start,
            self.coverage_start,
            ExpenseField::CoverageStart,
            c,
        );
        assign(
            &mut next.coverage_end,
            self.coverage_end,
            ExpenseField::CoverageEnd,
            c,
        );
        assign(
            &mut next.service_taker_id,
            self.service_taker_id,
            ExpenseField::ServiceTaker,
            c,
        );
        assign(&mut next.branch_id, self.branch_id, ExpenseField::Branch, c);
        assign(
            &mut next.absence_reason_id,
            self.absence_reason_id,
            ExpenseField::AbsenceReason,
            c,
        );
        assign(
            &mut next.absent_employee_id,
            self.absent_employee_id,
            ExpenseField::AbsentEmployee,
            c,
        );
        assign(
            &mut next.covered_by_name,
            self.covered_by_name.clone().map(normalize_covered_by),
            ExpenseField::CoveredByName,
            c,
        );
        assign(
            &mut next.payment_method,
            self.payment_method
                .map(|m| m.map(|m| m.as_str().to_string())),
            ExpenseField::PaymentMethod,
            c,
        );
        assign(
            &mut next.payment_details,
            self.payment_details.clone(),
            ExpenseField::PaymentDetails,
            c,
        );
        assign(
            &mut next.paying_company_id,
            self.paying_company_id,
            ExpenseField::PayingCompany,
            c,
        );
        assign(
            &mut next.paying_bank_id,
            self.paying_bank_id,
            ExpenseField::PayingBank,
            c,
        );
        assign(&mut next.operator_id, self.operator_id, ExpenseField::Operator, c);
        assign(
            &mut next.status,
            self.status.map(|s| s.as_str().to_string()),
            ExpenseField::Status,
            c,
        );
        assign(
            &mut next.cancellation_reason,
            self.cancellation_reason.clone(),
            ExpenseField::CancellationReason,
            c,
        );

        (next, changed)
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExpenseLog {
    pub log_id: i64,
    pub expense_id: i64,
    pub user_id: i64,
    pub role_label: String,
    pub action: String,
    pub created_utc: DateTime<Utc>,
    pub note: String,
}

/// Action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Created,
    Edited,
    Finalized,
    CancelledReceivableRemoved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Criou Registro",
            Self::Edited => "Editou",
            Self::Finalized => "FINALIZOU (PAGO)",
            Self::CancelledReceivableRemoved => "CANCELOU (CR Excluído)",
        }
    }
}

/// Filters for the expense listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseFilter {
    pub kind: Option<ExpenseKind>,
    pub status: Option<ExpenseStatus>,
    pub supplier_id: Option<i64>,
}

/// Totals per status over the records a user can see.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatusSummary {
    pub status: String,
    #[sqlx(skip)]
    pub label: &'static str,
    pub total_amount: Decimal,
    pub total_count: i64,
}

impl StatusSummary {
    pub fn with_label(mut self) -> Self {
        self.label = ExpenseStatus::from_code(&self.status)
            .map(|s| s.label())
            .unwrap_or_default();
        self
    }
}

/// What a user may do with a record: the statuses offered and the fields
/// that stay read-only.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseForm {
    pub can_edit: bool,
    pub allowed_statuses: Vec<ExpenseStatus>,
    pub locked_fields: Vec<ExpenseField>,
}
