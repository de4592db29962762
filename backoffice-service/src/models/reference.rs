//! Reference data: banks, companies, clients, suppliers and the lists used
//! to describe an absence-coverage request.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::expense::ExpenseKind;

/// Marker carried by records the system creates on its own.
pub const AUTO_MARKER: &str = "(AUTO)";

/// Reference lists whose records are just an id and a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Catalog {
    Banks,
    Companies,
    ServiceTypes,
    AbsenceReasons,
    ServiceTakers,
}

impl Catalog {
    pub const ALL: [Catalog; 5] = [
        Self::Banks,
        Self::Companies,
        Self::ServiceTypes,
        Self::AbsenceReasons,
        Self::ServiceTakers,
    ];

    /// HTTP collection path, e.g. `/service-types`.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Banks => "/banks",
            Self::Companies => "/companies",
            Self::ServiceTypes => "/service-types",
            Self::AbsenceReasons => "/absence-reasons",
            Self::ServiceTakers => "/service-takers",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Banks => "banks",
            Self::Companies => "companies",
            Self::ServiceTypes => "service_types",
            Self::AbsenceReasons => "absence_reasons",
            Self::ServiceTakers => "service_takers",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            Self::Banks => "bank_id",
            Self::Companies => "company_id",
            Self::ServiceTypes => "service_type_id",
            Self::AbsenceReasons => "absence_reason_id",
            Self::ServiceTakers => "service_taker_id",
        }
    }

    pub fn max_name_len(&self) -> usize {
        match self {
            Self::ServiceTakers => 200,
            _ => 100,
        }
    }
}

impl std::fmt::Display for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// Bank, company, service type, absence reason or service taker.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NamedRecord {
    pub id: i64,
    pub name: String,
}

impl NamedRecord {
    pub fn is_auto(&self) -> bool {
        self.name.contains(AUTO_MARKER)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NamedInput {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Branch {
    pub branch_id: i64,
    pub name: String,
    pub cnpj: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BranchInput {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 20))]
    pub cnpj: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: i64,
    pub name: String,
    pub cpf: String,
    pub department: String,
    pub company: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EmployeeInput {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "CPF is required"))]
    pub cpf: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub department: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub company: String,
}

/// Contract type of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClientKind {
    #[serde(rename = "FIXO")]
    Fixed,
    #[serde(rename = "EVENTUAL")]
    #[default]
    Eventual,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "FIXO",
            Self::Eventual => "EVENTUAL",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub client_id: i64,
    pub legal_name: String,
    pub tax_id: String,
    pub due_day: i32,
    pub contract_value: Decimal,
    pub activity_description: String,
    pub receipt_method: String,
    pub kind: String,
    pub created_utc: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClientInput {
    #[validate(length(min = 1, max = 200, message = "Legal name is required"))]
    pub legal_name: String,
    #[validate(length(min = 1, max = 20, message = "CNPJ or CPF is required"))]
    pub tax_id: String,
    #[validate(range(min = 1, max = 31, message = "Due day must be between 1 and 31"))]
    pub due_day: i32,
    pub contract_value: Decimal,
    #[serde(default)]
    pub activity_description: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub receipt_method: String,
    #[serde(default)]
    pub kind: ClientKind,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Supplier {
    pub supplier_id: i64,
    pub legal_name: String,
    pub tax_id: String,
    pub payment_method: String,
    pub accounting_account: String,
    pub access_letter: String,
}

impl Supplier {
    /// Expense type suggested when this supplier is picked: letter "A"
    /// suppliers are absence-coverage requests, everything else petty cash.
    pub fn classification(&self) -> ExpenseKind {
        if self.access_letter == "A" {
            ExpenseKind::Solicitacao
        } else {
            ExpenseKind::Caixinha
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SupplierInput {
    #[validate(length(min = 1, max = 200, message = "Legal name is required"))]
    pub legal_name: String,
    #[validate(length(min = 1, max = 20, message = "CNPJ or CPF is required"))]
    pub tax_id: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub payment_method: String,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub accounting_account: String,
    #[serde(default = "default_access_letter")]
    #[validate(length(min = 1, max = 5))]
    pub access_letter: String,
}

fn default_access_letter() -> String {
    "A".to_string()
}
