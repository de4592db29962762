use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{BulkAction, ExpenseKind};

#[derive(Debug, Deserialize, Validate)]
pub struct BulkActionRequest {
    #[validate(length(min = 1, message = "Select at least one record"))]
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkActionResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize)]
pub struct ClassificationResponse {
    pub supplier_id: i64,
    pub kind: ExpenseKind,
}

/// Last path segment of `/{ledger}/actions/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionName {
    Paid,
    Cancelled,
    Pending,
}

impl From<ActionName> for BulkAction {
    fn from(name: ActionName) -> Self {
        match name {
            ActionName::Paid => BulkAction::MarkPaid,
            ActionName::Cancelled => BulkAction::MarkCancelled,
            ActionName::Pending => BulkAction::MarkPending,
        }
    }
}
