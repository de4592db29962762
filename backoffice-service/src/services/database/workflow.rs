//! Expense records, their approval transitions and the audit trail.

use super::ledger::{delete_ledger_record, sync_mirror};
use super::reference::USER_COLUMNS;
use super::{commit, db_error, not_found, today, Database};
use crate::models::{
    normalize_covered_by, payable_reference, Actor, AuditAction, Expense, ExpenseChanges,
    ExpenseField, ExpenseFilter, ExpenseForm, ExpenseLog, ExpenseStatus, LedgerKind, LedgerStatus,
    NewExpense, StatusSummary, User,
};
use crate::services::approval::{ApprovalPolicy, Visibility, WorkflowError};
use crate::services::metrics::{DB_QUERY_DURATION, WORKFLOW_TRANSITIONS};
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};

const EXPENSE_COLUMNS: &str = "expense_id, kind, expense_date, supplier_id, amount, notes, requester_id, status, receipt_ref, coverage_start, coverage_end, service_taker_id, branch_id, absence_reason_id, absent_employee_id, covered_by_name, payment_method, payment_details, paying_company_id, paying_bank_id, operator_id, cancellation_reason, updated_utc";

/// Visibility as bind parameters: requester filter and HR-queue flag.
fn visibility_params(visibility: Visibility) -> (Option<i64>, bool) {
    match visibility {
        Visibility::All => (None, false),
        Visibility::Own {
            user_id,
            include_hr_queue,
        } => (Some(user_id), include_hr_queue),
    }
}

/// Insert a record as submitted, in the given status.
pub(super) async fn insert_expense(
    conn: &mut PgConnection,
    input: &NewExpense,
    requester_id: i64,
    status: ExpenseStatus,
) -> Result<Expense, AppError> {
    let sql = format!(
        r#"
        INSERT INTO expenses (kind, expense_date, supplier_id, amount, notes, requester_id, status,
            receipt_ref, coverage_start, coverage_end, service_taker_id, branch_id,
            absence_reason_id, absent_employee_id, covered_by_name, payment_method, payment_details)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING {}
        "#,
        EXPENSE_COLUMNS
    );
    sqlx::query_as::<_, Expense>(&sql)
        .bind(input.kind.as_str())
        .bind(input.expense_date.unwrap_or_else(today))
        .bind(input.supplier_id)
        .bind(input.amount)
        .bind(&input.notes)
        .bind(requester_id)
        .bind(status.as_str())
        .bind(&input.receipt_ref)
        .bind(input.coverage_start)
        .bind(input.coverage_end)
        .bind(input.service_taker_id)
        .bind(input.branch_id)
        .bind(input.absence_reason_id)
        .bind(input.absent_employee_id)
        .bind(normalize_covered_by(input.covered_by_name.clone()))
        .bind(input.payment_method.map(|m| m.as_str()))
        .bind(&input.payment_details)
        .fetch_one(conn)
        .await
        .map_err(db_error("Failed to create expense"))
}

/// Append an audit entry. Entries are never updated or removed on their own.
pub(super) async fn append_log(
    conn: &mut PgConnection,
    expense_id: i64,
    actor: &Actor,
    action: AuditAction,
    note: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO expense_logs (expense_id, user_id, role_label, action, note)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(expense_id)
    .bind(actor.user_id)
    .bind(actor.profile_label())
    .bind(action.as_str())
    .bind(note)
    .execute(conn)
    .await
    .map_err(db_error("Failed to write audit entry"))?;
    Ok(())
}

async fn lock_expense(conn: &mut PgConnection, id: i64) -> Result<Expense, AppError> {
    let sql = format!(
        "SELECT {} FROM expenses WHERE expense_id = $1 FOR UPDATE",
        EXPENSE_COLUMNS
    );
    sqlx::query_as::<_, Expense>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_error("Failed to load expense"))?
        .ok_or_else(|| not_found("Expense", id))
}

async fn find_user_in(conn: &mut PgConnection, id: i64) -> Result<Option<User>, AppError> {
    let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_error("Failed to load user"))
}

/// Issue the settled `WF-{id}` payable for a finalized record, unless one
/// already exists. Returns whether a payable was created.
async fn issue_workflow_payable(
    conn: &mut PgConnection,
    expense: &Expense,
    actor: &Actor,
) -> Result<bool, AppError> {
    let today = today();
    let payable_id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO payables (supplier_id, paying_company_id, bank_id, issue_date, due_date,
            document_number, amount, status, settlement_date, settled_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (document_number) DO NOTHING
        RETURNING payable_id
        "#,
    )
    .bind(expense.supplier_id)
    .bind(expense.paying_company_id)
    .bind(expense.paying_bank_id)
    .bind(expense.expense_date)
    .bind(today)
    .bind(expense.payable_reference())
    .bind(expense.amount)
    .bind(LedgerStatus::Paid.as_str())
    .bind(today)
    .bind(actor.user_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("Failed to issue payable"))?;

    match payable_id {
        Some(id) => {
            sync_mirror(conn, LedgerKind::Payable, id).await?;
            info!(
                expense_id = expense.expense_id,
                payable_id = id,
                "Workflow payable issued"
            );
            Ok(true)
        }
        None => {
            warn!(
                expense_id = expense.expense_id,
                document_number = %payable_reference(expense.expense_id),
                "Workflow payable already exists"
            );
            Ok(false)
        }
    }
}

/// Delete the receivable billed by the extra entry behind `expense_id`.
/// Returns whether a receivable was removed.
async fn remove_extra_receivable(conn: &mut PgConnection, expense_id: i64) -> Result<bool, AppError> {
    let receivable_id: Option<i64> = sqlx::query_scalar(
        "SELECT receivable_id FROM extra_entries WHERE expense_id = $1 AND receivable_id IS NOT NULL",
    )
    .bind(expense_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("Failed to find extra receivable"))?;

    match receivable_id {
        Some(id) => delete_ledger_record(conn, LedgerKind::Receivable, id).await,
        None => Ok(false),
    }
}

impl Database {
    /// Submit a new expense on behalf of the actor.
    #[instrument(skip(self, actor, input), fields(user_id = actor.user_id, kind = input.kind.as_str()))]
    pub async fn create_expense(&self, actor: &Actor, input: &NewExpense) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_expense"])
            .start_timer();

        let supplier = self.get_supplier(input.supplier_id).await?;
        if !actor.may_use_supplier_letter(&supplier.access_letter) {
            return Err(WorkflowError::SupplierNotAllowed.into());
        }

        let status = ApprovalPolicy::initial_status(input.kind);
        let mut tx = self.begin().await?;
        let expense = insert_expense(&mut tx, input, actor.user_id, status).await?;
        let note = ApprovalPolicy::audit_note(status, None, None);
        append_log(&mut tx, expense.expense_id, actor, AuditAction::Created, &note).await?;
        commit(tx).await?;
        timer.observe_duration();

        WORKFLOW_TRANSITIONS
            .with_label_values(&[status.as_str(), AuditAction::Created.as_str()])
            .inc();
        info!(
            expense_id = expense.expense_id,
            status = %status,
            "Expense submitted"
        );
        Ok(expense)
    }

    /// Apply a partial update under the approval rules.
    ///
    /// The record is locked for the whole save, so finalizing twice
    /// concurrently still issues a single payable.
    #[instrument(skip(self, actor, changes), fields(user_id = actor.user_id, expense_id = id))]
    pub async fn update_expense(
        &self,
        actor: &Actor,
        id: i64,
        changes: &ExpenseChanges,
    ) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_expense"])
            .start_timer();

        let mut tx = self.begin().await?;
        let current = lock_expense(&mut tx, id).await?;

        if !ApprovalPolicy::can_view(actor, &current) {
            return Err(WorkflowError::NotVisible.into());
        }
        if !ApprovalPolicy::can_edit(actor, &current) {
            return Err(WorkflowError::EditForbidden.into());
        }

        let previous = current.status();
        let (next, changed) = changes.apply(&current);

        let operator = match next.operator_id {
            Some(operator_id) => find_user_in(&mut tx, operator_id).await?,
            None => None,
        };

        let mut errors =
            ApprovalPolicy::check_locks(&ApprovalPolicy::locked_fields(actor, &current), &changed);
        errors.extend(ApprovalPolicy::validate_transition(
            actor,
            previous,
            &next,
            operator.as_ref(),
            changed.contains(&ExpenseField::Operator),
        ));
        if !errors.is_empty() {
            warn!(rejections = errors.len(), "Expense update rejected");
            return Err(WorkflowError::into_app_error(errors));
        }

        let sql = format!(
            r#"
            UPDATE expenses SET
                expense_date = $2, supplier_id = $3, amount = $4, notes = $5, requester_id = $6,
                status = $7, receipt_ref = $8, coverage_start = $9, coverage_end = $10,
                service_taker_id = $11, branch_id = $12, absence_reason_id = $13,
                absent_employee_id = $14, covered_by_name = $15, payment_method = $16,
                payment_details = $17, paying_company_id = $18, paying_bank_id = $19,
                operator_id = $20, cancellation_reason = $21, updated_utc = NOW()
            WHERE expense_id = $1
            RETURNING {}
            "#,
            EXPENSE_COLUMNS
        );
        let saved = sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .bind(next.expense_date)
            .bind(next.supplier_id)
            .bind(next.amount)
            .bind(&next.notes)
            .bind(next.requester_id)
            .bind(&next.status)
            .bind(&next.receipt_ref)
            .bind(next.coverage_start)
            .bind(next.coverage_end)
            .bind(next.service_taker_id)
            .bind(next.branch_id)
            .bind(next.absence_reason_id)
            .bind(next.absent_employee_id)
            .bind(&next.covered_by_name)
            .bind(&next.payment_method)
            .bind(&next.payment_details)
            .bind(next.paying_company_id)
            .bind(next.paying_bank_id)
            .bind(next.operator_id)
            .bind(&next.cancellation_reason)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to update expense"))?;

        let mut effects = ApprovalPolicy::side_effects(actor, previous, &saved);
        if effects.create_payable {
            issue_workflow_payable(&mut tx, &saved, actor).await?;
        }
        if effects.remove_extra_receivable {
            effects.remove_extra_receivable = remove_extra_receivable(&mut tx, id).await?;
        }

        let action = effects.audit_action();
        let note = ApprovalPolicy::audit_note(
            saved.status(),
            operator.as_ref().map(|u| u.first_name.as_str()),
            changed
                .contains(&ExpenseField::Amount)
                .then_some(saved.amount),
        );
        append_log(&mut tx, id, actor, action, &note).await?;
        commit(tx).await?;
        timer.observe_duration();

        WORKFLOW_TRANSITIONS
            .with_label_values(&[saved.status.as_str(), action.as_str()])
            .inc();
        info!(
            from = %previous,
            to = %saved.status,
            action = action.as_str(),
            "Expense updated"
        );
        Ok(saved)
    }

    /// Load a record the actor is allowed to see.
    #[instrument(skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn get_expense(&self, actor: &Actor, id: i64) -> Result<Expense, AppError> {
        let sql = format!("SELECT {} FROM expenses WHERE expense_id = $1", EXPENSE_COLUMNS);
        let expense = sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get expense"))?
            .ok_or_else(|| not_found("Expense", id))?;

        if !ApprovalPolicy::can_view(actor, &expense) {
            return Err(WorkflowError::NotVisible.into());
        }
        Ok(expense)
    }

    #[instrument(skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn list_expenses(
        &self,
        actor: &Actor,
        filter: &ExpenseFilter,
    ) -> Result<Vec<Expense>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_expenses"])
            .start_timer();

        let (requester, hr_queue) = visibility_params(ApprovalPolicy::visibility(actor));
        let sql = format!(
            r#"
            SELECT {}
            FROM expenses
            WHERE ($1::bigint IS NULL OR requester_id = $1 OR ($2 AND status = 'AGUARDANDO_RH'))
              AND ($3::varchar IS NULL OR kind = $3)
              AND ($4::varchar IS NULL OR status = $4)
              AND ($5::bigint IS NULL OR supplier_id = $5)
            ORDER BY expense_id DESC
            "#,
            EXPENSE_COLUMNS
        );
        let expenses = sqlx::query_as::<_, Expense>(&sql)
            .bind(requester)
            .bind(hr_queue)
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.supplier_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list expenses"))?;

        timer.observe_duration();
        Ok(expenses)
    }

    /// Amount and count per status over the records the actor can see.
    #[instrument(skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn expense_summary(
        &self,
        actor: &Actor,
        filter: &ExpenseFilter,
    ) -> Result<Vec<StatusSummary>, AppError> {
        let (requester, hr_queue) = visibility_params(ApprovalPolicy::visibility(actor));
        let rows = sqlx::query_as::<_, StatusSummary>(
            r#"
            SELECT status, COALESCE(SUM(amount), 0) AS total_amount, COUNT(*) AS total_count
            FROM expenses
            WHERE ($1::bigint IS NULL OR requester_id = $1 OR ($2 AND status = 'AGUARDANDO_RH'))
              AND ($3::varchar IS NULL OR kind = $3)
              AND ($4::varchar IS NULL OR status = $4)
              AND ($5::bigint IS NULL OR supplier_id = $5)
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(requester)
        .bind(hr_queue)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.supplier_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to summarise expenses"))?;

        Ok(rows.into_iter().map(StatusSummary::with_label).collect())
    }

    /// Audit trail of a record, oldest first.
    pub async fn expense_logs(&self, actor: &Actor, id: i64) -> Result<Vec<ExpenseLog>, AppError> {
        self.get_expense(actor, id).await?;
        sqlx::query_as::<_, ExpenseLog>(
            r#"
            SELECT log_id, expense_id, user_id, role_label, action, created_utc, note
            FROM expense_logs
            WHERE expense_id = $1
            ORDER BY created_utc, log_id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list audit entries"))
    }

    /// Statuses and editable fields offered to the actor for a record.
    pub async fn expense_form(&self, actor: &Actor, id: i64) -> Result<ExpenseForm, AppError> {
        let expense = self.get_expense(actor, id).await?;
        let can_edit = ApprovalPolicy::can_edit(actor, &expense);
        let allowed_statuses = if can_edit {
            ApprovalPolicy::allowed_targets(actor, expense.status())
                .into_iter()
                .collect()
        } else {
            vec![expense.status()]
        };
        Ok(ExpenseForm {
            can_edit,
            allowed_statuses,
            locked_fields: ApprovalPolicy::locked_fields(actor, &expense)
                .into_iter()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_maps_to_bind_parameters() {
        assert_eq!(visibility_params(Visibility::All), (None, false));
        assert_eq!(
            visibility_params(Visibility::Own {
                user_id: 4,
                include_hr_queue: true
            }),
            (Some(4), true)
        );
    }
}
