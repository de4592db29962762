//! Extra billing entries and the records they keep in step: the automatic
//! receivable and the EXTRA workflow record.

use super::ledger::{allocate_number, delete_ledger_record, sync_mirror};
use super::workflow::{append_log, insert_expense};
use super::{commit, db_error, not_found, today, Database};
use crate::models::{
    Actor, AuditAction, Catalog, DocumentPrefix, ExpenseKind, ExtraEntry, ExtraInput,
    ExtraListRow, ExtraSummary, LedgerKind, LedgerStatus, NewExpense, Role, AUTO_MARKER,
    EXTRA_CLIENT_NAME, EXTRA_CLIENT_TAX_ID, EXTRA_KIND_LABEL, EXTRA_SUPPLIER_NAME,
    EXTRA_SUPPLIER_TAX_ID,
};
use crate::services::approval::ApprovalPolicy;
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};

const EXTRA_COLUMNS: &str = "extra_id, invoice_number, issue_date, due_date, kind_label, amount, provider_company_id, receiving_bank_id, administrative_user_id, coverage_start, coverage_end, service_taker_id, branch_id, absence_reason_id, absent_employee_id, receivable_id, expense_id";

async fn extra_client(conn: &mut PgConnection) -> Result<i64, AppError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT client_id FROM clients WHERE legal_name = $1 ORDER BY client_id LIMIT 1")
            .bind(EXTRA_CLIENT_NAME)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error("Failed to look up extra client"))?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = sqlx::query_scalar(
        r#"
        INSERT INTO clients (legal_name, tax_id, due_day, contract_value, kind, active)
        VALUES ($1, $2, 1, 0, 'EVENTUAL', TRUE)
        RETURNING client_id
        "#,
    )
    .bind(EXTRA_CLIENT_NAME)
    .bind(EXTRA_CLIENT_TAX_ID)
    .fetch_one(conn)
    .await
    .map_err(db_error("Failed to create extra client"))?;
    info!(client_id = id, "Extra client created");
    Ok(id)
}

async fn extra_supplier(conn: &mut PgConnection) -> Result<i64, AppError> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT supplier_id FROM suppliers WHERE legal_name = $1 ORDER BY supplier_id LIMIT 1",
    )
    .bind(EXTRA_SUPPLIER_NAME)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("Failed to look up extra supplier"))?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = sqlx::query_scalar(
        "INSERT INTO suppliers (legal_name, tax_id) VALUES ($1, $2) RETURNING supplier_id",
    )
    .bind(EXTRA_SUPPLIER_NAME)
    .bind(EXTRA_SUPPLIER_TAX_ID)
    .fetch_one(conn)
    .await
    .map_err(db_error("Failed to create extra supplier"))?;
    info!(supplier_id = id, "Extra supplier created");
    Ok(id)
}

/// Create or refresh the receivable billing `entry`. It goes back to
/// pending on every save.
async fn upsert_receivable(
    conn: &mut PgConnection,
    entry: &ExtraEntry,
    client_id: i64,
) -> Result<i64, AppError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO receivables (client_id, provider_company_id, bank_id, issue_date, due_date,
            document_number, amount, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (document_number) DO UPDATE SET
            client_id = EXCLUDED.client_id,
            provider_company_id = EXCLUDED.provider_company_id,
            bank_id = EXCLUDED.bank_id,
            issue_date = EXCLUDED.issue_date,
            due_date = EXCLUDED.due_date,
            amount = EXCLUDED.amount,
            notes = EXCLUDED.notes,
            status = EXCLUDED.status
        RETURNING receivable_id
        "#,
    )
    .bind(client_id)
    .bind(entry.provider_company_id)
    .bind(entry.receiving_bank_id)
    .bind(entry.issue_date)
    .bind(entry.due_date)
    .bind(entry.receivable_document())
    .bind(entry.amount)
    .bind(entry.receivable_notes())
    .bind(LedgerStatus::Pending.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Failed to save extra receivable"))?;

    sync_mirror(conn, LedgerKind::Receivable, id).await?;
    Ok(id)
}

/// Refresh the linked workflow record, or create it when missing.
async fn sync_workflow_record(
    conn: &mut PgConnection,
    entry: &ExtraEntry,
    actor: &Actor,
) -> Result<i64, AppError> {
    if let Some(expense_id) = entry.expense_id {
        let updated = sqlx::query(
            "UPDATE expenses SET notes = $2, expense_date = $3, updated_utc = NOW() WHERE expense_id = $1",
        )
        .bind(expense_id)
        .bind(entry.workflow_notes())
        .bind(entry.issue_date)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to refresh extra workflow record"))?;
        if updated.rows_affected() > 0 {
            return Ok(expense_id);
        }
    }

    let supplier_id = extra_supplier(&mut *conn).await?;
    let submission = NewExpense {
        kind: ExpenseKind::Extra,
        expense_date: Some(entry.issue_date),
        supplier_id,
        amount: Decimal::ZERO,
        notes: entry.workflow_notes(),
        receipt_ref: None,
        coverage_start: entry.coverage_start,
        coverage_end: entry.coverage_end,
        service_taker_id: entry.service_taker_id,
        branch_id: entry.branch_id,
        absence_reason_id: entry.absence_reason_id,
        absent_employee_id: entry.absent_employee_id,
        covered_by_name: None,
        payment_method: None,
        payment_details: None,
    };
    let status = ApprovalPolicy::initial_status(ExpenseKind::Extra);
    let expense = insert_expense(&mut *conn, &submission, entry.administrative_user_id, status).await?;
    let note = ApprovalPolicy::audit_note(status, None, None);
    append_log(conn, expense.expense_id, actor, AuditAction::Created, &note).await?;

    info!(
        extra_id = entry.extra_id,
        expense_id = expense.expense_id,
        "Extra workflow record created"
    );
    Ok(expense.expense_id)
}

impl Database {
    /// Check the references of an extra entry: the responsible user must be
    /// administrative staff and automatic companies or banks cannot be used.
    async fn check_extra_references(&self, input: &ExtraInput) -> Result<(), AppError> {
        let admin = self.get_user(input.administrative_user_id).await?;
        if !admin.has_role(Role::Administrative) {
            return Err(AppError::field(
                "administrative_user_id",
                "not_administrative",
                "The responsible user must belong to the Administrativo group",
            ));
        }

        let company = self
            .get_catalog_item(Catalog::Companies, input.provider_company_id)
            .await?;
        if company.name.contains(AUTO_MARKER) {
            return Err(AppError::field(
                "provider_company_id",
                "automatic_record",
                "Automatic companies cannot receive extras",
            ));
        }

        let bank = self
            .get_catalog_item(Catalog::Banks, input.receiving_bank_id)
            .await?;
        if bank.name.contains(AUTO_MARKER) {
            return Err(AppError::field(
                "receiving_bank_id",
                "automatic_record",
                "Automatic banks cannot receive extras",
            ));
        }
        Ok(())
    }

    /// Create (`id` = `None`) or update an extra entry together with its
    /// receivable and workflow record.
    #[instrument(skip(self, actor, input), fields(user_id = actor.user_id))]
    pub async fn save_extra(
        &self,
        actor: &Actor,
        id: Option<i64>,
        input: &ExtraInput,
    ) -> Result<ExtraEntry, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_extra"])
            .start_timer();

        self.check_extra_references(input).await?;

        let mut tx = self.begin().await?;
        let entry = match id {
            None => {
                let invoice_number = allocate_number(&mut tx, DocumentPrefix::Extra).await?;
                let sql = format!(
                    r#"
                    INSERT INTO extra_entries (invoice_number, issue_date, due_date, kind_label, amount,
                        provider_company_id, receiving_bank_id, administrative_user_id, coverage_start,
                        coverage_end, service_taker_id, branch_id, absence_reason_id, absent_employee_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    RETURNING {}
                    "#,
                    EXTRA_COLUMNS
                );
                sqlx::query_as::<_, ExtraEntry>(&sql)
                    .bind(&invoice_number)
                    .bind(today())
                    .bind(input.due_date)
                    .bind(EXTRA_KIND_LABEL)
                    .bind(input.amount)
                    .bind(input.provider_company_id)
                    .bind(input.receiving_bank_id)
                    .bind(input.administrative_user_id)
                    .bind(input.coverage_start)
                    .bind(input.coverage_end)
                    .bind(input.service_taker_id)
                    .bind(input.branch_id)
                    .bind(input.absence_reason_id)
                    .bind(input.absent_employee_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_error("Failed to create extra entry"))?
            }
            Some(id) => {
                let sql = format!(
                    r#"
                    UPDATE extra_entries SET due_date = $2, amount = $3, provider_company_id = $4,
                        receiving_bank_id = $5, administrative_user_id = $6, coverage_start = $7,
                        coverage_end = $8, service_taker_id = $9, branch_id = $10,
                        absence_reason_id = $11, absent_employee_id = $12
                    WHERE extra_id = $1
                    RETURNING {}
                    "#,
                    EXTRA_COLUMNS
                );
                sqlx::query_as::<_, ExtraEntry>(&sql)
                    .bind(id)
                    .bind(input.due_date)
                    .bind(input.amount)
                    .bind(input.provider_company_id)
                    .bind(input.receiving_bank_id)
                    .bind(input.administrative_user_id)
                    .bind(input.coverage_start)
                    .bind(input.coverage_end)
                    .bind(input.service_taker_id)
                    .bind(input.branch_id)
                    .bind(input.absence_reason_id)
                    .bind(input.absent_employee_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error("Failed to update extra entry"))?
                    .ok_or_else(|| not_found("Extra entry", id))?
            }
        };

        let client_id = extra_client(&mut tx).await?;
        let receivable_id = upsert_receivable(&mut tx, &entry, client_id).await?;
        let expense_id = sync_workflow_record(&mut tx, &entry, actor).await?;

        let sql = format!(
            "UPDATE extra_entries SET receivable_id = $2, expense_id = $3 WHERE extra_id = $1 RETURNING {}",
            EXTRA_COLUMNS
        );
        let entry = sqlx::query_as::<_, ExtraEntry>(&sql)
            .bind(entry.extra_id)
            .bind(receivable_id)
            .bind(expense_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to link extra entry"))?;

        commit(tx).await?;
        timer.observe_duration();

        info!(
            extra_id = entry.extra_id,
            invoice_number = %entry.invoice_number,
            receivable_id = receivable_id,
            expense_id = expense_id,
            "Extra entry saved"
        );
        Ok(entry)
    }

    pub async fn get_extra(&self, id: i64) -> Result<ExtraEntry, AppError> {
        let sql = format!("SELECT {} FROM extra_entries WHERE extra_id = $1", EXTRA_COLUMNS);
        sqlx::query_as::<_, ExtraEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get extra entry"))?
            .ok_or_else(|| not_found("Extra entry", id))
    }

    /// Entries with the label of their workflow status, newest first.
    pub async fn list_extras(&self) -> Result<Vec<ExtraSummary>, AppError> {
        let rows = sqlx::query_as::<_, ExtraListRow>(
            r#"
            SELECT e.extra_id, e.invoice_number, e.issue_date, e.due_date, e.kind_label, e.amount,
                   e.provider_company_id, e.receiving_bank_id, e.administrative_user_id,
                   e.coverage_start, e.coverage_end, e.service_taker_id, e.branch_id,
                   e.absence_reason_id, e.absent_employee_id, e.receivable_id, e.expense_id,
                   x.status AS workflow_status
            FROM extra_entries e
            LEFT JOIN expenses x ON x.expense_id = e.expense_id
            ORDER BY e.extra_id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list extra entries"))?;

        Ok(rows.into_iter().map(ExtraSummary::from).collect())
    }

    /// Delete an entry with its receivable (and mirror row) and its
    /// workflow record (and audit trail).
    #[instrument(skip(self))]
    pub async fn delete_extra(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        let sql = format!(
            "SELECT {} FROM extra_entries WHERE extra_id = $1 FOR UPDATE",
            EXTRA_COLUMNS
        );
        let entry = sqlx::query_as::<_, ExtraEntry>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to load extra entry"))?
            .ok_or_else(|| not_found("Extra entry", id))?;

        if let Some(receivable_id) = entry.receivable_id {
            delete_ledger_record(&mut tx, LedgerKind::Receivable, receivable_id).await?;
        }

        if let Some(expense_id) = entry.expense_id {
            sqlx::query("DELETE FROM expenses WHERE expense_id = $1")
                .bind(expense_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to delete extra workflow record"))?;
        }

        sqlx::query("DELETE FROM extra_entries WHERE extra_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to delete extra entry"))?;

        commit(tx).await?;
        info!(
            extra_id = id,
            invoice_number = %entry.invoice_number,
            "Extra entry deleted"
        );
        Ok(())
    }
}
