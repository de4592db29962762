//! Payables, receivables, document counters and the balance mirror.

use super::{commit, db_error, delete_error, not_found, today, Database};
use crate::models::{
    stamp_settlement, Actor, BalanceEntry, BalanceFilter, BalanceMirror, BulkAction,
    DocumentPrefix, LedgerFilter, LedgerKind, LedgerStatus, MirrorSource, Payable, PayableInput,
    Receivable, ReceivableInput,
};
use crate::services::metrics::{BALANCE_SYNC, DB_QUERY_DURATION, DOCUMENTS_ISSUED};
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{debug, info, instrument};

const PAYABLE_COLUMNS: &str = "payable_id, supplier_id, paying_company_id, bank_id, issue_date, due_date, document_number, amount, notes, accounting_account, status, settlement_date, settled_by";
const RECEIVABLE_COLUMNS: &str = "receivable_id, client_id, provider_company_id, bank_id, issue_date, due_date, document_number, amount, hours_schedule, notes, status, settlement_date, settled_by";
const BALANCE_COLUMNS: &str = "balance_entry_id, origin, origin_id, name, company, issue_date, bank, due_date, amount, status, settlement_date, settled_by";

/// Stored values a save must not lose.
#[derive(sqlx::FromRow)]
struct StoredSettlement {
    document_number: String,
    settlement_date: Option<NaiveDate>,
    settled_by: Option<i64>,
}

/// Take the next value of a named counter. The upsert makes concurrent
/// callers queue on the counter row, so numbers never repeat.
pub(super) async fn allocate_number(
    conn: &mut PgConnection,
    prefix: DocumentPrefix,
) -> Result<String, AppError> {
    let number: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO document_sequences (prefix, last_number) VALUES ($1, 1)
        ON CONFLICT (prefix) DO UPDATE SET last_number = document_sequences.last_number + 1
        RETURNING last_number
        "#,
    )
    .bind(prefix.as_str())
    .fetch_one(conn)
    .await
    .map_err(db_error("Failed to allocate document number"))?;

    DOCUMENTS_ISSUED.with_label_values(&[prefix.as_str()]).inc();
    Ok(prefix.format(number))
}

/// Bring the mirror row of one ledger record in line with the record:
/// upsert while it is paid, remove it otherwise (including after deletion).
pub(super) async fn sync_mirror(
    conn: &mut PgConnection,
    kind: LedgerKind,
    id: i64,
) -> Result<(), AppError> {
    let sql = match kind {
        LedgerKind::Payable => {
            r#"
            SELECT r.payable_id AS origin_id, s.legal_name AS counterpart, c.name AS company,
                   b.name AS bank, r.issue_date, r.due_date, r.amount, r.status,
                   r.settlement_date, u.username AS settled_by
            FROM payables r
            JOIN suppliers s ON s.supplier_id = r.supplier_id
            JOIN companies c ON c.company_id = r.paying_company_id
            JOIN banks b ON b.bank_id = r.bank_id
            LEFT JOIN users u ON u.user_id = r.settled_by
            WHERE r.payable_id = $1
            "#
        }
        LedgerKind::Receivable => {
            r#"
            SELECT r.receivable_id AS origin_id, cl.legal_name AS counterpart, c.name AS company,
                   b.name AS bank, r.issue_date, r.due_date, r.amount, r.status,
                   r.settlement_date, u.username AS settled_by
            FROM receivables r
            JOIN clients cl ON cl.client_id = r.client_id
            JOIN companies c ON c.company_id = r.provider_company_id
            JOIN banks b ON b.bank_id = r.bank_id
            LEFT JOIN users u ON u.user_id = r.settled_by
            WHERE r.receivable_id = $1
            "#
        }
    };

    let source = sqlx::query_as::<_, MirrorSource>(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("Failed to read ledger record for balance"))?;

    match source.and_then(|s| BalanceMirror::from_source(kind, s)) {
        Some(mirror) => {
            sqlx::query(
                r#"
                INSERT INTO balance_entries
                    (origin, origin_id, name, company, issue_date, bank, due_date, amount, status, settlement_date, settled_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (origin, origin_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    company = EXCLUDED.company,
                    issue_date = EXCLUDED.issue_date,
                    bank = EXCLUDED.bank,
                    due_date = EXCLUDED.due_date,
                    amount = EXCLUDED.amount,
                    status = EXCLUDED.status,
                    settlement_date = EXCLUDED.settlement_date,
                    settled_by = EXCLUDED.settled_by
                "#,
            )
            .bind(mirror.origin)
            .bind(mirror.origin_id)
            .bind(&mirror.name)
            .bind(&mirror.company)
            .bind(mirror.issue_date)
            .bind(&mirror.bank)
            .bind(mirror.due_date)
            .bind(mirror.amount)
            .bind(&mirror.status)
            .bind(mirror.settlement_date)
            .bind(&mirror.settled_by)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to upsert balance entry"))?;

            BALANCE_SYNC
                .with_label_values(&[kind.origin(), "upserted"])
                .inc();
            debug!(origin = kind.origin(), origin_id = id, "Balance entry upserted");
        }
        None => {
            let result =
                sqlx::query("DELETE FROM balance_entries WHERE origin = $1 AND origin_id = $2")
                    .bind(kind.origin())
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(db_error("Failed to remove balance entry"))?;

            if result.rows_affected() > 0 {
                BALANCE_SYNC
                    .with_label_values(&[kind.origin(), "removed"])
                    .inc();
                debug!(origin = kind.origin(), origin_id = id, "Balance entry removed");
            }
        }
    }
    Ok(())
}

/// Delete a ledger record and its mirror row.
pub(super) async fn delete_ledger_record(
    conn: &mut PgConnection,
    kind: LedgerKind,
    id: i64,
) -> Result<bool, AppError> {
    let sql = format!("DELETE FROM {} WHERE {} = $1", kind.table(), kind.id_column());
    let result = sqlx::query(&sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(delete_error("Failed to delete ledger record"))?;
    sync_mirror(conn, kind, id).await?;
    Ok(result.rows_affected() > 0)
}

async fn stored_settlement(
    conn: &mut PgConnection,
    kind: LedgerKind,
    id: i64,
) -> Result<StoredSettlement, AppError> {
    let sql = format!(
        "SELECT document_number, settlement_date, settled_by FROM {} WHERE {} = $1 FOR UPDATE",
        kind.table(),
        kind.id_column()
    );
    sqlx::query_as::<_, StoredSettlement>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_error("Failed to load ledger record"))?
        .ok_or_else(|| not_found(kind.table(), id))
}

/// Document number, settlement date and settling user for a save.
async fn prepare_save(
    conn: &mut PgConnection,
    kind: LedgerKind,
    id: Option<i64>,
    document_number: Option<&str>,
    status: LedgerStatus,
    settlement_date: Option<NaiveDate>,
    actor: &Actor,
) -> Result<(String, Option<NaiveDate>, Option<i64>), AppError> {
    let stored = match id {
        Some(id) => Some(stored_settlement(&mut *conn, kind, id).await?),
        None => None,
    };

    let requested = document_number.map(str::trim).filter(|d| !d.is_empty());
    let document_number = match (requested, &stored) {
        (Some(number), _) => number.to_string(),
        (None, Some(stored)) => stored.document_number.clone(),
        (None, None) => allocate_number(&mut *conn, kind.prefix()).await?,
    };

    let (settlement_date, settled_by) = stamp_settlement(
        status,
        settlement_date.or(stored.as_ref().and_then(|s| s.settlement_date)),
        stored.as_ref().and_then(|s| s.settled_by),
        actor.user_id,
        today(),
    );

    Ok((document_number, settlement_date, settled_by))
}

fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}

impl Database {
    /// Allocate the next number of a counter in its own transaction.
    #[instrument(skip(self))]
    pub async fn allocate_document_number(&self, prefix: DocumentPrefix) -> Result<String, AppError> {
        let mut tx = self.begin().await?;
        let number = allocate_number(&mut tx, prefix).await?;
        commit(tx).await?;
        Ok(number)
    }

    // -------------------------------------------------------------------------
    // Payables
    // -------------------------------------------------------------------------

    /// Create (`id` = `None`) or replace a payable and sync its mirror row.
    #[instrument(skip(self, input, actor), fields(user_id = actor.user_id))]
    pub async fn save_payable(
        &self,
        actor: &Actor,
        id: Option<i64>,
        input: &PayableInput,
    ) -> Result<Payable, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_payable"])
            .start_timer();

        let mut tx = self.begin().await?;
        let (document_number, settlement_date, settled_by) = prepare_save(
            &mut tx,
            LedgerKind::Payable,
            id,
            input.document_number.as_deref(),
            input.status,
            input.settlement_date,
            actor,
        )
        .await?;

        let sql = match id {
            None => format!(
                r#"
                INSERT INTO payables (supplier_id, paying_company_id, bank_id, issue_date, due_date,
                    document_number, amount, notes, accounting_account, status, settlement_date, settled_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING {}
                "#,
                PAYABLE_COLUMNS
            ),
            Some(_) => format!(
                r#"
                UPDATE payables SET supplier_id = $1, paying_company_id = $2, bank_id = $3,
                    issue_date = $4, due_date = $5, document_number = $6, amount = $7, notes = $8,
                    accounting_account = $9, status = $10, settlement_date = $11, settled_by = $12
                WHERE payable_id = $13
                RETURNING {}
                "#,
                PAYABLE_COLUMNS
            ),
        };
        let mut query = sqlx::query_as::<_, Payable>(&sql)
            .bind(input.supplier_id)
            .bind(input.paying_company_id)
            .bind(input.bank_id)
            .bind(input.issue_date)
            .bind(input.due_date)
            .bind(&document_number)
            .bind(input.amount)
            .bind(&input.notes)
            .bind(&input.accounting_account)
            .bind(input.status.as_str())
            .bind(settlement_date)
            .bind(settled_by);
        if let Some(id) = id {
            query = query.bind(id);
        }
        let payable = query
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to save payable"))?;

        sync_mirror(&mut tx, LedgerKind::Payable, payable.payable_id).await?;
        commit(tx).await?;
        timer.observe_duration();

        info!(
            payable_id = payable.payable_id,
            document_number = %payable.document_number,
            status = %payable.status,
            "Payable saved"
        );
        Ok(payable)
    }

    pub async fn get_payable(&self, id: i64) -> Result<Payable, AppError> {
        let sql = format!("SELECT {} FROM payables WHERE payable_id = $1", PAYABLE_COLUMNS);
        sqlx::query_as::<_, Payable>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get payable"))?
            .ok_or_else(|| not_found("Payable", id))
    }

    #[instrument(skip(self))]
    pub async fn list_payables(&self, filter: &LedgerFilter) -> Result<Vec<Payable>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payables"])
            .start_timer();

        let (status, due_before, due_from) = match filter.situation {
            Some(situation) => {
                let (status, before, from) = situation.bounds(today());
                (Some(status.as_str()), before, from)
            }
            None => (None, None, None),
        };
        let sql = format!(
            r#"
            SELECT {}
            FROM payables
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::date IS NULL OR due_date < $2)
              AND ($3::date IS NULL OR due_date >= $3)
              AND ($4::date IS NULL OR due_date >= $4)
              AND ($5::date IS NULL OR due_date <= $5)
              AND ($6::bigint IS NULL OR paying_company_id = $6)
              AND ($7::text IS NULL
                   OR document_number ILIKE $7
                   OR supplier_id IN (SELECT supplier_id FROM suppliers WHERE legal_name ILIKE $7))
            ORDER BY due_date, payable_id
            "#,
            PAYABLE_COLUMNS
        );
        let payables = sqlx::query_as::<_, Payable>(&sql)
            .bind(status)
            .bind(due_before)
            .bind(due_from)
            .bind(filter.due_from)
            .bind(filter.due_to)
            .bind(filter.company_id)
            .bind(search_pattern(filter.search.as_deref()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list payables"))?;

        timer.observe_duration();
        Ok(payables)
    }

    #[instrument(skip(self))]
    pub async fn delete_payable(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        if !delete_ledger_record(&mut tx, LedgerKind::Payable, id).await? {
            return Err(not_found("Payable", id));
        }
        commit(tx).await?;
        info!(payable_id = id, "Payable deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Receivables
    // -------------------------------------------------------------------------

    /// Create (`id` = `None`) or replace a receivable and sync its mirror row.
    #[instrument(skip(self, input, actor), fields(user_id = actor.user_id))]
    pub async fn save_receivable(
        &self,
        actor: &Actor,
        id: Option<i64>,
        input: &ReceivableInput,
    ) -> Result<Receivable, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_receivable"])
            .start_timer();

        let mut tx = self.begin().await?;
        let (document_number, settlement_date, settled_by) = prepare_save(
            &mut tx,
            LedgerKind::Receivable,
            id,
            input.document_number.as_deref(),
            input.status,
            input.settlement_date,
            actor,
        )
        .await?;

        let sql = match id {
            None => format!(
                r#"
                INSERT INTO receivables (client_id, provider_company_id, bank_id, issue_date, due_date,
                    document_number, amount, hours_schedule, notes, status, settlement_date, settled_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING {}
                "#,
                RECEIVABLE_COLUMNS
            ),
            Some(_) => format!(
                r#"
                UPDATE receivables SET client_id = $1, provider_company_id = $2, bank_id = $3,
                    issue_date = $4, due_date = $5, document_number = $6, amount = $7,
                    hours_schedule = $8, notes = $9, status = $10, settlement_date = $11,
                    settled_by = $12
                WHERE receivable_id = $13
                RETURNING {}
                "#,
                RECEIVABLE_COLUMNS
            ),
        };
        let mut query = sqlx::query_as::<_, Receivable>(&sql)
            .bind(input.client_id)
            .bind(input.provider_company_id)
            .bind(input.bank_id)
            .bind(input.issue_date)
            .bind(input.due_date)
            .bind(&document_number)
            .bind(input.amount)
            .bind(&input.hours_schedule)
            .bind(&input.notes)
            .bind(input.status.as_str())
            .bind(settlement_date)
            .bind(settled_by);
        if let Some(id) = id {
            query = query.bind(id);
        }
        let receivable = query
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to save receivable"))?;

        sync_mirror(&mut tx, LedgerKind::Receivable, receivable.receivable_id).await?;
        commit(tx).await?;
        timer.observe_duration();

        info!(
            receivable_id = receivable.receivable_id,
            document_number = %receivable.document_number,
            status = %receivable.status,
            "Receivable saved"
        );
        Ok(receivable)
    }

    pub async fn get_receivable(&self, id: i64) -> Result<Receivable, AppError> {
        let sql = format!(
            "SELECT {} FROM receivables WHERE receivable_id = $1",
            RECEIVABLE_COLUMNS
        );
        sqlx::query_as::<_, Receivable>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get receivable"))?
            .ok_or_else(|| not_found("Receivable", id))
    }

    #[instrument(skip(self))]
    pub async fn list_receivables(&self, filter: &LedgerFilter) -> Result<Vec<Receivable>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_receivables"])
            .start_timer();

        let (status, due_before, due_from) = match filter.situation {
            Some(situation) => {
                let (status, before, from) = situation.bounds(today());
                (Some(status.as_str()), before, from)
            }
            None => (None, None, None),
        };
        let sql = format!(
            r#"
            SELECT {}
            FROM receivables
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::date IS NULL OR due_date < $2)
              AND ($3::date IS NULL OR due_date >= $3)
              AND ($4::date IS NULL OR due_date >= $4)
              AND ($5::date IS NULL OR due_date <= $5)
              AND ($6::bigint IS NULL OR provider_company_id = $6)
              AND ($7::text IS NULL
                   OR document_number ILIKE $7
                   OR client_id IN (SELECT client_id FROM clients WHERE legal_name ILIKE $7))
            ORDER BY due_date, receivable_id
            "#,
            RECEIVABLE_COLUMNS
        );
        let receivables = sqlx::query_as::<_, Receivable>(&sql)
            .bind(status)
            .bind(due_before)
            .bind(due_from)
            .bind(filter.due_from)
            .bind(filter.due_to)
            .bind(filter.company_id)
            .bind(search_pattern(filter.search.as_deref()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list receivables"))?;

        timer.observe_duration();
        Ok(receivables)
    }

    #[instrument(skip(self))]
    pub async fn delete_receivable(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        if !delete_ledger_record(&mut tx, LedgerKind::Receivable, id).await? {
            return Err(not_found("Receivable", id));
        }
        commit(tx).await?;
        info!(receivable_id = id, "Receivable deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Bulk actions
    // -------------------------------------------------------------------------

    /// Apply a mass status change and keep every touched mirror row in sync.
    /// Returns the number of records updated.
    ///
    /// Marking as paid keeps settlement data already present on a record.
    #[instrument(skip(self, ids, actor), fields(user_id = actor.user_id, count = ids.len()))]
    pub async fn apply_bulk_action(
        &self,
        kind: LedgerKind,
        action: BulkAction,
        ids: &[i64],
        actor: &Actor,
    ) -> Result<usize, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["bulk_action"])
            .start_timer();

        let assignments = match action {
            BulkAction::MarkPaid => {
                "status = $2, settlement_date = COALESCE(settlement_date, $3), settled_by = COALESCE(settled_by, $4)"
            }
            BulkAction::MarkCancelled => "status = $2",
            BulkAction::MarkPending => "status = $2, settlement_date = NULL, settled_by = NULL",
        };
        let sql = format!(
            "UPDATE {table} SET {assignments} WHERE {id} = ANY($1) RETURNING {id}",
            table = kind.table(),
            id = kind.id_column(),
            assignments = assignments
        );

        let mut tx = self.begin().await?;
        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(ids)
            .bind(action.target().as_str());
        if action == BulkAction::MarkPaid {
            query = query.bind(today()).bind(actor.user_id);
        }
        let updated = query
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error("Failed to apply bulk action"))?;

        for id in &updated {
            sync_mirror(&mut tx, kind, *id).await?;
        }
        commit(tx).await?;
        timer.observe_duration();

        info!(
            origin = kind.origin(),
            action = ?action,
            updated = updated.len(),
            "Bulk action applied"
        );
        Ok(updated.len())
    }

    // -------------------------------------------------------------------------
    // Balance
    // -------------------------------------------------------------------------

    /// Read-only consolidated balance, latest settlements first.
    #[instrument(skip(self))]
    pub async fn list_balance_entries(
        &self,
        filter: &BalanceFilter,
    ) -> Result<Vec<BalanceEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_balance_entries"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {}
            FROM balance_entries
            WHERE ($1::date IS NULL OR settlement_date >= $1)
              AND ($2::date IS NULL OR settlement_date <= $2)
              AND ($3::varchar IS NULL OR origin = $3)
              AND ($4::text IS NULL OR company ILIKE $4)
              AND ($5::text IS NULL OR bank ILIKE $5)
            ORDER BY settlement_date DESC NULLS LAST, balance_entry_id DESC
            "#,
            BALANCE_COLUMNS
        );
        let entries = sqlx::query_as::<_, BalanceEntry>(&sql)
            .bind(filter.settled_from)
            .bind(filter.settled_to)
            .bind(filter.origin.map(|o| o.origin()))
            .bind(search_pattern(filter.company.as_deref()))
            .bind(search_pattern(filter.bank.as_deref()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list balance entries"))?;

        timer.observe_duration();
        Ok(entries)
    }

    /// Mirror row of one ledger record, if it is currently settled.
    pub async fn find_balance_entry(
        &self,
        kind: LedgerKind,
        origin_id: i64,
    ) -> Result<Option<BalanceEntry>, AppError> {
        let sql = format!(
            "SELECT {} FROM balance_entries WHERE origin = $1 AND origin_id = $2",
            BALANCE_COLUMNS
        );
        sqlx::query_as::<_, BalanceEntry>(&sql)
            .bind(kind.origin())
            .bind(origin_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get balance entry"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_wraps_trimmed_term() {
        assert_eq!(search_pattern(Some("  CP-0001 ")), Some("%CP-0001%".to_string()));
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(None), None);
    }
}
