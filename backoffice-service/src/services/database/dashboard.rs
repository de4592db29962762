//! Dashboard aggregates.

use super::{db_error, Database};
use crate::models::{
    BankBalance, Dashboard, DueSummary, LedgerKind, LedgerStatus, TimeMode, AUTO_MARKER,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::NaiveDate;
use service_core::error::AppError;
use tracing::instrument;

impl Database {
    /// Settled movement per bank up to `reference`, skipping automatic banks.
    async fn bank_balances(&self, reference: NaiveDate) -> Result<Vec<BankBalance>, AppError> {
        sqlx::query_as::<_, BankBalance>(
            r#"
            SELECT bank_id, bank_name, inflows, outflows, inflows - outflows AS balance
            FROM (
                SELECT b.bank_id,
                       b.name AS bank_name,
                       COALESCE((SELECT SUM(r.amount) FROM receivables r
                                 WHERE r.bank_id = b.bank_id AND r.status = $2
                                   AND r.settlement_date <= $1), 0) AS inflows,
                       COALESCE((SELECT SUM(p.amount) FROM payables p
                                 WHERE p.bank_id = b.bank_id AND p.status = $2
                                   AND p.settlement_date <= $1), 0) AS outflows
                FROM banks b
                WHERE position($3 in b.name) = 0
            ) totals
            ORDER BY bank_name
            "#,
        )
        .bind(reference)
        .bind(LedgerStatus::Paid.as_str())
        .bind(AUTO_MARKER)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to compute bank balances"))
    }

    /// Pending records of one ledger split into overdue and upcoming.
    async fn due_summary(&self, kind: LedgerKind, reference: NaiveDate) -> Result<DueSummary, AppError> {
        let sql = format!(
            r#"
            SELECT COUNT(*) FILTER (WHERE due_date < $1) AS overdue_count,
                   COALESCE(SUM(amount) FILTER (WHERE due_date < $1), 0) AS overdue_total,
                   COUNT(*) FILTER (WHERE due_date >= $1) AS upcoming_count,
                   COALESCE(SUM(amount) FILTER (WHERE due_date >= $1), 0) AS upcoming_total
            FROM {}
            WHERE status = $2
            "#,
            kind.table()
        );
        sqlx::query_as::<_, DueSummary>(&sql)
            .bind(reference)
            .bind(LedgerStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to summarise due records"))
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self, reference: NaiveDate, mode: TimeMode) -> Result<Dashboard, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dashboard"])
            .start_timer();

        let banks = self.bank_balances(reference).await?;
        let payables = self.due_summary(LedgerKind::Payable, reference).await?;
        let receivables = self.due_summary(LedgerKind::Receivable, reference).await?;

        timer.observe_duration();
        Ok(Dashboard::new(reference, mode, banks, payables, receivables))
    }
}
