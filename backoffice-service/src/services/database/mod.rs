//! Database service for backoffice-service.
//!
//! One `Database` handle, with its operations split by area across the
//! submodules. Operations that span several tables run in a single
//! transaction; helpers shared between areas take a `PgConnection` so they
//! can join the caller's transaction.

mod dashboard;
mod extras;
mod ledger;
mod reference;
mod workflow;

use crate::services::metrics::ERRORS_TOTAL;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "backoffice-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool
            .begin()
            .await
            .map_err(|e| database_failure("Failed to begin transaction", e))
    }
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), AppError> {
    tx.commit()
        .await
        .map_err(|e| database_failure("Failed to commit transaction", e))
}

fn database_failure(context: &'static str, e: sqlx::Error) -> AppError {
    ERRORS_TOTAL.with_label_values(&["database"]).inc();
    tracing::error!(error = %e, context, "Database operation failed");
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Map a write failure. Duplicate keys become conflicts and dangling
/// references become bad requests.
fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("{}: record already exists", context))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::BadRequest(anyhow::anyhow!("{}: referenced record does not exist", context))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_check_violation() => {
            AppError::BadRequest(anyhow::anyhow!("{}: value out of range", context))
        }
        _ => database_failure(context, e),
    }
}

/// Map a delete failure. Records still referenced by protected links cannot
/// be removed.
fn delete_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::Conflict(anyhow::anyhow!(
                "{}: record is still referenced and cannot be deleted",
                context
            ))
        }
        _ => database_failure(context, e),
    }
}

fn not_found(what: &str, id: i64) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} {} not found", what, id))
}

/// Local calendar date used for settlement stamps and due-date checks.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
