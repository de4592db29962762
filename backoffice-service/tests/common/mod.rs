//! Common test utilities for backoffice-service integration tests.
//!
//! Tests share one database, so every seeded record carries a unique suffix.

#![allow(dead_code)]

use backoffice_service::config::{BackofficeConfig, DatabaseConfig};
use backoffice_service::models::{
    Actor, Catalog, ClientInput, ClientKind, CreateUser, NamedInput, Role, SupplierInput,
};
use backoffice_service::services::Database;
use backoffice_service::{build_router, AppState};
use axum::Router;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,backoffice_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set")
}

/// Connect to the test database with migrations applied.
pub async fn test_db() -> Database {
    init_tracing();
    let db = Database::new(&database_url(), 4, 1)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");
    db
}

pub fn test_config() -> BackofficeConfig {
    BackofficeConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "backoffice-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url(),
            max_connections: 4,
            min_connections: 1,
        },
        bootstrap_admin: None,
    }
}

/// Router over the test database, ready for `oneshot` requests.
pub async fn test_router() -> (Router, Database) {
    let db = test_db().await;
    let state = AppState {
        config: test_config(),
        db: Arc::new(db.clone()),
    };
    (build_router(state), db)
}

/// Short unique token for names and tax ids.
pub fn unique(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &id[..12])
}

pub async fn seed_user(db: &Database, roles: &[Role], is_superuser: bool) -> Actor {
    seed_user_with_access(db, roles, is_superuser, None).await
}

pub async fn seed_user_with_access(
    db: &Database,
    roles: &[Role],
    is_superuser: bool,
    expense_access: Option<&str>,
) -> Actor {
    let user = db
        .create_user(&CreateUser {
            username: unique("user-"),
            first_name: unique("Name"),
            expense_access: expense_access.map(str::to_string),
            is_superuser,
            roles: roles.to_vec(),
        })
        .await
        .expect("Failed to create user");
    Actor::from(&user)
}

pub async fn seed_catalog(db: &Database, catalog: Catalog, name: &str) -> i64 {
    db.create_catalog_item(
        catalog,
        &NamedInput {
            name: format!("{} {}", name, unique("")),
        },
    )
    .await
    .expect("Failed to create catalog item")
    .id
}

pub async fn seed_supplier(db: &Database, letter: &str) -> i64 {
    db.save_supplier(
        None,
        &SupplierInput {
            legal_name: unique("Supplier "),
            tax_id: unique("S"),
            payment_method: "PIX".to_string(),
            accounting_account: "2.1.01".to_string(),
            access_letter: letter.to_string(),
        },
    )
    .await
    .expect("Failed to create supplier")
    .supplier_id
}

pub async fn seed_client(db: &Database) -> i64 {
    db.save_client(
        None,
        &ClientInput {
            legal_name: unique("Client "),
            tax_id: unique("C"),
            due_day: 10,
            contract_value: Decimal::new(150000, 2),
            activity_description: String::new(),
            receipt_method: String::new(),
            kind: ClientKind::Fixed,
            active: true,
        },
    )
    .await
    .expect("Failed to create client")
    .client_id
}

/// Company and bank pair for ledger records.
pub async fn seed_company_and_bank(db: &Database) -> (i64, i64) {
    let company = seed_catalog(db, Catalog::Companies, "Company").await;
    let bank = seed_catalog(db, Catalog::Banks, "Bank").await;
    (company, bank)
}
