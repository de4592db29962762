//! Application startup and lifecycle management.

use crate::config::BackofficeConfig;
use crate::handlers::{
    dashboard, expenses, extras, health_check, ledger, metrics_handler, readiness_check,
    reference, users,
};
use crate::models::Catalog;
use crate::services::{init_metrics, Database};
use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
    Extension, Router,
};
use service_core::config::Config as CommonConfig;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BackofficeConfig,
    pub db: Arc<Database>,
}

/// Routes for one id/name catalog, mounted at the catalog's own path.
fn catalog_routes(catalog: Catalog) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(reference::list_catalog).post(reference::create_catalog_item),
        )
        .route(
            "/:id",
            get(reference::get_catalog_item)
                .put(reference::update_catalog_item)
                .delete(reference::delete_catalog_item),
        )
        .layer(Extension(catalog))
}

/// Full HTTP router. Shared by `Application` and the integration tests.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        // Reference data
        .route(
            "/branches",
            get(reference::list_branches).post(reference::create_branch),
        )
        .route(
            "/branches/:id",
            get(reference::get_branch)
                .put(reference::update_branch)
                .delete(reference::delete_branch),
        )
        .route(
            "/employees",
            get(reference::list_employees).post(reference::create_employee),
        )
        .route(
            "/employees/:id",
            get(reference::get_employee)
                .put(reference::update_employee)
                .delete(reference::delete_employee),
        )
        .route(
            "/clients",
            get(reference::list_clients).post(reference::create_client),
        )
        .route(
            "/clients/:id",
            get(reference::get_client)
                .put(reference::update_client)
                .delete(reference::delete_client),
        )
        .route(
            "/suppliers",
            get(reference::list_suppliers).post(reference::create_supplier),
        )
        .route(
            "/suppliers/:id",
            get(reference::get_supplier)
                .put(reference::update_supplier)
                .delete(reference::delete_supplier),
        )
        .route(
            "/suppliers/:id/classification",
            get(reference::classify_supplier),
        )
        // Ledger
        .route(
            "/payables",
            get(ledger::list_payables).post(ledger::create_payable),
        )
        .route(
            "/payables/:id",
            get(ledger::get_payable)
                .put(ledger::update_payable)
                .delete(ledger::delete_payable),
        )
        .route("/payables/actions/:action", post(ledger::payables_action))
        .route(
            "/receivables",
            get(ledger::list_receivables).post(ledger::create_receivable),
        )
        .route(
            "/receivables/:id",
            get(ledger::get_receivable)
                .put(ledger::update_receivable)
                .delete(ledger::delete_receivable),
        )
        .route(
            "/receivables/actions/:action",
            post(ledger::receivables_action),
        )
        .route("/balance-entries", get(ledger::list_balance_entries))
        // Expense workflow
        .route(
            "/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route("/expenses/summary", get(expenses::expense_summary))
        .route(
            "/expenses/:id",
            get(expenses::get_expense).patch(expenses::update_expense),
        )
        .route("/expenses/:id/logs", get(expenses::expense_logs))
        .route("/expenses/:id/form", get(expenses::expense_form))
        // Extras
        .route("/extras", get(extras::list_extras).post(extras::create_extra))
        .route(
            "/extras/:id",
            get(extras::get_extra)
                .put(extras::update_extra)
                .delete(extras::delete_extra),
        )
        .route("/dashboard", get(dashboard::get_dashboard));

    for catalog in Catalog::ALL {
        router = router.nest(catalog.path(), catalog_routes(catalog));
    }

    router
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Bind the HTTP listener on the configured host and port.
async fn bind_listener(common: &CommonConfig) -> Result<TcpListener, AppError> {
    let addr = format!("{}:{}", common.host, common.port);
    TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
        AppError::from(e)
    })
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BackofficeConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: BackofficeConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: BackofficeConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        if let Some(username) = &config.bootstrap_admin {
            db.ensure_superuser(username).await?;
        }

        let listener = bind_listener(&config.common).await?;
        let port = listener.local_addr()?.port();

        let state = AppState {
            config,
            db: Arc::new(db),
        };
        let router = build_router(state);

        tracing::info!(port, "Backoffice service listener bound");

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(port = self.port, "Backoffice service HTTP server starting");
        axum::serve(self.listener, self.router).await
    }
}
