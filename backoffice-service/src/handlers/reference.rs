//! Reference data handlers: catalogs, branches, employees, clients and
//! suppliers.
//!
//! Any known user may read and maintain reference data; supplier listings are
//! narrowed to the letters the user has access to.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::ClassificationResponse,
    models::{
        Actor, Branch, BranchInput, Catalog, Client, ClientInput, Employee, EmployeeInput,
        NamedInput, NamedRecord, Supplier, SupplierInput,
    },
    AppState,
};

// -----------------------------------------------------------------------------
// Catalogs (banks, companies, service types, absence reasons, service takers)
// -----------------------------------------------------------------------------

pub async fn list_catalog(
    State(state): State<AppState>,
    Extension(catalog): Extension<Catalog>,
    _actor: Actor,
) -> Result<Json<Vec<NamedRecord>>, AppError> {
    Ok(Json(state.db.list_catalog(catalog).await?))
}

pub async fn get_catalog_item(
    State(state): State<AppState>,
    Extension(catalog): Extension<Catalog>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<NamedRecord>, AppError> {
    Ok(Json(state.db.get_catalog_item(catalog, id).await?))
}

pub async fn create_catalog_item(
    State(state): State<AppState>,
    Extension(catalog): Extension<Catalog>,
    actor: Actor,
    Json(payload): Json<NamedInput>,
) -> Result<(StatusCode, Json<NamedRecord>), AppError> {
    payload.validate()?;
    tracing::info!(catalog = %catalog, user_id = actor.user_id, "Creating catalog item");
    let record = state.db.create_catalog_item(catalog, &payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_catalog_item(
    State(state): State<AppState>,
    Extension(catalog): Extension<Catalog>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<NamedInput>,
) -> Result<Json<NamedRecord>, AppError> {
    payload.validate()?;
    tracing::info!(catalog = %catalog, id, user_id = actor.user_id, "Updating catalog item");
    Ok(Json(state.db.update_catalog_item(catalog, id, &payload).await?))
}

pub async fn delete_catalog_item(
    State(state): State<AppState>,
    Extension(catalog): Extension<Catalog>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    tracing::info!(catalog = %catalog, id, user_id = actor.user_id, "Deleting catalog item");
    state.db.delete_catalog_item(catalog, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Branches
// -----------------------------------------------------------------------------

pub async fn list_branches(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<Json<Vec<Branch>>, AppError> {
    Ok(Json(state.db.list_branches().await?))
}

pub async fn get_branch(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Branch>, AppError> {
    Ok(Json(state.db.get_branch(id).await?))
}

pub async fn create_branch(
    State(state): State<AppState>,
    _actor: Actor,
    Json(payload): Json<BranchInput>,
) -> Result<(StatusCode, Json<Branch>), AppError> {
    payload.validate()?;
    let branch = state.db.save_branch(None, &payload).await?;
    Ok((StatusCode::CREATED, Json(branch)))
}

pub async fn update_branch(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<BranchInput>,
) -> Result<Json<Branch>, AppError> {
    payload.validate()?;
    Ok(Json(state.db.save_branch(Some(id), &payload).await?))
}

pub async fn delete_branch(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.db.delete_branch(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Employees
// -----------------------------------------------------------------------------

pub async fn list_employees(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<Json<Vec<Employee>>, AppError> {
    Ok(Json(state.db.list_employees().await?))
}

pub async fn get_employee(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.db.get_employee(id).await?))
}

pub async fn create_employee(
    State(state): State<AppState>,
    _actor: Actor,
    Json(payload): Json<EmployeeInput>,
) -> Result<(StatusCode, Json<Employee>), AppError> {
    payload.validate()?;
    let employee = state.db.save_employee(None, &payload).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn update_employee(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<EmployeeInput>,
) -> Result<Json<Employee>, AppError> {
    payload.validate()?;
    Ok(Json(state.db.save_employee(Some(id), &payload).await?))
}

pub async fn delete_employee(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.db.delete_employee(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Clients
// -----------------------------------------------------------------------------

pub async fn list_clients(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<Json<Vec<Client>>, AppError> {
    Ok(Json(state.db.list_clients().await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(state.db.get_client(id).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ClientInput>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    payload.validate()?;
    tracing::info!(user_id = actor.user_id, "Creating client");
    let client = state.db.save_client(None, &payload).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<ClientInput>,
) -> Result<Json<Client>, AppError> {
    payload.validate()?;
    Ok(Json(state.db.save_client(Some(id), &payload).await?))
}

pub async fn delete_client(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.db.delete_client(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Suppliers
// -----------------------------------------------------------------------------

/// Suppliers the actor may pick, filtered by access letter.
pub async fn list_suppliers(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<Supplier>>, AppError> {
    Ok(Json(state.db.list_suppliers_for(&actor).await?))
}

pub async fn get_supplier(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Supplier>, AppError> {
    Ok(Json(state.db.get_supplier(id).await?))
}

pub async fn create_supplier(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<SupplierInput>,
) -> Result<(StatusCode, Json<Supplier>), AppError> {
    payload.validate()?;
    tracing::info!(user_id = actor.user_id, "Creating supplier");
    let supplier = state.db.save_supplier(None, &payload).await?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn update_supplier(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<SupplierInput>,
) -> Result<Json<Supplier>, AppError> {
    payload.validate()?;
    Ok(Json(state.db.save_supplier(Some(id), &payload).await?))
}

pub async fn delete_supplier(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.db.delete_supplier(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Expense kind implied by the supplier's access letter.
pub async fn classify_supplier(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ClassificationResponse>, AppError> {
    let kind = state.db.classify_supplier(id).await?;
    Ok(Json(ClassificationResponse {
        supplier_id: id,
        kind,
    }))
}
