//! Reference data and the user registry.

use super::{db_error, delete_error, not_found, Database};
use crate::models::{
    Actor, Branch, BranchInput, Catalog, Client, ClientInput, CreateUser, Employee, EmployeeInput,
    ExpenseKind, NamedInput, NamedRecord, Role, Supplier, SupplierInput, UpdateUser, User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use tracing::{info, instrument};

pub(super) const USER_COLUMNS: &str = "user_id, username, first_name, expense_access, must_change_password, is_superuser, roles, created_utc";
const CLIENT_COLUMNS: &str = "client_id, legal_name, tax_id, due_day, contract_value, activity_description, receipt_method, kind, created_utc, active";
const SUPPLIER_COLUMNS: &str =
    "supplier_id, legal_name, tax_id, payment_method, accounting_account, access_letter";

fn role_names(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

impl Database {
    // -------------------------------------------------------------------------
    // Id/name catalogs
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_catalog(&self, catalog: Catalog) -> Result<Vec<NamedRecord>, AppError> {
        let sql = format!(
            "SELECT {id} AS id, name FROM {table} ORDER BY name",
            id = catalog.id_column(),
            table = catalog.table()
        );
        sqlx::query_as::<_, NamedRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list catalog"))
    }

    #[instrument(skip(self))]
    pub async fn get_catalog_item(&self, catalog: Catalog, id: i64) -> Result<NamedRecord, AppError> {
        let sql = format!(
            "SELECT {id} AS id, name FROM {table} WHERE {id} = $1",
            id = catalog.id_column(),
            table = catalog.table()
        );
        sqlx::query_as::<_, NamedRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get catalog item"))?
            .ok_or_else(|| not_found(catalog.table(), id))
    }

    fn check_catalog_name(catalog: Catalog, input: &NamedInput) -> Result<(), AppError> {
        if input.name.chars().count() > catalog.max_name_len() {
            return Err(AppError::field(
                "name",
                "length",
                format!("Name must have at most {} characters", catalog.max_name_len()),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn create_catalog_item(
        &self,
        catalog: Catalog,
        input: &NamedInput,
    ) -> Result<NamedRecord, AppError> {
        Self::check_catalog_name(catalog, input)?;
        let sql = format!(
            "INSERT INTO {table} (name) VALUES ($1) RETURNING {id} AS id, name",
            id = catalog.id_column(),
            table = catalog.table()
        );
        let record = sqlx::query_as::<_, NamedRecord>(&sql)
            .bind(input.name.trim())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to create catalog item"))?;

        info!(catalog = %catalog, id = record.id, "Catalog item created");
        Ok(record)
    }

    #[instrument(skip(self, input))]
    pub async fn update_catalog_item(
        &self,
        catalog: Catalog,
        id: i64,
        input: &NamedInput,
    ) -> Result<NamedRecord, AppError> {
        Self::check_catalog_name(catalog, input)?;
        let sql = format!(
            "UPDATE {table} SET name = $2 WHERE {id} = $1 RETURNING {id} AS id, name",
            id = catalog.id_column(),
            table = catalog.table()
        );
        sqlx::query_as::<_, NamedRecord>(&sql)
            .bind(id)
            .bind(input.name.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to update catalog item"))?
            .ok_or_else(|| not_found(catalog.table(), id))
    }

    #[instrument(skip(self))]
    pub async fn delete_catalog_item(&self, catalog: Catalog, id: i64) -> Result<(), AppError> {
        let sql = format!(
            "DELETE FROM {table} WHERE {id} = $1",
            id = catalog.id_column(),
            table = catalog.table()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_error("Failed to delete catalog item"))?;
        if result.rows_affected() == 0 {
            return Err(not_found(catalog.table(), id));
        }
        info!(catalog = %catalog, id = id, "Catalog item deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Branches
    // -------------------------------------------------------------------------

    pub async fn list_branches(&self) -> Result<Vec<Branch>, AppError> {
        sqlx::query_as::<_, Branch>("SELECT branch_id, name, cnpj FROM branches ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list branches"))
    }

    pub async fn get_branch(&self, id: i64) -> Result<Branch, AppError> {
        sqlx::query_as::<_, Branch>("SELECT branch_id, name, cnpj FROM branches WHERE branch_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get branch"))?
            .ok_or_else(|| not_found("Branch", id))
    }

    /// Insert when `id` is `None`, otherwise replace the stored values.
    #[instrument(skip(self, input))]
    pub async fn save_branch(&self, id: Option<i64>, input: &BranchInput) -> Result<Branch, AppError> {
        // Blank CNPJs are stored as NULL so the unique constraint ignores them.
        let cnpj = input
            .cnpj
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let sql = match id {
            None => "INSERT INTO branches (name, cnpj) VALUES ($1, $2) RETURNING branch_id, name, cnpj",
            Some(_) => "UPDATE branches SET name = $1, cnpj = $2 WHERE branch_id = $3 RETURNING branch_id, name, cnpj",
        };
        let mut query = sqlx::query_as::<_, Branch>(sql).bind(&input.name).bind(cnpj);
        if let Some(id) = id {
            query = query.bind(id);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to save branch"))?
            .ok_or_else(|| not_found("Branch", id.unwrap_or_default()))
    }

    pub async fn delete_branch(&self, id: i64) -> Result<(), AppError> {
        self.delete_row("branches", "branch_id", "Branch", id).await
    }

    // -------------------------------------------------------------------------
    // Employees
    // -------------------------------------------------------------------------

    pub async fn list_employees(&self) -> Result<Vec<Employee>, AppError> {
        sqlx::query_as::<_, Employee>(
            "SELECT employee_id, name, cpf, department, company FROM employees ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list employees"))
    }

    pub async fn get_employee(&self, id: i64) -> Result<Employee, AppError> {
        sqlx::query_as::<_, Employee>(
            "SELECT employee_id, name, cpf, department, company FROM employees WHERE employee_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get employee"))?
        .ok_or_else(|| not_found("Employee", id))
    }

    #[instrument(skip(self, input))]
    pub async fn save_employee(
        &self,
        id: Option<i64>,
        input: &EmployeeInput,
    ) -> Result<Employee, AppError> {
        let sql = match id {
            None => {
                r#"
                INSERT INTO employees (name, cpf, department, company)
                VALUES ($1, $2, $3, $4)
                RETURNING employee_id, name, cpf, department, company
                "#
            }
            Some(_) => {
                r#"
                UPDATE employees SET name = $1, cpf = $2, department = $3, company = $4
                WHERE employee_id = $5
                RETURNING employee_id, name, cpf, department, company
                "#
            }
        };
        let mut query = sqlx::query_as::<_, Employee>(sql)
            .bind(&input.name)
            .bind(&input.cpf)
            .bind(&input.department)
            .bind(&input.company);
        if let Some(id) = id {
            query = query.bind(id);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to save employee"))?
            .ok_or_else(|| not_found("Employee", id.unwrap_or_default()))
    }

    pub async fn delete_employee(&self, id: i64) -> Result<(), AppError> {
        self.delete_row("employees", "employee_id", "Employee", id).await
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    pub async fn list_clients(&self) -> Result<Vec<Client>, AppError> {
        let sql = format!("SELECT {} FROM clients ORDER BY legal_name", CLIENT_COLUMNS);
        sqlx::query_as::<_, Client>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list clients"))
    }

    pub async fn get_client(&self, id: i64) -> Result<Client, AppError> {
        let sql = format!("SELECT {} FROM clients WHERE client_id = $1", CLIENT_COLUMNS);
        sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get client"))?
            .ok_or_else(|| not_found("Client", id))
    }

    #[instrument(skip(self, input))]
    pub async fn save_client(&self, id: Option<i64>, input: &ClientInput) -> Result<Client, AppError> {
        let sql = match id {
            None => format!(
                r#"
                INSERT INTO clients (legal_name, tax_id, due_day, contract_value, activity_description, receipt_method, kind, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {}
                "#,
                CLIENT_COLUMNS
            ),
            Some(_) => format!(
                r#"
                UPDATE clients SET legal_name = $1, tax_id = $2, due_day = $3, contract_value = $4,
                    activity_description = $5, receipt_method = $6, kind = $7, active = $8
                WHERE client_id = $9
                RETURNING {}
                "#,
                CLIENT_COLUMNS
            ),
        };
        let mut query = sqlx::query_as::<_, Client>(&sql)
            .bind(&input.legal_name)
            .bind(&input.tax_id)
            .bind(input.due_day)
            .bind(input.contract_value)
            .bind(&input.activity_description)
            .bind(&input.receipt_method)
            .bind(input.kind.as_str())
            .bind(input.active);
        if let Some(id) = id {
            query = query.bind(id);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to save client"))?
            .ok_or_else(|| not_found("Client", id.unwrap_or_default()))
    }

    pub async fn delete_client(&self, id: i64) -> Result<(), AppError> {
        self.delete_row("clients", "client_id", "Client", id).await
    }

    // -------------------------------------------------------------------------
    // Suppliers
    // -------------------------------------------------------------------------

    pub async fn list_suppliers(&self) -> Result<Vec<Supplier>, AppError> {
        let sql = format!("SELECT {} FROM suppliers ORDER BY legal_name", SUPPLIER_COLUMNS);
        sqlx::query_as::<_, Supplier>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list suppliers"))
    }

    /// Suppliers the actor may pick when submitting an expense.
    pub async fn list_suppliers_for(&self, actor: &Actor) -> Result<Vec<Supplier>, AppError> {
        let suppliers = self.list_suppliers().await?;
        Ok(suppliers
            .into_iter()
            .filter(|s| actor.may_use_supplier_letter(&s.access_letter))
            .collect())
    }

    pub async fn get_supplier(&self, id: i64) -> Result<Supplier, AppError> {
        let sql = format!("SELECT {} FROM suppliers WHERE supplier_id = $1", SUPPLIER_COLUMNS);
        sqlx::query_as::<_, Supplier>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get supplier"))?
            .ok_or_else(|| not_found("Supplier", id))
    }

    #[instrument(skip(self, input))]
    pub async fn save_supplier(
        &self,
        id: Option<i64>,
        input: &SupplierInput,
    ) -> Result<Supplier, AppError> {
        let sql = match id {
            None => format!(
                r#"
                INSERT INTO suppliers (legal_name, tax_id, payment_method, accounting_account, access_letter)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                SUPPLIER_COLUMNS
            ),
            Some(_) => format!(
                r#"
                UPDATE suppliers SET legal_name = $1, tax_id = $2, payment_method = $3,
                    accounting_account = $4, access_letter = $5
                WHERE supplier_id = $6
                RETURNING {}
                "#,
                SUPPLIER_COLUMNS
            ),
        };
        let mut query = sqlx::query_as::<_, Supplier>(&sql)
            .bind(&input.legal_name)
            .bind(&input.tax_id)
            .bind(&input.payment_method)
            .bind(&input.accounting_account)
            .bind(input.access_letter.trim().to_uppercase());
        if let Some(id) = id {
            query = query.bind(id);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to save supplier"))?
            .ok_or_else(|| not_found("Supplier", id.unwrap_or_default()))
    }

    pub async fn delete_supplier(&self, id: i64) -> Result<(), AppError> {
        self.delete_row("suppliers", "supplier_id", "Supplier", id).await
    }

    /// Expense type suggested for a supplier.
    pub async fn classify_supplier(&self, id: i64) -> Result<ExpenseKind, AppError> {
        Ok(self.get_supplier(id).await?.classification())
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let sql = format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list users"))
    }

    pub async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get user"))
    }

    pub async fn get_user(&self, id: i64) -> Result<User, AppError> {
        self.find_user(id).await?.ok_or_else(|| not_found("User", id))
    }

    /// Resolve the acting user of a request.
    #[instrument(skip(self))]
    pub async fn load_actor(&self, user_id: i64) -> Result<Option<Actor>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_actor"])
            .start_timer();
        let user = self.find_user(user_id).await?;
        timer.observe_duration();
        Ok(user.as_ref().map(Actor::from))
    }

    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create_user(&self, input: &CreateUser) -> Result<User, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users (username, first_name, expense_access, is_superuser, roles)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&input.username)
            .bind(&input.first_name)
            .bind(&input.expense_access)
            .bind(input.is_superuser)
            .bind(role_names(&input.roles))
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to create user"))?;

        info!(user_id = user.user_id, "User created");
        Ok(user)
    }

    #[instrument(skip(self, input))]
    pub async fn update_user(&self, id: i64, input: &UpdateUser) -> Result<User, AppError> {
        let sql = format!(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                expense_access = COALESCE($3, expense_access),
                must_change_password = COALESCE($4, must_change_password),
                is_superuser = COALESCE($5, is_superuser),
                roles = COALESCE($6, roles)
            WHERE user_id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&input.first_name)
            .bind(&input.expense_access)
            .bind(input.must_change_password)
            .bind(input.is_superuser)
            .bind(input.roles.as_deref().map(role_names))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to update user"))?
            .ok_or_else(|| not_found("User", id))
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), AppError> {
        self.delete_row("users", "user_id", "User", id).await
    }

    /// Create the bootstrap superuser unless a user with that name exists.
    #[instrument(skip(self))]
    pub async fn ensure_superuser(&self, username: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, first_name, is_superuser, must_change_password)
            VALUES ($1, $1, TRUE, TRUE)
            ON CONFLICT (username) DO NOTHING
            "#,
        )
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create bootstrap superuser"))?;

        if result.rows_affected() > 0 {
            info!(username = %username, "Bootstrap superuser created");
        }
        Ok(())
    }

    async fn delete_row(
        &self,
        table: &'static str,
        id_column: &'static str,
        what: &'static str,
        id: i64,
    ) -> Result<(), AppError> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", table, id_column);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_error("Failed to delete record"))?;
        if result.rows_affected() == 0 {
            return Err(not_found(what, id));
        }
        info!(table = table, id = id, "Record deleted");
        Ok(())
    }
}
