//! Expense workflow integration tests: role rules, lock-down, finalization
//! and the audit trail.

mod common;

use backoffice_service::models::{
    Actor, Catalog, Expense, ExpenseChanges, ExpenseKind, ExpenseStatus, LedgerFilter, NewExpense,
    Role, UpdateUser,
};
use backoffice_service::services::Database;
use common::{
    seed_catalog, seed_company_and_bank, seed_supplier, seed_user, seed_user_with_access, test_db,
};
use rust_decimal::Decimal;
use service_core::error::AppError;

fn new_expense(kind: ExpenseKind, supplier_id: i64) -> NewExpense {
    NewExpense {
        kind,
        expense_date: None,
        supplier_id,
        amount: Decimal::new(25000, 2),
        notes: "Cobertura de folga".to_string(),
        receipt_ref: None,
        coverage_start: None,
        coverage_end: None,
        service_taker_id: None,
        branch_id: None,
        absence_reason_id: None,
        absent_employee_id: None,
        covered_by_name: Some("maria souza".to_string()),
        payment_method: None,
        payment_details: None,
    }
}

async fn submit(db: &Database, requester: &Actor, kind: ExpenseKind) -> Expense {
    let supplier_id = seed_supplier(db, "B").await;
    db.create_expense(requester, &new_expense(kind, supplier_id))
        .await
        .expect("Failed to submit expense")
}

fn rejected_fields(err: AppError) -> Vec<String> {
    match err {
        AppError::ValidationError(errors) => errors
            .field_errors()
            .keys()
            .map(|k| k.to_string())
            .collect(),
        other => panic!("expected field errors, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn submission_sets_initial_status_and_logs_creation() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;

    let petty = submit(&db, &requester, ExpenseKind::Caixinha).await;
    assert_eq!(petty.status(), ExpenseStatus::AwaitingFinance);
    assert_eq!(petty.requester_id, requester.user_id);
    assert_eq!(petty.covered_by_name.as_deref(), Some("MARIA SOUZA"));

    let request = submit(&db, &requester, ExpenseKind::Solicitacao).await;
    assert_eq!(request.status(), ExpenseStatus::AwaitingHr);

    let logs = db.expense_logs(&requester, petty.expense_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "Criou Registro");
    assert_eq!(logs[0].role_label, "Solicitante");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn supplier_outside_access_letters_is_rejected() {
    let db = test_db().await;
    let requester = seed_user_with_access(&db, &[Role::Requester], false, Some("A,C")).await;
    let supplier_id = seed_supplier(&db, "B").await;

    let err = db
        .create_expense(&requester, &new_expense(ExpenseKind::Caixinha, supplier_id))
        .await
        .unwrap_err();
    assert_eq!(rejected_fields(err), vec!["supplier_id".to_string()]);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn requester_cannot_edit_a_submitted_record() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let expense = submit(&db, &requester, ExpenseKind::Caixinha).await;

    let err = db
        .update_expense(
            &requester,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::Paid),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "got {err:?}");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn hr_cannot_finalize_and_others_cannot_see_foreign_records() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let hr = seed_user(&db, &[Role::HrApprover], false).await;
    let stranger = seed_user(&db, &[Role::Requester], false).await;
    let expense = submit(&db, &requester, ExpenseKind::Solicitacao).await;

    let err = db
        .update_expense(
            &hr,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::Paid),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(rejected_fields(err).contains(&"status".to_string()));

    let err = db.get_expense(&stranger, expense.expense_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");

    // HR forwards to finance; the audit trail records the move.
    let forwarded = db
        .update_expense(
            &hr,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::AwaitingFinance),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(forwarded.status(), ExpenseStatus::AwaitingFinance);
    let logs = db.expense_logs(&requester, expense.expense_id).await.unwrap();
    assert_eq!(logs.last().unwrap().role_label, "RH");
    assert_eq!(logs.last().unwrap().action, "Editou");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn approver_changing_a_submitter_field_gets_a_lock_error() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let finance = seed_user(&db, &[Role::FinanceApprover], false).await;
    let expense = submit(&db, &requester, ExpenseKind::Caixinha).await;

    let err = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                amount: Some(Decimal::new(99900, 2)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(rejected_fields(err), vec!["amount".to_string()]);

    // Sending the stored value is not a change.
    db.update_expense(
        &finance,
        expense.expense_id,
        &ExpenseChanges {
            amount: Some(expense.amount),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn directing_to_operator_requires_an_operator() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let finance = seed_user(&db, &[Role::FinanceApprover], false).await;
    let operator = seed_user(&db, &[Role::Operator], false).await;
    let expense = submit(&db, &requester, ExpenseKind::Caixinha).await;

    let err = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::DirectedToOperator),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(rejected_fields(err), vec!["operator_id".to_string()]);

    let err = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::DirectedToOperator),
                operator_id: Some(Some(requester.user_id)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(rejected_fields(err), vec!["operator_id".to_string()]);

    let directed = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::DirectedToOperator),
                operator_id: Some(Some(operator.user_id)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(directed.operator_id, Some(operator.user_id));

    let logs = db.expense_logs(&finance, expense.expense_id).await.unwrap();
    let note = &logs.last().unwrap().note;
    assert!(
        note.ends_with(&format!("-> {}", operator.first_name)),
        "unexpected note {note:?}"
    );
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn operator_losing_the_role_does_not_freeze_the_record() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let finance = seed_user(&db, &[Role::FinanceApprover], false).await;
    let operator = seed_user(&db, &[Role::Operator], false).await;
    let superuser = seed_user(&db, &[], true).await;

    let directed = submit(&db, &requester, ExpenseKind::Caixinha).await;
    db.update_expense(
        &finance,
        directed.expense_id,
        &ExpenseChanges {
            status: Some(ExpenseStatus::DirectedToOperator),
            operator_id: Some(Some(operator.user_id)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    db.update_user(
        operator.user_id,
        &UpdateUser {
            first_name: None,
            expense_access: None,
            must_change_password: None,
            is_superuser: None,
            roles: Some(vec![Role::Requester]),
        },
    )
    .await
    .unwrap();

    let cancelled = db
        .update_expense(
            &superuser,
            directed.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::Cancelled),
                cancellation_reason: Some("Duplicada".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status(), ExpenseStatus::Cancelled);
    assert_eq!(cancelled.operator_id, Some(operator.user_id));

    let cleared = db
        .update_expense(
            &superuser,
            directed.expense_id,
            &ExpenseChanges {
                operator_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.operator_id, None);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn finalizing_issues_exactly_one_settled_payable() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let finance = seed_user(&db, &[Role::FinanceApprover], false).await;
    let superuser = seed_user(&db, &[], true).await;
    let (company, bank) = seed_company_and_bank(&db).await;
    let expense = submit(&db, &requester, ExpenseKind::Caixinha).await;

    // Paying company and bank are needed for the payable.
    let err = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::Paid),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    let mut fields = rejected_fields(err);
    fields.sort();
    assert_eq!(fields, vec!["paying_bank_id", "paying_company_id"]);

    let paid = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::Paid),
                paying_company_id: Some(Some(company)),
                paying_bank_id: Some(Some(bank)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(paid.status(), ExpenseStatus::Paid);

    // A second save of a paid record does not issue another payable.
    db.update_expense(
        &superuser,
        expense.expense_id,
        &ExpenseChanges {
            notes: Some("Conferido".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let reference = paid.payable_reference();
    let payables = db
        .list_payables(&LedgerFilter {
            search: Some(reference.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    let issued: Vec<_> = payables
        .iter()
        .filter(|p| p.document_number == reference)
        .collect();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].status, "PAGO");
    assert_eq!(issued[0].amount, expense.amount);
    assert_eq!(issued[0].settled_by, Some(finance.user_id));

    let logs = db.expense_logs(&superuser, expense.expense_id).await.unwrap();
    let actions: Vec<_> = logs.iter().map(|l| l.action.as_str()).collect();
    assert_eq!(actions, vec!["Criou Registro", "FINALIZOU (PAGO)", "Editou"]);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn cancellation_needs_a_reason() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let finance = seed_user(&db, &[Role::FinanceApprover], false).await;
    let expense = submit(&db, &requester, ExpenseKind::Caixinha).await;

    let err = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::Cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(rejected_fields(err), vec!["cancellation_reason".to_string()]);

    let cancelled = db
        .update_expense(
            &finance,
            expense.expense_id,
            &ExpenseChanges {
                status: Some(ExpenseStatus::Cancelled),
                cancellation_reason: Some("Duplicado".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cancelled.status().is_cancelled());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn form_reports_targets_and_locks_for_the_actor() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let finance = seed_user(&db, &[Role::FinanceApprover], false).await;
    let taker = seed_catalog(&db, Catalog::ServiceTakers, "Tomador").await;
    let supplier_id = seed_supplier(&db, "B").await;
    let mut input = new_expense(ExpenseKind::Caixinha, supplier_id);
    input.service_taker_id = Some(taker);
    let expense = db.create_expense(&requester, &input).await.unwrap();

    let form = db.expense_form(&finance, expense.expense_id).await.unwrap();
    assert!(form.can_edit);
    assert!(form.allowed_statuses.contains(&ExpenseStatus::Paid));
    assert!(!form.allowed_statuses.contains(&ExpenseStatus::AwaitingHr));

    let requester_form = db.expense_form(&requester, expense.expense_id).await.unwrap();
    assert!(!requester_form.can_edit);
    assert_eq!(requester_form.allowed_statuses, vec![ExpenseStatus::AwaitingFinance]);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn summary_only_counts_visible_records() {
    let db = test_db().await;
    let requester = seed_user(&db, &[Role::Requester], false).await;
    let other = seed_user(&db, &[Role::Requester], false).await;
    submit(&db, &requester, ExpenseKind::Caixinha).await;
    submit(&db, &requester, ExpenseKind::Caixinha).await;
    submit(&db, &other, ExpenseKind::Caixinha).await;

    let summary = db
        .expense_summary(&requester, &Default::default())
        .await
        .unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].status, "AGUARDANDO_FIN");
    assert_eq!(summary[0].total_count, 2);
    assert_eq!(summary[0].total_amount, Decimal::new(50000, 2));
    assert_eq!(summary[0].label, ExpenseStatus::AwaitingFinance.label());
}
