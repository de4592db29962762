//! Approval rules for expense records.
//!
//! Everything here is pure: the database layer loads the record and the
//! acting user, asks these rules what is allowed, and persists the result.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use service_core::error::{field_error, AppError};
use thiserror::Error;
use validator::ValidationErrors;

use crate::models::{
    Actor, AuditAction, Expense, ExpenseField, ExpenseKind, ExpenseStatus, Role, User,
};

/// A rejected workflow change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("You cannot edit this record in its current status")]
    EditForbidden,

    #[error("Record not found")]
    NotVisible,

    #[error("Status '{}' is not available to your profile", .0.label())]
    StatusNotAllowed(ExpenseStatus),

    #[error("Field '{}' cannot be changed at this stage", .0.as_str())]
    LockedField(ExpenseField),

    #[error("Select the operator who will pay this record")]
    OperatorRequired,

    #[error("The selected user is not in the Operador group")]
    NotAnOperator,

    #[error("Inform the cancellation reason")]
    CancellationReasonRequired,

    #[error("Select the paying company before finalizing")]
    PayingCompanyRequired,

    #[error("Select the paying bank before finalizing")]
    PayingBankRequired,

    #[error("This supplier is not available to you")]
    SupplierNotAllowed,
}

impl WorkflowError {
    /// Form field the error is reported against, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::EditForbidden | Self::NotVisible => None,
            Self::StatusNotAllowed(_) => Some("status"),
            Self::LockedField(field) => Some(field.as_str()),
            Self::OperatorRequired | Self::NotAnOperator => Some("operator_id"),
            Self::CancellationReasonRequired => Some("cancellation_reason"),
            Self::PayingCompanyRequired => Some("paying_company_id"),
            Self::PayingBankRequired => Some("paying_bank_id"),
            Self::SupplierNotAllowed => Some("supplier_id"),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::EditForbidden => "edit_forbidden",
            Self::NotVisible => "not_visible",
            Self::StatusNotAllowed(_) => "status_not_allowed",
            Self::LockedField(_) => "locked",
            Self::OperatorRequired
            | Self::CancellationReasonRequired
            | Self::PayingCompanyRequired
            | Self::PayingBankRequired => "required",
            Self::NotAnOperator => "not_an_operator",
            Self::SupplierNotAllowed => "supplier_not_allowed",
        }
    }

    /// Report a batch of rejections as one response. Permission failures
    /// win over field errors.
    pub fn into_app_error(errors: Vec<WorkflowError>) -> AppError {
        if let Some(blocking) = errors.iter().find(|e| e.field().is_none()) {
            return blocking.clone().into();
        }
        let mut fields = ValidationErrors::new();
        for error in &errors {
            if let Some(field) = error.field() {
                fields.add(field, field_error(error.code(), error.to_string()));
            }
        }
        AppError::ValidationError(fields)
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err.field() {
            Some(field) => AppError::field(field, err.code(), err.to_string()),
            None if err == WorkflowError::NotVisible => AppError::NotFound(anyhow::anyhow!(err)),
            None => AppError::Forbidden(anyhow::anyhow!(err)),
        }
    }
}

/// Which records a user may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    /// Own requests only, plus the HR queue for HR approvers.
    Own { user_id: i64, include_hr_queue: bool },
}

/// What a save does besides updating the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideEffects {
    /// Issue the `WF-{id}` payable (skipped when it already exists).
    pub create_payable: bool,
    /// Remove the receivable of the extra entry behind this record.
    pub remove_extra_receivable: bool,
}

impl SideEffects {
    pub fn audit_action(&self) -> AuditAction {
        if self.create_payable {
            AuditAction::Finalized
        } else if self.remove_extra_receivable {
            AuditAction::CancelledReceivableRemoved
        } else {
            AuditAction::Edited
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalPolicy;

impl ApprovalPolicy {
    /// Entry status of a new record, by type.
    pub fn initial_status(kind: ExpenseKind) -> ExpenseStatus {
        match kind {
            ExpenseKind::Extra => ExpenseStatus::AwaitingAdmin,
            ExpenseKind::Solicitacao => ExpenseStatus::AwaitingHr,
            ExpenseKind::Caixinha => ExpenseStatus::AwaitingFinance,
        }
    }

    /// Statuses a role may move a record to.
    pub fn role_targets(role: Role) -> &'static [ExpenseStatus] {
        use ExpenseStatus::*;
        match role {
            Role::Administrative => &[AwaitingAdmin, AwaitingHr, Cancelled],
            Role::HrApprover => &[AwaitingHr, AwaitingFinance, Cancelled],
            Role::FinanceApprover => &[AwaitingFinance, DirectedToOperator, Paid, Cancelled],
            Role::Operator => &[DirectedToOperator, Paid, Cancelled],
            Role::Requester => &[],
        }
    }

    /// Statuses offered to the actor for a record currently in `current`.
    /// The current status is always kept so a save without a move is valid.
    pub fn allowed_targets(actor: &Actor, current: ExpenseStatus) -> BTreeSet<ExpenseStatus> {
        if actor.is_superuser {
            return ExpenseStatus::ALL.into_iter().collect();
        }
        let mut targets: BTreeSet<ExpenseStatus> = actor
            .roles
            .iter()
            .flat_map(|role| Self::role_targets(*role).iter().copied())
            .collect();
        targets.insert(current);
        targets
    }

    pub fn can_edit(actor: &Actor, expense: &Expense) -> bool {
        if actor.is_superuser {
            return true;
        }
        let own = expense.requester_id == actor.user_id;
        match expense.status() {
            ExpenseStatus::AwaitingAdmin => own && actor.has_role(Role::Administrative),
            ExpenseStatus::AwaitingHr => actor.has_role(Role::HrApprover),
            ExpenseStatus::AwaitingFinance => actor.has_role(Role::FinanceApprover),
            ExpenseStatus::DirectedToOperator => {
                actor.has_role(Role::FinanceApprover) || actor.has_role(Role::Operator)
            }
            ExpenseStatus::Draft => own,
            ExpenseStatus::Paid | ExpenseStatus::Cancelled => false,
        }
    }

    pub fn visibility(actor: &Actor) -> Visibility {
        if actor.is_superuser
            || actor.has_role(Role::FinanceApprover)
            || actor.has_role(Role::Operator)
        {
            Visibility::All
        } else {
            Visibility::Own {
                user_id: actor.user_id,
                include_hr_queue: actor.has_role(Role::HrApprover),
            }
        }
    }

    pub fn can_view(actor: &Actor, expense: &Expense) -> bool {
        match Self::visibility(actor) {
            Visibility::All => true,
            Visibility::Own {
                user_id,
                include_hr_queue,
            } => {
                expense.requester_id == user_id
                    || (include_hr_queue && expense.status() == ExpenseStatus::AwaitingHr)
            }
        }
    }

    /// Fields the actor may not change on an existing record.
    pub fn locked_fields(actor: &Actor, expense: &Expense) -> BTreeSet<ExpenseField> {
        let mut locked: BTreeSet<ExpenseField> =
            [ExpenseField::Kind, ExpenseField::UpdatedUtc].into_iter().collect();

        if actor.is_superuser {
            return locked;
        }
        if !Self::can_edit(actor, expense) {
            return ExpenseField::ALL.into_iter().collect();
        }

        if expense.kind() == ExpenseKind::Extra
            && expense.status() == ExpenseStatus::AwaitingAdmin
            && actor.has_role(Role::Administrative)
        {
            locked.extend([
                ExpenseField::Requester,
                ExpenseField::Supplier,
                ExpenseField::ExpenseDate,
                ExpenseField::Notes,
                ExpenseField::ServiceTaker,
                ExpenseField::Branch,
            ]);
            return locked;
        }

        locked.extend(ExpenseField::SUBMITTER);
        if !(actor.has_role(Role::FinanceApprover) || actor.has_role(Role::Operator)) {
            locked.extend([
                ExpenseField::PayingCompany,
                ExpenseField::PayingBank,
                ExpenseField::Operator,
            ]);
        }
        locked
    }

    /// Rejections for changed fields that are locked, in field order.
    pub fn check_locks(
        locked: &BTreeSet<ExpenseField>,
        changed: &BTreeSet<ExpenseField>,
    ) -> Vec<WorkflowError> {
        changed
            .intersection(locked)
            .map(|field| WorkflowError::LockedField(*field))
            .collect()
    }

    /// Validate the record as it would be saved.
    ///
    /// `operator` is the user referenced by `next.operator_id`, when set and
    /// found. The Operador role is only checked when the operator is being
    /// assigned or the record is directed to one; a stored operator who later
    /// lost the role does not block other saves.
    pub fn validate_transition(
        actor: &Actor,
        previous: ExpenseStatus,
        next: &Expense,
        operator: Option<&User>,
        operator_changed: bool,
    ) -> Vec<WorkflowError> {
        let mut errors = Vec::new();
        let target = next.status();

        if target != previous && !Self::allowed_targets(actor, previous).contains(&target) {
            errors.push(WorkflowError::StatusNotAllowed(target));
        }

        let directed = target == ExpenseStatus::DirectedToOperator;
        match next.operator_id {
            None if directed => errors.push(WorkflowError::OperatorRequired),
            Some(_)
                if (operator_changed || directed)
                    && !operator.is_some_and(|u| u.has_role(Role::Operator)) =>
            {
                errors.push(WorkflowError::NotAnOperator)
            }
            _ => {}
        }

        if target == ExpenseStatus::Cancelled && next.cancellation_reason.trim().is_empty() {
            errors.push(WorkflowError::CancellationReasonRequired);
        }

        if target == ExpenseStatus::Paid && previous != ExpenseStatus::Paid {
            if next.paying_company_id.is_none() {
                errors.push(WorkflowError::PayingCompanyRequired);
            }
            if next.paying_bank_id.is_none() {
                errors.push(WorkflowError::PayingBankRequired);
            }
        }

        errors
    }

    pub fn side_effects(actor: &Actor, previous: ExpenseStatus, next: &Expense) -> SideEffects {
        let target = next.status();
        SideEffects {
            create_payable: target == ExpenseStatus::Paid && previous != ExpenseStatus::Paid,
            remove_extra_receivable: next.kind() == ExpenseKind::Extra
                && target == ExpenseStatus::Cancelled
                && actor.has_role(Role::FinanceApprover),
        }
    }

    /// Note stored with each audit entry.
    pub fn audit_note(
        status: ExpenseStatus,
        operator_first_name: Option<&str>,
        changed_amount: Option<Decimal>,
    ) -> String {
        let mut note = format!("Status: {}", status.label());
        if let Some(name) = operator_first_name {
            note.push_str(&format!(" -> {}", name));
        }
        if let Some(amount) = changed_amount {
            note.push_str(&format!(" | Alterou Valor para R$ {}", amount));
        }
        note
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::expense::fixtures::expense;
    use chrono::Utc;

    fn actor(id: i64, roles: &[Role]) -> Actor {
        Actor {
            user_id: id,
            username: format!("user{}", id),
            first_name: format!("User{}", id),
            roles: roles.iter().copied().collect(),
            is_superuser: false,
            access_letters: vec![],
        }
    }

    fn superuser() -> Actor {
        Actor {
            is_superuser: true,
            ..actor(99, &[])
        }
    }

    fn user(id: i64, roles: &[Role]) -> User {
        User {
            user_id: id,
            username: format!("user{}", id),
            first_name: format!("User{}", id),
            expense_access: None,
            must_change_password: false,
            is_superuser: false,
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn initial_status_follows_kind() {
        assert_eq!(
            ApprovalPolicy::initial_status(ExpenseKind::Extra),
            ExpenseStatus::AwaitingAdmin
        );
        assert_eq!(
            ApprovalPolicy::initial_status(ExpenseKind::Solicitacao),
            ExpenseStatus::AwaitingHr
        );
        assert_eq!(
            ApprovalPolicy::initial_status(ExpenseKind::Caixinha),
            ExpenseStatus::AwaitingFinance
        );
    }

    #[test]
    fn hr_targets_include_current_status() {
        let hr = actor(1, &[Role::HrApprover]);
        let targets = ApprovalPolicy::allowed_targets(&hr, ExpenseStatus::Draft);
        let expected: BTreeSet<_> = [
            ExpenseStatus::AwaitingHr,
            ExpenseStatus::AwaitingFinance,
            ExpenseStatus::Cancelled,
            ExpenseStatus::Draft,
        ]
        .into_iter()
        .collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn targets_are_united_across_roles() {
        let both = actor(1, &[Role::Administrative, Role::Operator]);
        let targets = ApprovalPolicy::allowed_targets(&both, ExpenseStatus::AwaitingAdmin);
        assert!(targets.contains(&ExpenseStatus::AwaitingHr));
        assert!(targets.contains(&ExpenseStatus::Paid));
        assert!(!targets.contains(&ExpenseStatus::AwaitingFinance));
    }

    #[test]
    fn superuser_may_pick_any_status() {
        let targets = ApprovalPolicy::allowed_targets(&superuser(), ExpenseStatus::Paid);
        assert_eq!(targets.len(), ExpenseStatus::ALL.len());
    }

    #[test]
    fn requester_cannot_move_status() {
        let requester = actor(1, &[Role::Requester]);
        let current = expense(ExpenseKind::Caixinha, ExpenseStatus::Draft, 1);
        let mut next = current.clone();
        next.status = ExpenseStatus::AwaitingFinance.as_str().to_string();
        let errors = ApprovalPolicy::validate_transition(
            &requester,
            ExpenseStatus::Draft,
            &next,
            None,
            false,
        );
        assert_eq!(
            errors,
            vec![WorkflowError::StatusNotAllowed(ExpenseStatus::AwaitingFinance)]
        );
    }

    #[test]
    fn edit_permission_by_status() {
        let admin = actor(1, &[Role::Administrative]);
        let other_admin = actor(2, &[Role::Administrative]);
        let hr = actor(3, &[Role::HrApprover]);
        let finance = actor(4, &[Role::FinanceApprover]);
        let operator = actor(5, &[Role::Operator]);

        let awaiting_admin = expense(ExpenseKind::Extra, ExpenseStatus::AwaitingAdmin, 1);
        assert!(ApprovalPolicy::can_edit(&admin, &awaiting_admin));
        assert!(!ApprovalPolicy::can_edit(&other_admin, &awaiting_admin));
        assert!(!ApprovalPolicy::can_edit(&hr, &awaiting_admin));

        let directed = expense(ExpenseKind::Caixinha, ExpenseStatus::DirectedToOperator, 1);
        assert!(ApprovalPolicy::can_edit(&finance, &directed));
        assert!(ApprovalPolicy::can_edit(&operator, &directed));
        assert!(!ApprovalPolicy::can_edit(&hr, &directed));

        let paid = expense(ExpenseKind::Caixinha, ExpenseStatus::Paid, 1);
        assert!(!ApprovalPolicy::can_edit(&finance, &paid));
        assert!(ApprovalPolicy::can_edit(&superuser(), &paid));
    }

    #[test]
    fn requester_edits_own_draft_only() {
        let requester = actor(7, &[Role::Requester]);
        assert!(ApprovalPolicy::can_edit(
            &requester,
            &expense(ExpenseKind::Caixinha, ExpenseStatus::Draft, 7)
        ));
        assert!(!ApprovalPolicy::can_edit(
            &requester,
            &expense(ExpenseKind::Caixinha, ExpenseStatus::Draft, 8)
        ));
    }

    #[test]
    fn hr_sees_own_records_and_hr_queue() {
        let hr = actor(3, &[Role::HrApprover]);
        assert!(ApprovalPolicy::can_view(
            &hr,
            &expense(ExpenseKind::Solicitacao, ExpenseStatus::AwaitingHr, 1)
        ));
        assert!(!ApprovalPolicy::can_view(
            &hr,
            &expense(ExpenseKind::Caixinha, ExpenseStatus::AwaitingFinance, 1)
        ));
        assert!(ApprovalPolicy::can_view(
            &hr,
            &expense(ExpenseKind::Caixinha, ExpenseStatus::AwaitingFinance, 3)
        ));
    }

    #[test]
    fn finance_and_operators_see_everything() {
        assert_eq!(
            ApprovalPolicy::visibility(&actor(1, &[Role::Operator])),
            Visibility::All
        );
        assert_eq!(
            ApprovalPolicy::visibility(&actor(1, &[Role::FinanceApprover])),
            Visibility::All
        );
        assert_eq!(
            ApprovalPolicy::visibility(&actor(1, &[Role::Administrative])),
            Visibility::Own {
                user_id: 1,
                include_hr_queue: false
            }
        );
    }

    #[test]
    fn admin_on_extra_may_set_amount_and_payment() {
        let admin = actor(1, &[Role::Administrative]);
        let record = expense(ExpenseKind::Extra, ExpenseStatus::AwaitingAdmin, 1);
        let locked = ApprovalPolicy::locked_fields(&admin, &record);
        assert!(locked.contains(&ExpenseField::Supplier));
        assert!(locked.contains(&ExpenseField::Kind));
        assert!(!locked.contains(&ExpenseField::Amount));
        assert!(!locked.contains(&ExpenseField::CoveredByName));
        assert!(!locked.contains(&ExpenseField::PaymentMethod));
    }

    #[test]
    fn finance_may_set_payment_routing_but_not_amount() {
        let finance = actor(4, &[Role::FinanceApprover]);
        let record = expense(ExpenseKind::Caixinha, ExpenseStatus::AwaitingFinance, 1);
        let locked = ApprovalPolicy::locked_fields(&finance, &record);
        assert!(locked.contains(&ExpenseField::Amount));
        assert!(!locked.contains(&ExpenseField::PayingBank));
        assert!(!locked.contains(&ExpenseField::Operator));

        let hr = actor(3, &[Role::HrApprover]);
        let record = expense(ExpenseKind::Solicitacao, ExpenseStatus::AwaitingHr, 1);
        let locked = ApprovalPolicy::locked_fields(&hr, &record);
        assert!(locked.contains(&ExpenseField::PayingBank));
        assert!(!locked.contains(&ExpenseField::Status));
    }

    #[test]
    fn superuser_only_keeps_kind_and_timestamp_locked() {
        let record = expense(ExpenseKind::Caixinha, ExpenseStatus::Paid, 1);
        let locked = ApprovalPolicy::locked_fields(&superuser(), &record);
        assert_eq!(locked.len(), 2);
    }

    #[test]
    fn changing_locked_field_is_reported() {
        let locked: BTreeSet<_> = [ExpenseField::Amount, ExpenseField::Supplier]
            .into_iter()
            .collect();
        let changed: BTreeSet<_> = [ExpenseField::Amount, ExpenseField::Status]
            .into_iter()
            .collect();
        assert_eq!(
            ApprovalPolicy::check_locks(&locked, &changed),
            vec![WorkflowError::LockedField(ExpenseField::Amount)]
        );
    }

    #[test]
    fn directing_requires_an_operator() {
        let finance = actor(4, &[Role::FinanceApprover]);
        let mut next = expense(ExpenseKind::Caixinha, ExpenseStatus::AwaitingFinance, 1);
        next.status = ExpenseStatus::DirectedToOperator.as_str().to_string();

        let errors = ApprovalPolicy::validate_transition(
            &finance,
            ExpenseStatus::AwaitingFinance,
            &next,
            None,
            false,
        );
        assert_eq!(errors, vec![WorkflowError::OperatorRequired]);

        next.operator_id = Some(5);
        let not_operator = user(5, &[Role::HrApprover]);
        let errors = ApprovalPolicy::validate_transition(
            &finance,
            ExpenseStatus::AwaitingFinance,
            &next,
            Some(&not_operator),
            false,
        );
        assert_eq!(errors, vec![WorkflowError::NotAnOperator]);

        let operator = user(5, &[Role::Operator]);
        assert!(ApprovalPolicy::validate_transition(
            &finance,
            ExpenseStatus::AwaitingFinance,
            &next,
            Some(&operator),
            false,
        )
        .is_empty());
    }

    #[test]
    fn stored_operator_without_role_does_not_block_cancellation() {
        let former_operator = user(5, &[]);
        let mut next = expense(ExpenseKind::Caixinha, ExpenseStatus::AwaitingFinance, 1);
        next.operator_id = Some(5);
        next.status = ExpenseStatus::Cancelled.as_str().to_string();
        next.cancellation_reason = "Duplicada".to_string();

        let errors = ApprovalPolicy::validate_transition(
            &superuser(),
            ExpenseStatus::AwaitingFinance,
            &next,
            Some(&former_operator),
            false,
        );
        assert!(errors.is_empty(), "unexpected rejections: {errors:?}");
    }

    #[test]
    fn newly_assigned_operator_must_hold_the_role() {
        let finance = actor(4, &[Role::FinanceApprover]);
        let mut next = expense(ExpenseKind::Caixinha, ExpenseStatus::AwaitingFinance, 1);
        next.operator_id = Some(6);
        let errors = ApprovalPolicy::validate_transition(
            &finance,
            ExpenseStatus::AwaitingFinance,
            &next,
            Some(&user(6, &[Role::HrApprover])),
            true,
        );
        assert_eq!(errors, vec![WorkflowError::NotAnOperator]);
    }

    #[test]
    fn cancelling_requires_a_reason() {
        let hr = actor(3, &[Role::HrApprover]);
        let mut next = expense(ExpenseKind::Solicitacao, ExpenseStatus::AwaitingHr, 1);
        next.status = ExpenseStatus::Cancelled.as_str().to_string();
        next.cancellation_reason = "   ".to_string();
        assert_eq!(
            ApprovalPolicy::validate_transition(
                &hr,
                ExpenseStatus::AwaitingHr,
                &next,
                None,
                false
            ),
            vec![WorkflowError::CancellationReasonRequired]
        );
    }

    #[test]
    fn paying_requires_company_and_bank() {
        let operator = actor(5, &[Role::Operator]);
        let operator_user = user(5, &[Role::Operator]);
        let mut next = expense(ExpenseKind::Caixinha, ExpenseStatus::DirectedToOperator, 1);
        next.operator_id = Some(5);
        next.status = ExpenseStatus::Paid.as_str().to_string();
        let errors = ApprovalPolicy::validate_transition(
            &operator,
            ExpenseStatus::DirectedToOperator,
            &next,
            Some(&operator_user),
            false,
        );
        assert_eq!(
            errors,
            vec![
                WorkflowError::PayingCompanyRequired,
                WorkflowError::PayingBankRequired
            ]
        );
    }

    #[test]
    fn finalizing_issues_payable_once() {
        let finance = actor(4, &[Role::FinanceApprover]);
        let next = expense(ExpenseKind::Caixinha, ExpenseStatus::Paid, 1);
        let first = ApprovalPolicy::side_effects(&finance, ExpenseStatus::DirectedToOperator, &next);
        assert!(first.create_payable);
        assert_eq!(first.audit_action(), AuditAction::Finalized);

        let again = ApprovalPolicy::side_effects(&finance, ExpenseStatus::Paid, &next);
        assert!(!again.create_payable);
        assert_eq!(again.audit_action(), AuditAction::Edited);
    }

    #[test]
    fn finance_cancelling_extra_removes_receivable() {
        let finance = actor(4, &[Role::FinanceApprover]);
        let hr = actor(3, &[Role::HrApprover]);
        let next = expense(ExpenseKind::Extra, ExpenseStatus::Cancelled, 1);

        let effects = ApprovalPolicy::side_effects(&finance, ExpenseStatus::AwaitingFinance, &next);
        assert!(effects.remove_extra_receivable);
        assert_eq!(effects.audit_action(), AuditAction::CancelledReceivableRemoved);

        assert!(
            !ApprovalPolicy::side_effects(&hr, ExpenseStatus::AwaitingHr, &next)
                .remove_extra_receivable
        );
    }

    #[test]
    fn audit_note_mentions_operator_and_amount() {
        assert_eq!(
            ApprovalPolicy::audit_note(ExpenseStatus::AwaitingHr, None, None),
            "Status: Aguardando RH"
        );
        assert_eq!(
            ApprovalPolicy::audit_note(
                ExpenseStatus::DirectedToOperator,
                Some("Carla"),
                Some(Decimal::new(15050, 2))
            ),
            "Status: Direcionado ao Operador -> Carla | Alterou Valor para R$ 150.50"
        );
    }

    #[test]
    fn permission_errors_win_over_field_errors() {
        let err = WorkflowError::into_app_error(vec![
            WorkflowError::LockedField(ExpenseField::Amount),
            WorkflowError::EditForbidden,
        ]);
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = WorkflowError::into_app_error(vec![
            WorkflowError::PayingCompanyRequired,
            WorkflowError::PayingBankRequired,
        ]);
        match err {
            AppError::ValidationError(errors) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("paying_company_id"));
                assert!(fields.contains_key("paying_bank_id"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
