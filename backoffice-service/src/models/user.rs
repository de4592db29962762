//! User registry and the acting user of a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use validator::Validate;

/// Approval roles. Role membership drives every workflow decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Administrativo")]
    Administrative,
    #[serde(rename = "Aprovador RH")]
    HrApprover,
    #[serde(rename = "Aprovador Financeiro")]
    FinanceApprover,
    #[serde(rename = "Operador")]
    Operator,
    #[serde(rename = "Solicitante")]
    Requester,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Administrative,
        Role::HrApprover,
        Role::FinanceApprover,
        Role::Operator,
        Role::Requester,
    ];

    /// Group name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrative => "Administrativo",
            Self::HrApprover => "Aprovador RH",
            Self::FinanceApprover => "Aprovador Financeiro",
            Self::Operator => "Operador",
            Self::Requester => "Solicitante",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registered user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    /// Comma separated supplier access letters, e.g. "A,B".
    pub expense_access: Option<String>,
    pub must_change_password: bool,
    pub is_superuser: bool,
    pub roles: Vec<String>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Roles the user belongs to; unknown group names are ignored.
    pub fn parsed_roles(&self) -> BTreeSet<Role> {
        self.roles.iter().filter_map(|r| Role::from_name(r)).collect()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }
}

/// Parse "A, B,C" into ["A", "B", "C"].
pub fn parse_access_letters(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Input for registering a user.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 150, message = "Username is required"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[validate(length(max = 10))]
    pub expense_access: Option<String>,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Input for changing a user's access profile.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 10))]
    pub expense_access: Option<String>,
    pub must_change_password: Option<bool>,
    pub is_superuser: Option<bool>,
    pub roles: Option<Vec<Role>>,
}

/// The user performing the current request, with resolved roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub roles: BTreeSet<Role>,
    pub is_superuser: bool,
    pub access_letters: Vec<String>,
}

impl Actor {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Profile label written to the audit log. Superuser wins, then
    /// Finance, HR and Administrative in that order.
    pub fn profile_label(&self) -> &'static str {
        if self.is_superuser {
            "Admin"
        } else if self.has_role(Role::FinanceApprover) {
            "Financeiro"
        } else if self.has_role(Role::HrApprover) {
            "RH"
        } else if self.has_role(Role::Administrative) {
            "Administrativo"
        } else {
            "Solicitante"
        }
    }

    /// Whether a supplier tagged with `letter` may be picked by this user.
    pub fn may_use_supplier_letter(&self, letter: &str) -> bool {
        self.is_superuser
            || self.access_letters.is_empty()
            || self.access_letters.iter().any(|l| l == letter)
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            roles: user.parsed_roles(),
            is_superuser: user.is_superuser,
            access_letters: parse_access_letters(user.expense_access.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(roles: &[Role]) -> Actor {
        Actor {
            user_id: 1,
            username: "ana".to_string(),
            first_name: "Ana".to_string(),
            roles: roles.iter().copied().collect(),
            is_superuser: false,
            access_letters: vec![],
        }
    }

    #[test]
    fn role_names_round_trip_through_group_names() {
        for role in Role::ALL {
            assert_eq!(Role::from_name(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_name("Diretoria"), None);
    }

    #[test]
    fn access_letters_are_trimmed() {
        assert_eq!(parse_access_letters(Some("A, B,,C ")), vec!["A", "B", "C"]);
        assert!(parse_access_letters(None).is_empty());
    }

    #[test]
    fn profile_label_follows_precedence() {
        assert_eq!(actor(&[]).profile_label(), "Solicitante");
        assert_eq!(actor(&[Role::Administrative]).profile_label(), "Administrativo");
        assert_eq!(
            actor(&[Role::Administrative, Role::HrApprover]).profile_label(),
            "RH"
        );
        assert_eq!(
            actor(&[Role::HrApprover, Role::FinanceApprover]).profile_label(),
            "Financeiro"
        );
        let mut admin = actor(&[Role::FinanceApprover]);
        admin.is_superuser = true;
        assert_eq!(admin.profile_label(), "Admin");
    }

    #[test]
    fn supplier_letters_restrict_only_when_configured() {
        let mut a = actor(&[]);
        assert!(a.may_use_supplier_letter("Z"));
        a.access_letters = vec!["A".to_string(), "B".to_string()];
        assert!(a.may_use_supplier_letter("B"));
        assert!(!a.may_use_supplier_letter("C"));
        a.is_superuser = true;
        assert!(a.may_use_supplier_letter("C"));
    }

    #[test]
    fn user_roles_ignore_unknown_groups() {
        let user = User {
            user_id: 7,
            username: "op".to_string(),
            first_name: "Op".to_string(),
            expense_access: Some("A".to_string()),
            must_change_password: false,
            is_superuser: false,
            roles: vec!["Operador".to_string(), "Legacy".to_string()],
            created_utc: Utc::now(),
        };
        let actor = Actor::from(&user);
        assert_eq!(actor.roles.len(), 1);
        assert!(actor.has_role(Role::Operator));
        assert_eq!(actor.access_letters, vec!["A"]);
    }
}
