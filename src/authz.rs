// ABOUTME: Roles, actors and the static authorization table for lifecycle triggers.
// ABOUTME: The Authorizer trait is the seam for an external policy oracle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::lifecycle::TriggerKind;

/// Role an actor holds when requesting a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    OrgAdmin,
    User,
    Viewer,
    /// The engine itself (validation hooks, automatic activation).
    System,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::OrgAdmin,
        Role::User,
        Role::Viewer,
        Role::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::OrgAdmin => "org_admin",
            Role::User => "user",
            Role::Viewer => "viewer",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0} (expected admin, org_admin, user, viewer or system)")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Identity plus role of whoever requested an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// The engine acting on its own behalf.
    pub fn system() -> Self {
        Self::new("system", Role::System)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

/// Decides whether a role may fire a trigger.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, role: Role, trigger: TriggerKind) -> bool;
}

/// Fixed role/trigger table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAuthorizer;

impl Authorizer for StaticAuthorizer {
    fn is_authorized(&self, role: Role, trigger: TriggerKind) -> bool {
        use Role::*;

        match trigger {
            TriggerKind::Submit => matches!(role, Admin | OrgAdmin | User),
            TriggerKind::ValidatePass | TriggerKind::ValidateFail => {
                matches!(role, System | Admin | OrgAdmin)
            }
            TriggerKind::Approve | TriggerKind::Reject => matches!(role, Admin),
            TriggerKind::Deploy => matches!(role, Admin | OrgAdmin),
            TriggerKind::Activate | TriggerKind::Deprecate => matches!(role, System | Admin),
        }
    }
}
