//! Caller identity for ownership checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A marketplace customer; may only touch their own orders.
    Customer,
    /// Back-office operator with access to every order.
    Admin,
}

impl Role {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not recognized.
#[derive(Debug, Clone, Error)]
#[error("Unknown role: {0}")]
pub struct RoleParseError(pub String);

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" | "ROLE_CUSTOMER" => Ok(Role::Customer),
            "ADMIN" | "ROLE_ADMIN" => Ok(Role::Admin),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

/// The authenticated caller of a core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    /// A customer acting on their own behalf.
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    /// An administrator.
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    /// Returns true if the requester holds the administrative role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns true if the requester is the given owner or an administrator.
    pub fn may_access(&self, owner: UserId) -> bool {
        self.is_admin() || self.user_id == owner
    }
}
