//! Role and permission model.
//!
//! A user's effective permission set is the union of the fixed capability
//! set of their [`Role`] and the permissions explicitly granted to them.
//! Revoking a permission only ever removes an explicit grant; the role
//! baseline can only change through a role change.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TravelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ReadUser,
    UpdateUser,
    DeleteUser,
    ManageRoles,
    VerifyReport,
    ManageEvents,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::ReadUser,
        Permission::UpdateUser,
        Permission::DeleteUser,
        Permission::ManageRoles,
        Permission::VerifyReport,
        Permission::ManageEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadUser => "READ_USER",
            Permission::UpdateUser => "UPDATE_USER",
            Permission::DeleteUser => "DELETE_USER",
            Permission::ManageRoles => "MANAGE_ROLES",
            Permission::VerifyReport => "VERIFY_REPORT",
            Permission::ManageEvents => "MANAGE_EVENTS",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TravelError::validation(format!("Unknown permission: {s}")))
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Moderator => "MODERATOR",
            Role::Admin => "ADMIN",
        }
    }

    /// Capabilities every holder of this role has without explicit grants.
    pub fn implicit_permissions(&self) -> &'static [Permission] {
        match self {
            Role::User => &[],
            Role::Moderator => &[
                Permission::ReadUser,
                Permission::VerifyReport,
                Permission::ManageEvents,
            ],
            Role::Admin => &Permission::ALL,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TravelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "MODERATOR" => Ok(Role::Moderator),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(TravelError::validation(format!("Unknown role: {s}"))),
        }
    }
}

/// Anything that carries a role and explicit grants.
pub trait Principal {
    fn principal_id(&self) -> i64;
    fn role(&self) -> Role;
    fn granted_permissions(&self) -> &BTreeSet<Permission>;
}

/// Role-implicit set ∪ explicit grants.
pub fn effective_permissions(role: Role, granted: &BTreeSet<Permission>) -> BTreeSet<Permission> {
    role.implicit_permissions()
        .iter()
        .copied()
        .chain(granted.iter().copied())
        .collect()
}

pub fn has_permission<P: Principal + ?Sized>(principal: &P, permission: Permission) -> bool {
    principal.role().implicit_permissions().contains(&permission)
        || principal.granted_permissions().contains(&permission)
}

/// Fail with `Forbidden` unless the principal holds `permission`.
pub fn require_permission<P: Principal + ?Sized>(
    principal: &P,
    permission: Permission,
) -> Result<(), TravelError> {
    if has_permission(principal, permission) {
        Ok(())
    } else {
        Err(TravelError::forbidden(format!(
            "Missing required permission: {permission}"
        )))
    }
}

/// Self-or-permission rule for user-scoped mutations: acting on your own
/// identity is always allowed; acting on anyone else needs one of `any_of`.
pub fn require_self_or_any<P: Principal + ?Sized>(
    principal: &P,
    target_user_id: i64,
    any_of: &[Permission],
) -> Result<(), TravelError> {
    if principal.principal_id() == target_user_id
        || any_of.iter().any(|p| has_permission(principal, *p))
    {
        Ok(())
    } else {
        Err(TravelError::forbidden(
            "Not enough permissions to act on this user",
        ))
    }
}
