use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use travelhi_common::permissions::{require_permission, require_self_or_any};
use travelhi_common::{Permission, Role, TravelError, TravelResult, User, UserChanges};
use travelhi_store::{Store, UserStore};

use crate::auth::{duplicate_to_conflict, validate_email, validate_password};
use crate::password::hash_password;

pub const MAX_USERS_PAGE: i64 = 100;

/// Profile fields a caller may submit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password: Option<String>,
}

/// Permission-gated account management.
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, caller: &User, id: i64) -> TravelResult<User> {
        require_permission(caller, Permission::ReadUser)?;
        self.find(id).await
    }

    pub async fn list(&self, caller: &User, skip: i64, limit: i64) -> TravelResult<Vec<User>> {
        require_permission(caller, Permission::ReadUser)?;
        if skip < 0 || !(1..=MAX_USERS_PAGE).contains(&limit) {
            return Err(TravelError::validation(format!(
                "'skip' must be non-negative and 'limit' between 1 and {MAX_USERS_PAGE}"
            )));
        }
        Ok(self.store.list_users(skip, limit).await?)
    }

    /// Self, or anyone holding `UPDATE_USER`.
    pub async fn update(&self, caller: &User, id: i64, update: ProfileUpdate) -> TravelResult<User> {
        require_self_or_any(caller, id, &[Permission::UpdateUser])?;

        let email = update.email.map(|e| e.trim().to_string());
        if let Some(email) = &email {
            validate_email(email)?;
            if let Some(existing) = self.store.user_by_email(email).await? {
                if existing.id != id {
                    return Err(TravelError::Conflict("Email already exists".into()));
                }
            }
        }
        let password_hash = match update.password {
            Some(password) => {
                validate_password(&password)?;
                Some(hash_password(&password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            email,
            full_name: update.full_name,
            password_hash,
        };
        let user = self
            .store
            .update_user(id, &changes)
            .await
            .map_err(duplicate_to_conflict)?
            .ok_or_else(user_not_found)?;
        info!(user_id = id, actor = caller.id, "User updated");
        Ok(user)
    }

    pub async fn set_role(&self, caller: &User, id: i64, role: Role) -> TravelResult<User> {
        require_permission(caller, Permission::ManageRoles)?;
        let user = self.store.set_role(id, role).await?.ok_or_else(user_not_found)?;
        info!(user_id = id, actor = caller.id, role = %role, "Role changed");
        Ok(user)
    }

    pub async fn set_disabled(&self, caller: &User, id: i64, disabled: bool) -> TravelResult<User> {
        require_permission(caller, Permission::ManageRoles)?;
        let user = self
            .store
            .set_disabled(id, disabled)
            .await?
            .ok_or_else(user_not_found)?;
        info!(user_id = id, actor = caller.id, disabled, "User status changed");
        Ok(user)
    }

    /// Adds an explicit grant. The role is never touched.
    pub async fn grant(&self, caller: &User, id: i64, permission: Permission) -> TravelResult<User> {
        require_permission(caller, Permission::ManageRoles)?;
        let user = self
            .store
            .grant_permission(id, permission)
            .await?
            .ok_or_else(user_not_found)?;
        info!(user_id = id, actor = caller.id, permission = %permission, "Permission granted");
        Ok(user)
    }

    /// Removes an explicit grant only; role-implied permissions remain.
    pub async fn revoke(&self, caller: &User, id: i64, permission: Permission) -> TravelResult<User> {
        require_permission(caller, Permission::ManageRoles)?;
        let user = self
            .store
            .revoke_permission(id, permission)
            .await?
            .ok_or_else(user_not_found)?;
        info!(user_id = id, actor = caller.id, permission = %permission, "Permission revoked");
        Ok(user)
    }

    /// Self, or anyone holding `DELETE_USER` or `UPDATE_USER`.
    pub async fn delete(&self, caller: &User, id: i64) -> TravelResult<()> {
        require_self_or_any(caller, id, &[Permission::DeleteUser, Permission::UpdateUser])?;
        if !self.store.delete_user(id).await? {
            return Err(user_not_found());
        }
        info!(user_id = id, actor = caller.id, "User deleted");
        Ok(())
    }

    async fn find(&self, id: i64) -> TravelResult<User> {
        self.store.user_by_id(id).await?.ok_or_else(user_not_found)
    }
}

fn user_not_found() -> TravelError {
    TravelError::not_found("User not found")
}
