use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use travelhi_common::{NewUser, Role, TravelError, TravelResult, User};
use travelhi_store::{as_duplicate, Store, UserStore};

use crate::error::ApiError;
use crate::jwt::JwtService;
use crate::password::{hash_password, verify_password};
use crate::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_USERNAME_LEN: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

/// Registration, login and bearer-token resolution.
pub struct Authenticator {
    jwt: JwtService,
    store: Arc<dyn Store>,
}

impl Authenticator {
    pub fn new(jwt: JwtService, store: Arc<dyn Store>) -> Self {
        Self { jwt, store }
    }

    pub async fn register(&self, registration: Registration) -> TravelResult<User> {
        let username = registration.username.trim().to_string();
        let email = registration.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&registration.password)?;

        if self.store.user_by_username(&username).await?.is_some() {
            return Err(TravelError::Conflict("Username already exists".into()));
        }
        if self.store.user_by_email(&email).await?.is_some() {
            return Err(TravelError::Conflict("Email already exists".into()));
        }

        let new_user = NewUser {
            username,
            email,
            full_name: registration.full_name.filter(|n| !n.trim().is_empty()),
            password_hash: hash_password(&registration.password)?,
            role: Role::User,
        };

        // The pre-checks race with concurrent registrations; the unique
        // constraints have the final word.
        let user = self
            .store
            .create_user(&new_user)
            .await
            .map_err(duplicate_to_conflict)?;
        info!(user_id = user.id, "User registered");
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> TravelResult<AccessToken> {
        let user = self
            .store
            .user_by_username(username.trim())
            .await?
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or_else(|| TravelError::unauthorized("Incorrect username or password"))?;

        if user.disabled {
            return Err(TravelError::unauthorized("Inactive user"));
        }

        Ok(AccessToken {
            access_token: self.jwt.create_token(user.id)?,
            token_type: "bearer".to_string(),
        })
    }

    /// Resolve a bearer token to an active user.
    pub async fn authenticate(&self, token: &str) -> TravelResult<User> {
        let invalid = || TravelError::unauthorized("Could not validate credentials");

        let claims = self.jwt.verify_token(token).map_err(|e| {
            debug!(error = %e, "Token rejected");
            invalid()
        })?;
        let user_id = claims.user_id().map_err(|_| invalid())?;

        let user = self.store.user_by_id(user_id).await?.ok_or_else(invalid)?;
        if user.disabled {
            return Err(TravelError::unauthorized("Inactive user"));
        }
        Ok(user)
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }
}

/// Map a store-level unique violation onto the caller-facing conflict.
pub fn duplicate_to_conflict(err: anyhow::Error) -> TravelError {
    match as_duplicate(&err) {
        Some(dup) if dup.field == "email" => TravelError::Conflict("Email already exists".into()),
        Some(_) => TravelError::Conflict("Username already exists".into()),
        None => TravelError::Internal(err),
    }
}

fn validate_username(username: &str) -> TravelResult<()> {
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(TravelError::validation(format!(
            "Username must be between 1 and {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> TravelResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(TravelError::validation("Invalid email address"))
    }
}

pub(crate) fn validate_password(password: &str) -> TravelResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(TravelError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authenticated, active caller. Rejects with 401 otherwise.
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| TravelError::unauthorized("Not authenticated"))?;
        let user = state.auth.authenticate(token).await?;
        Ok(CurrentUser(user))
    }
}

/// Best-effort caller resolution. Any failure to resolve the token yields
/// `None` rather than an error.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeUser(None));
        };
        match state.auth.authenticate(token).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(TravelError::Internal(e)) => {
                warn!(error = %e, "Token resolution failed, continuing anonymously");
                Ok(MaybeUser(None))
            }
            Err(e) => {
                debug!(error = %e, "Ignoring unusable bearer token");
                Ok(MaybeUser(None))
            }
        }
    }
}
