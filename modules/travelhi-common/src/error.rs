use thiserror::Error;

/// Failure taxonomy shared by every mutation and query path.
///
/// Only `Internal` carries an opaque cause; every other variant carries a
/// message that is safe to show to the caller.
#[derive(Error, Debug)]
pub enum TravelError {
    /// Malformed or out-of-range input. Never mutates state.
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation (username, email).
    #[error("{0}")]
    Conflict(String),

    /// Blocked by the moderation gate. Never mutates state.
    #[error("{0}")]
    ContentRejected(String),

    #[error("{0}")]
    NotFound(String),

    /// Missing, invalid or expired credential, or a disabled account.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but lacking the required permission.
    #[error("{0}")]
    Forbidden(String),

    /// A remote collaborator failed and no local recovery applies.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TravelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

pub type TravelResult<T> = std::result::Result<T, TravelError>;
