use thiserror::Error;

/// A unique constraint rejected an insert or update. Stores return this
/// wrapped in `anyhow::Error`; callers recover it with `downcast_ref`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{field} already exists")]
pub struct DuplicateKey {
    /// Column that collided (`username` or `email`).
    pub field: &'static str,
}

/// Find a [`DuplicateKey`] anywhere in an error chain.
pub fn as_duplicate(err: &anyhow::Error) -> Option<DuplicateKey> {
    err.chain().find_map(|e| e.downcast_ref::<DuplicateKey>().copied())
}
