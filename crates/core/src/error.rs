use crate::types::DbId;
use crate::validation::rules::ValidationReport;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Field-level rule violations collected across a whole workflow.
    #[error("Validation failed: {} field error(s)", .0.errors.len())]
    InvalidFields(ValidationReport),

    /// The caller's change hash no longer matches the stored one.
    #[error("Conflict: workflow was modified concurrently")]
    StaleChangeHash { server_hash: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Edit attempted on an entity whose lifecycle state forbids it.
    #[error("Immutable state: {0}")]
    ImmutableState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
