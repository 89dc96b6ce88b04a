use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The user's wallet cannot cover the requested operation.
    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
