use crate::validate::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed field or relation declaration. Raised at schema
    /// construction time — a form with a broken schema is never usable.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The composed rule map rejected the request.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}
