use formbind_core::{CoreError, ValidationErrors};
use formbind_store::StoreError;

/// Errors surfaced by a form.
///
/// `submit` either returns success or re-raises the original failure
/// after rollback and upload compensation have completed; nothing is
/// swallowed inside the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    /// Schema resolution failure or broken pipeline invariant.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Entity-store or blob-store failure; triggers full rollback.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The composed rule map rejected the request. Raised before any
    /// upload or persistence work begins.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A hook or accessor was registered for a relation key the form
    /// does not declare.
    #[error("Form has no relation named '{0}'")]
    RelationContract(String),

    /// A post-process hook rejected a stored attachment.
    #[error("Post-processing failed for '{path}': {message}")]
    ProcessFile { path: String, message: String },
}

impl FormError {
    /// The field→messages payload, when this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
