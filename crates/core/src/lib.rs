//! Core domain logic for the formbind form-to-entity binder.
//!
//! Everything in this crate is pure: field descriptors, schema
//! resolution, validation-rule composition and evaluation, and the
//! error taxonomy. Store I/O lives in `formbind-store`; the form
//! object and its submission pipeline live in `formbind`.

pub mod error;
pub mod field;
pub mod rules;
pub mod schema;
pub mod types;
pub mod validate;

pub use error::CoreError;
pub use field::{
    default_upload_filename, FieldDescriptor, FieldKind, FilenameResolver, InputKind,
    ProcessFileHook, RawField, RelationDef, RelationFieldDescriptor, RelationKind,
    RenderValueResolver, SubmissionContext, SubmitValueResolver, UploadSpec, UploadedFile,
};
pub use rules::{Rule, RuleMap, RuleSet};
pub use schema::{RelationInspector, Schema};
pub use types::{DbId, FormMode, Record, Timestamp, ValueMap};
pub use validate::ValidationErrors;
