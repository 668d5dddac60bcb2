//! Declarative form-to-persistent-entity binding.
//!
//! A form binds a schema of fields (including nested one-to-many and
//! one-to-one sub-forms) to an entity record. Submitting validates the
//! request against the composed rule map, resolves submit values,
//! stores attachments, persists the entity, and synchronizes nested
//! child rows -- all inside one entity-store transaction with
//! compensating deletion of written blobs on failure.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use formbind::{Form, FormConfig, FormRequest};
//! use formbind_core::{InputKind, RawField, Record};
//! use formbind_store::{DiskRegistry, MemoryBlobStore, MemoryEntityStore};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), formbind::FormError> {
//! let store = Arc::new(MemoryEntityStore::new());
//! let disks = Arc::new(DiskRegistry::new().with_disk("public", Arc::new(MemoryBlobStore::new()) as _));
//! let config = Arc::new(FormConfig::themed("bs3"));
//!
//! let mut form = Form::builder("posts", Record::new(), store, disks, config)
//!     .field("title", RawField::new(InputKind::Text).rules("required|min:3"))
//!     .field("body", RawField::new(InputKind::Textarea))
//!     .build()
//!     .await?;
//!
//! form.submit(&FormRequest::new(json!({ "title": "hello", "body": "..." })))
//!     .await?;
//! assert!(form.record().exists());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod form;
pub mod relation;
pub mod request;
pub mod submit;
pub mod upload;

pub use config::FormConfig;
pub use error::FormError;
pub use form::{BeforeSaveHook, BeforeSaveRelationHook, Form, FormBuilder, FormDataResolver};
pub use relation::RelationSynchronizer;
pub use request::{FormRequest, Request};
pub use upload::{UploadManager, UploadRecord};
