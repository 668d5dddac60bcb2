//! Resource abstractions for the formbind form-to-entity binder.
//!
//! Two heterogeneous resources back a form submission: a transactional
//! entity store ([`EntityStore`]) and a non-transactional keyed blob
//! store ([`BlobStore`]). Both are async traits; this crate ships
//! in-memory reference implementations plus a local-filesystem blob
//! store. The submission pipeline in the `formbind` crate coordinates
//! the two with a compensating saga.

pub mod blob;
pub mod entity;
pub mod error;
pub mod memory;

pub use blob::{BlobStore, DiskRegistry, LocalBlobStore, MemoryBlobStore};
pub use entity::EntityStore;
pub use error::StoreError;
pub use memory::MemoryEntityStore;
