//! The transactional entity store contract.
//!
//! The form pipeline talks to persistence exclusively through
//! [`EntityStore`]: find/save for the root entity, the child-row
//! operations the relation synchronizer needs, and a single-level
//! transaction protocol. Relation introspection
//! ([`formbind_core::RelationInspector`]) is part of the contract so
//! schema resolution can classify relation fields without async I/O.

use async_trait::async_trait;
use formbind_core::{DbId, Record, RelationDef, RelationInspector};

use crate::error::StoreError;

/// A transactional entity store.
///
/// `save` is an upsert: records with `id == None` are inserted and
/// assigned an identifier; records with an id are written in place.
/// Child rows are addressed through the [`RelationDef`] resolved at
/// schema-construction time.
#[async_trait]
pub trait EntityStore: RelationInspector + Send + Sync {
    /// Fetch one row by id, or `None` when it does not exist.
    async fn find(&self, entity: &str, id: DbId) -> Result<Option<Record>, StoreError>;

    /// Insert or update `record`, assigning `record.id` on insert.
    async fn save(&self, entity: &str, record: &mut Record) -> Result<(), StoreError>;

    /// All child rows of `parent_id` under `relation`, in id order.
    async fn children(
        &self,
        relation: &RelationDef,
        parent_id: DbId,
    ) -> Result<Vec<Record>, StoreError>;

    /// Child rows of `parent_id` whose id is NOT in `keep`.
    async fn children_not_in(
        &self,
        relation: &RelationDef,
        parent_id: DbId,
        keep: &[DbId],
    ) -> Result<Vec<Record>, StoreError>;

    /// Delete the child rows with the given ids. Returns the number of
    /// rows actually removed.
    async fn delete_children(
        &self,
        relation: &RelationDef,
        ids: &[DbId],
    ) -> Result<usize, StoreError>;

    /// Insert `child` as a new row under `parent_id`, setting the
    /// foreign key and assigning `child.id`.
    async fn append_child(
        &self,
        relation: &RelationDef,
        parent_id: DbId,
        child: &mut Record,
    ) -> Result<(), StoreError>;

    async fn begin(&self) -> Result<(), StoreError>;

    async fn commit(&self) -> Result<(), StoreError>;

    async fn rollback(&self) -> Result<(), StoreError>;
}
