//! In-memory reference implementation of [`EntityStore`].
//!
//! Tables are plain id-ordered maps with per-table monotonic id
//! sequences. Transactions are snapshots: `begin` clones the full
//! state, `rollback` restores it, `commit` drops it. Relations are
//! declared up front and immutable afterwards, which keeps
//! [`RelationInspector`] synchronous.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use formbind_core::{DbId, Record, RelationDef, RelationInspector, ValueMap};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::entity::EntityStore;
use crate::error::StoreError;

type Table = BTreeMap<DbId, ValueMap>;

#[derive(Default, Clone)]
struct Tables {
    rows: HashMap<String, Table>,
    sequences: HashMap<String, DbId>,
}

impl Tables {
    fn next_id(&mut self, entity: &str) -> DbId {
        let seq = self.sequences.entry(entity.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    fn table_mut(&mut self, entity: &str) -> &mut Table {
        self.rows.entry(entity.to_string()).or_default()
    }
}

#[derive(Default)]
struct State {
    tables: Tables,
    /// Present while a transaction is open; restored on rollback.
    snapshot: Option<Tables>,
}

/// In-memory entity store with snapshot transactions.
#[derive(Default)]
pub struct MemoryEntityStore {
    state: RwLock<State>,
    relations: HashMap<(String, String), RelationDef>,
    fail_saves: AtomicBool,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `entity` exposes a relation under `key`. Must be
    /// called before the store is shared; the relation map is read-only
    /// afterwards.
    pub fn with_relation(
        mut self,
        entity: impl Into<String>,
        key: impl Into<String>,
        def: RelationDef,
    ) -> Self {
        self.relations.insert((entity.into(), key.into()), def);
        self
    }

    /// Make every subsequent save or delete fail with a backend error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Insert a row directly, bypassing failure injection. Seeding
    /// helper for tests and fixtures.
    pub async fn insert(&self, entity: &str, values: ValueMap) -> DbId {
        let mut state = self.state.write().await;
        let id = state.tables.next_id(entity);
        state.tables.table_mut(entity).insert(id, values);
        id
    }

    pub async fn count(&self, entity: &str) -> usize {
        self.state
            .read()
            .await
            .tables
            .rows
            .get(entity)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Snapshot of all rows in a table, in id order.
    pub async fn rows(&self, entity: &str) -> Vec<Record> {
        self.state
            .read()
            .await
            .tables
            .rows
            .get(entity)
            .map(|table| {
                table
                    .iter()
                    .map(|(id, values)| Record::existing(*id, values.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_save(&self) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            Err(StoreError::Backend("save failed".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RelationInspector for MemoryEntityStore {
    fn relation_of(&self, entity: &str, key: &str) -> Option<RelationDef> {
        self.relations
            .get(&(entity.to_string(), key.to_string()))
            .cloned()
    }
}

/// Foreign-key match: child rows store the parent id as a JSON number.
fn fk_matches(values: &ValueMap, foreign_key: &str, parent_id: DbId) -> bool {
    values
        .get(foreign_key)
        .and_then(Value::as_i64)
        .is_some_and(|fk| fk == parent_id)
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn find(&self, entity: &str, id: DbId) -> Result<Option<Record>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .tables
            .rows
            .get(entity)
            .and_then(|table| table.get(&id))
            .map(|values| Record::existing(id, values.clone())))
    }

    async fn save(&self, entity: &str, record: &mut Record) -> Result<(), StoreError> {
        self.check_save()?;
        let mut state = self.state.write().await;
        let id = match record.id {
            Some(id) => id,
            None => {
                let id = state.tables.next_id(entity);
                record.id = Some(id);
                id
            }
        };
        state
            .tables
            .table_mut(entity)
            .insert(id, record.values.clone());
        Ok(())
    }

    async fn children(
        &self,
        relation: &RelationDef,
        parent_id: DbId,
    ) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .tables
            .rows
            .get(&relation.related)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, values)| fk_matches(values, &relation.foreign_key, parent_id))
                    .map(|(id, values)| Record::existing(*id, values.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn children_not_in(
        &self,
        relation: &RelationDef,
        parent_id: DbId,
        keep: &[DbId],
    ) -> Result<Vec<Record>, StoreError> {
        let children = self.children(relation, parent_id).await?;
        Ok(children
            .into_iter()
            .filter(|row| row.id.is_some_and(|id| !keep.contains(&id)))
            .collect())
    }

    async fn delete_children(
        &self,
        relation: &RelationDef,
        ids: &[DbId],
    ) -> Result<usize, StoreError> {
        self.check_save()?;
        let mut state = self.state.write().await;
        let Some(table) = state.tables.rows.get_mut(&relation.related) else {
            return Ok(0);
        };
        let before = table.len();
        table.retain(|id, _| !ids.contains(id));
        Ok(before - table.len())
    }

    async fn append_child(
        &self,
        relation: &RelationDef,
        parent_id: DbId,
        child: &mut Record,
    ) -> Result<(), StoreError> {
        child.set(relation.foreign_key.clone(), Value::from(parent_id));
        self.save(&relation.related, child).await
    }

    async fn begin(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.snapshot.is_some() {
            return Err(StoreError::Transaction(
                "transaction already in progress".to_string(),
            ));
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::Transaction("commit without begin".to_string()))
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| StoreError::Transaction("rollback without begin".to_string()))?;
        state.tables = snapshot;
        Ok(())
    }
}
