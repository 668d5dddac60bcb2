//! Shared primitive types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// All entity identifiers are 64-bit integers assigned by the entity store.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Dynamic value map backing records, submit values, and view data.
pub type ValueMap = serde_json::Map<String, Value>;

/// Whether a form targets a new entity or an existing one.
///
/// Decided once at form construction from the bound record and fixed
/// for the lifetime of the form; mode-specific rules and the relation
/// deletion pass key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormMode {
    Create,
    Update,
}

impl FormMode {
    pub fn is_create(self) -> bool {
        matches!(self, Self::Create)
    }

    pub fn is_update(self) -> bool {
        matches!(self, Self::Update)
    }
}

/// A persistent row: an optional identifier plus a dynamic value map.
///
/// `id == None` means the row has not been persisted yet; the entity
/// store assigns the identifier on first save. Ownership of the
/// persisted row stays with the store — a `Record` is only a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<DbId>,
    pub values: ValueMap,
}

impl Record {
    /// A fresh, unpersisted record with no values.
    pub fn new() -> Self {
        Self::default()
    }

    /// An unpersisted record carrying initial values.
    pub fn with_values(values: ValueMap) -> Self {
        Self { id: None, values }
    }

    /// A snapshot of an already-persisted row.
    pub fn existing(id: DbId, values: ValueMap) -> Self {
        Self {
            id: Some(id),
            values,
        }
    }

    /// Whether this record is backed by a persisted row.
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merge `values` into this record, overwriting existing keys.
    pub fn fill(&mut self, values: &ValueMap) {
        for (k, v) in values {
            self.values.insert(k.clone(), v.clone());
        }
    }
}
