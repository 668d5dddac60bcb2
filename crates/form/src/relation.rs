//! Nested-relation synchronization.
//!
//! Runs after the parent entity is persisted, once per relation field
//! in declared order. To-many relations are diffed against the
//! submitted rows (delete, update, create); to-one relations bind the
//! single submitted value map onto the one related row. Attachment
//! handling is shared: superseded files are deleted row by row, new
//! files are stored and their paths written into the row.

use formbind_core::{
    CoreError, DbId, FormMode, Record, RelationFieldDescriptor, RelationKind, SubmissionContext,
    ValueMap,
};
use formbind_store::EntityStore;
use serde_json::Value;

use crate::error::FormError;
use crate::form::BeforeSaveRelationHook;
use crate::request::Request;
use crate::upload::UploadManager;

/// Child-row primary key, as submitted alongside row values.
const ID_KEY: &str = "id";

/// Drives one relation's sync pass inside an active submission.
pub struct RelationSynchronizer<'a> {
    store: &'a dyn EntityStore,
    uploads: &'a mut UploadManager,
    ctx: &'a SubmissionContext,
    mode: FormMode,
}

impl<'a> RelationSynchronizer<'a> {
    pub fn new(
        store: &'a dyn EntityStore,
        uploads: &'a mut UploadManager,
        ctx: &'a SubmissionContext,
        mode: FormMode,
    ) -> Self {
        Self {
            store,
            uploads,
            ctx,
            mode,
        }
    }

    /// Synchronize `rel` for a persisted parent.
    pub async fn sync(
        &mut self,
        rel: &RelationFieldDescriptor,
        parent: &Record,
        request: &dyn Request,
        hook: Option<&BeforeSaveRelationHook>,
    ) -> Result<(), FormError> {
        let parent_id = parent.id.ok_or_else(|| {
            CoreError::Internal(format!(
                "Relation '{}' synchronized before the parent was persisted",
                rel.name
            ))
        })?;
        match rel.relation.kind {
            RelationKind::ToMany => self.sync_to_many(rel, parent_id, request, hook).await,
            RelationKind::ToOne => self.sync_to_one(rel, parent_id, request, hook).await,
        }
    }

    async fn sync_to_many(
        &mut self,
        rel: &RelationFieldDescriptor,
        parent_id: DbId,
        request: &dyn Request,
        hook: Option<&BeforeSaveRelationHook>,
    ) -> Result<(), FormError> {
        let rows = submitted_rows(rel, request, self.ctx);
        let submitted_ids: Vec<DbId> = rows.iter().filter_map(row_id).collect();

        // Deletion pass. When no submitted row carries an identifier
        // there is nothing to diff against, so nothing is deleted --
        // an empty submission does not clear the relation.
        if self.mode.is_update() && !submitted_ids.is_empty() {
            let orphans = self
                .store
                .children_not_in(&rel.relation, parent_id, &submitted_ids)
                .await?;
            if !orphans.is_empty() {
                for row in &orphans {
                    for (_, field) in rel.uploadable_fields() {
                        if field.upload.as_ref().is_some_and(|s| s.delete_old_file) {
                            self.uploads.delete_if_exists(row, field).await?;
                        }
                    }
                }
                let ids: Vec<DbId> = orphans.iter().filter_map(|r| r.id).collect();
                let deleted = self.store.delete_children(&rel.relation, &ids).await?;
                tracing::debug!(relation = %rel.name, deleted, "Removed child rows absent from submission");
            }
        }

        // Upsert pass, in submitted order.
        for (index, mut values) in rows.into_iter().enumerate() {
            let mut row = match row_id(&values) {
                Some(id) => self
                    .store
                    .find(&rel.relation.related, id)
                    .await?
                    .unwrap_or_default(),
                None => Record::new(),
            };

            self.apply_uploads(rel, &mut row, &mut values, request, Some(index))
                .await?;
            fill_declared(rel, &mut row, &values);
            if let Some(hook) = hook {
                hook(&mut row, self.ctx);
            }

            if row.exists() {
                self.store.save(&rel.relation.related, &mut row).await?;
            } else {
                self.store
                    .append_child(&rel.relation, parent_id, &mut row)
                    .await?;
            }
        }

        Ok(())
    }

    /// To-one: no diff pass. The single submitted map binds onto the
    /// existing related row, or a fresh one when none exists yet.
    async fn sync_to_one(
        &mut self,
        rel: &RelationFieldDescriptor,
        parent_id: DbId,
        request: &dyn Request,
        hook: Option<&BeforeSaveRelationHook>,
    ) -> Result<(), FormError> {
        let Some(Value::Object(mut values)) = request.get(&rel.name) else {
            return Ok(());
        };
        apply_submit_resolvers(rel, &mut values, self.ctx);

        let mut row = self
            .store
            .children(&rel.relation, parent_id)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        self.apply_uploads(rel, &mut row, &mut values, request, None)
            .await?;
        fill_declared(rel, &mut row, &values);
        if let Some(hook) = hook {
            hook(&mut row, self.ctx);
        }

        if row.exists() {
            self.store.save(&rel.relation.related, &mut row).await?;
        } else {
            self.store
                .append_child(&rel.relation, parent_id, &mut row)
                .await?;
        }
        Ok(())
    }

    /// Store incoming attachments for one child row, deleting the
    /// superseded file first when the row already exists and the field
    /// asks for it. Stored paths overwrite the row's submitted value.
    async fn apply_uploads(
        &mut self,
        rel: &RelationFieldDescriptor,
        row: &mut Record,
        values: &mut ValueMap,
        request: &dyn Request,
        index: Option<usize>,
    ) -> Result<(), FormError> {
        for (child_key, field) in rel.uploadable_fields() {
            let file_key = match index {
                Some(i) => format!("{}.{i}.{child_key}", rel.name),
                None => format!("{}.{child_key}", rel.name),
            };
            let Some(file) = request.file(&file_key) else {
                continue;
            };
            let Some(spec) = &field.upload else {
                continue;
            };

            if row.exists() && spec.delete_old_file {
                self.uploads.delete_if_exists(row, field).await?;
            }
            let path = self.uploads.store(file, spec, child_key, index).await?;
            values.insert(child_key.clone(), Value::String(path));
        }
        Ok(())
    }
}

/// Extract the submitted row maps for a to-many relation. A missing or
/// non-array value is an empty submission; non-object entries are
/// dropped. Child submit-value resolvers run on each present value.
fn submitted_rows(
    rel: &RelationFieldDescriptor,
    request: &dyn Request,
    ctx: &SubmissionContext,
) -> Vec<ValueMap> {
    let Some(Value::Array(items)) = request.get(&rel.name) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .map(|mut map| {
            apply_submit_resolvers(rel, &mut map, ctx);
            map
        })
        .collect()
}

fn apply_submit_resolvers(rel: &RelationFieldDescriptor, map: &mut ValueMap, ctx: &SubmissionContext) {
    for (key, field) in &rel.fields {
        let Some(resolver) = &field.submit_value else {
            continue;
        };
        if let Some(value) = map.remove(key) {
            map.insert(key.clone(), resolver(value, ctx));
        }
    }
}

/// Copy submitted values for declared, persistable child fields onto
/// the row. Undeclared keys (including the identifier) never reach the
/// entity store.
fn fill_declared(rel: &RelationFieldDescriptor, row: &mut Record, values: &ValueMap) {
    for (key, field) in &rel.fields {
        if !field.exists || field.disabled {
            continue;
        }
        if let Some(value) = values.get(key) {
            row.set(key.clone(), value.clone());
        }
    }
}

/// The submitted identifier of a child row, if any. Accepts numbers and
/// numeric strings; anything else marks the row as new.
fn row_id(values: &ValueMap) -> Option<DbId> {
    match values.get(ID_KEY)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
