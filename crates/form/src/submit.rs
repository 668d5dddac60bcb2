//! The submission pipeline: one all-or-nothing pass over two resources.
//!
//! Validate -> resolve values -> process uploads -> fill entity ->
//! before-save hook -> persist -> sync relations -> commit. Any failure
//! after validation rolls the entity-store transaction back, then
//! compensates every blob written so far, then re-raises the original
//! error. The blob store is outside the transaction, so compensation is
//! a best-effort saga: a crash between write and compensating delete
//! can orphan an attachment, and that trade-off is accepted rather than
//! papered over.

use std::sync::Arc;

use formbind_core::{FieldKind, ValueMap};
use formbind_store::EntityStore;
use serde_json::Value;

use crate::error::FormError;
use crate::form::Form;
use crate::relation::RelationSynchronizer;
use crate::request::Request;
use crate::upload::UploadManager;

impl Form {
    /// Run one submission. Returns `Ok(())` after commit, or the
    /// original failure after rollback and compensation.
    pub async fn submit(&mut self, request: &dyn Request) -> Result<(), FormError> {
        // Validation runs before the transaction opens: a rejected
        // request has no effects to undo.
        request
            .validate(&self.rules())
            .map_err(FormError::Validation)?;
        tracing::debug!(entity = %self.entity, mode = ?self.mode, "Submission validated");

        self.store.begin().await?;
        let mut uploads = UploadManager::new(Arc::clone(&self.disks));

        match self.run_pipeline(request, &mut uploads).await {
            Ok(()) => match self.store.commit().await {
                Ok(()) => {
                    self.committed();
                    tracing::info!(
                        entity = %self.entity,
                        id = ?self.record.id,
                        uploads = uploads.len(),
                        "Submission committed",
                    );
                    Ok(())
                }
                Err(e) => self.abort(e.into(), uploads).await,
            },
            Err(e) => self.abort(e, uploads).await,
        }
    }

    /// Roll back the entity store, compensate recorded uploads, and
    /// re-raise the original error unchanged.
    async fn abort(&mut self, err: FormError, mut uploads: UploadManager) -> Result<(), FormError> {
        if let Err(rollback_err) = self.store.rollback().await {
            tracing::error!(
                entity = %self.entity,
                error = %rollback_err,
                "Entity store rollback failed",
            );
        }
        uploads.compensate().await;
        tracing::warn!(entity = %self.entity, error = %err, "Submission rolled back");
        Err(err)
    }

    async fn run_pipeline(
        &mut self,
        request: &dyn Request,
        uploads: &mut UploadManager,
    ) -> Result<(), FormError> {
        let ctx = self.context();

        // Resolve submit values for persistable scalar fields. A
        // registered resolver always runs (even on an absent value);
        // otherwise absent and null values are left untouched.
        let mut values = ValueMap::new();
        for (key, field) in &self.schema {
            let FieldKind::Scalar(f) = field else {
                continue;
            };
            if !f.exists || f.disabled {
                continue;
            }
            let submitted = request.get(key);
            match &f.submit_value {
                Some(resolver) => {
                    let resolved = resolver(submitted.unwrap_or(Value::Null), &ctx);
                    values.insert(key.clone(), resolved);
                }
                None => {
                    if let Some(v) = submitted {
                        if !v.is_null() {
                            values.insert(key.clone(), v);
                        }
                    }
                }
            }
        }

        // Store incoming attachments for the root entity; stored paths
        // become the fields' submit values. Superseded files go first,
        // and only on an existing entity.
        for (key, field) in &self.schema {
            let FieldKind::Scalar(f) = field else {
                continue;
            };
            if !f.is_uploadable() {
                continue;
            }
            let Some(file) = request.file(key) else {
                continue;
            };
            let Some(spec) = &f.upload else {
                continue;
            };

            if self.mode.is_update() && spec.delete_old_file {
                uploads.delete_if_exists(&self.record, f).await?;
            }
            let path = uploads.store(file, spec, key, None).await?;
            values.insert(key.clone(), Value::String(path));
        }

        self.record.fill(&values);

        if let Some(hook) = &self.before_save {
            hook(&mut self.record, &ctx);
        }

        self.store.save(&self.entity, &mut self.record).await?;
        tracing::debug!(entity = %self.entity, id = ?self.record.id, "Entity persisted");

        // Relation sync, in declared field order. The context is
        // rebuilt so hooks and resolvers observe the assigned id.
        let ctx = self.context();
        for (key, field) in &self.schema {
            let FieldKind::Relation(rel) = field else {
                continue;
            };
            if !rel.exists {
                continue;
            }
            let hook = self.before_save_relation.get(key);
            RelationSynchronizer::new(self.store.as_ref(), uploads, &ctx, self.mode)
                .sync(rel, &self.record, request, hook)
                .await?;
        }

        Ok(())
    }

    /// Post-commit extension point; intentionally does nothing.
    fn committed(&self) {}
}
