//! Attachment handling for one submission.
//!
//! An [`UploadManager`] is created fresh at the start of every `submit`
//! call. Every successful blob write is appended to its record list
//! before anything else can fail, so the rollback path can compensate:
//! delete what was written, ignore what is already gone, and log (not
//! raise) anything that refuses to die.

use std::sync::Arc;

use formbind_core::{FieldDescriptor, Record, UploadSpec, UploadedFile};
use formbind_store::{BlobStore, DiskRegistry};
use serde_json::Value;

use crate::error::FormError;

/// One successful blob write: which disk, which path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub disk: String,
    pub path: String,
}

/// Tracks every attachment written during the active submission.
pub struct UploadManager {
    disks: Arc<DiskRegistry>,
    records: Vec<UploadRecord>,
}

impl UploadManager {
    pub fn new(disks: Arc<DiskRegistry>) -> Self {
        Self {
            disks,
            records: Vec::new(),
        }
    }

    /// Paths written so far in this submission.
    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store `file` under the spec's path, run the post-process hook,
    /// and return the stored path.
    ///
    /// The write is recorded before the hook runs: a hook failure still
    /// leaves the blob compensatable.
    pub async fn store(
        &mut self,
        file: &UploadedFile,
        spec: &UploadSpec,
        field: &str,
        row_index: Option<usize>,
    ) -> Result<String, FormError> {
        let filename = (spec.filename)(file, field, row_index);
        let disk = self.disks.get(&spec.disk)?;
        let path = disk
            .put_file_as(spec.path.trim_matches('/'), file, &filename)
            .await?;
        self.records.push(UploadRecord {
            disk: spec.disk.clone(),
            path: path.clone(),
        });
        tracing::debug!(disk = %spec.disk, path = %path, field, "Attachment stored");

        if let Some(hook) = &spec.process_file {
            hook(path.clone(), spec.disk.clone())
                .await
                .map_err(|e| FormError::ProcessFile {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
        }

        Ok(path)
    }

    /// Delete the attachment currently referenced by `field` on `row`,
    /// if the blob store still has it.
    ///
    /// The stored value may or may not carry the upload-path prefix;
    /// both forms are normalized to a store-relative path. Callers gate
    /// this on the field's `delete_old_file` flag.
    pub async fn delete_if_exists(
        &self,
        row: &Record,
        field: &FieldDescriptor,
    ) -> Result<(), FormError> {
        let Some(spec) = &field.upload else {
            return Ok(());
        };
        let Some(value) = row.get(&field.name).and_then(Value::as_str) else {
            return Ok(());
        };
        if value.is_empty() {
            return Ok(());
        }

        let path = normalize_path(spec, value);
        let disk = self.disks.get(&spec.disk)?;
        if disk.has(&path).await? {
            disk.delete(&path).await?;
            tracing::debug!(disk = %spec.disk, path = %path, "Superseded attachment deleted");
        }
        Ok(())
    }

    /// Best-effort deletion of every recorded write, draining the list.
    ///
    /// Runs after the entity-store rollback. Already-missing targets are
    /// skipped; deletion failures are logged and do not mask the
    /// original submission error.
    pub async fn compensate(&mut self) {
        for record in std::mem::take(&mut self.records) {
            let disk = match self.disks.get(&record.disk) {
                Ok(disk) => disk,
                Err(e) => {
                    tracing::warn!(disk = %record.disk, error = %e, "Upload compensation skipped");
                    continue;
                }
            };
            match disk.has(&record.path).await {
                Ok(false) => {}
                Ok(true) => {
                    if let Err(e) = disk.delete(&record.path).await {
                        tracing::warn!(
                            disk = %record.disk,
                            path = %record.path,
                            error = %e,
                            "Failed to delete attachment during rollback",
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        disk = %record.disk,
                        path = %record.path,
                        error = %e,
                        "Could not check attachment during rollback",
                    );
                }
            }
        }
    }
}

/// Prefix `value` with the spec's upload path unless it already is.
fn normalize_path(spec: &UploadSpec, value: &str) -> String {
    let prefix = spec.path.trim_matches('/');
    if prefix.is_empty() || value.starts_with(prefix) {
        value.to_string()
    } else {
        format!("{prefix}/{value}")
    }
}
