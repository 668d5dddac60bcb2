//! Keyed blob stores for form attachments.
//!
//! A [`BlobStore`] is addressed by store-relative paths and is NOT
//! covered by the entity store's transaction: the submission pipeline
//! records every write and compensates on failure. Stores are looked up
//! by disk name through a [`DiskRegistry`] built once at process start
//! and shared by reference into every form instance.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use formbind_core::UploadedFile;
use tokio::sync::RwLock;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

/// A keyed blob store holding form attachments.
///
/// `delete` is idempotent: deleting a path that does not exist is a
/// no-op, so compensation can retry safely.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Write `file` under `dir/filename` and return the full path.
    async fn put_file_as(
        &self,
        dir: &str,
        file: &UploadedFile,
        filename: &str,
    ) -> Result<String, StoreError>;

    async fn has(&self, path: &str) -> Result<bool, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Join a directory prefix and a filename, tolerating an empty prefix.
fn join_path(dir: &str, filename: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        filename.to_string()
    } else {
        format!("{dir}/{filename}")
    }
}

// ---------------------------------------------------------------------------
// DiskRegistry
// ---------------------------------------------------------------------------

/// Named blob stores, resolved by upload specs at submit time.
///
/// Constructed once at process start; form instances hold it behind an
/// `Arc` and never mutate it.
#[derive(Default)]
pub struct DiskRegistry {
    disks: HashMap<String, Arc<dyn BlobStore>>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disk(mut self, name: impl Into<String>, store: Arc<dyn BlobStore>) -> Self {
        self.disks.insert(name.into(), store);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn BlobStore>, StoreError> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownDisk(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.disks.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// In-memory blob store.
///
/// The reference implementation for tests; `fail_puts`/`fail_deletes`
/// inject backend failures so compensation paths can be exercised.
#[derive(Default, Debug)]
pub struct MemoryBlobStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_file_as` fail with a backend error.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail with a backend error.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    pub async fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_file_as(
        &self,
        dir: &str,
        file: &UploadedFile,
        filename: &str,
    ) -> Result<String, StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write failed".to_string()));
        }
        let path = join_path(dir, filename);
        self.files
            .write()
            .await
            .insert(path.clone(), file.bytes.clone());
        Ok(path)
    }

    async fn has(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.files.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("delete failed".to_string()));
        }
        self.files.write().await.remove(path);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LocalBlobStore
// ---------------------------------------------------------------------------

/// Blob store rooted at a local directory.
#[derive(Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a store-relative path under the root, rejecting absolute
    /// paths and parent-directory segments.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoreError::Backend(format!(
                "Path '{path}' escapes the storage root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_file_as(
        &self,
        dir: &str,
        file: &UploadedFile,
        filename: &str,
    ) -> Result<String, StoreError> {
        let path = join_path(dir, filename);
        let target = self.resolve(&path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &file.bytes).await?;
        Ok(path)
    }

    async fn has(&self, path: &str) -> Result<bool, StoreError> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
