/// Errors raised by entity and blob stores.
///
/// Every variant aborts the enclosing submission and triggers the full
/// rollback sequence; nothing here is recoverable in place.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No blob store is registered under the requested disk name.
    #[error("Unknown disk '{0}'")]
    UnknownDisk(String),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage backend rejected the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Transaction protocol misuse (commit/rollback without begin,
    /// overlapping begins).
    #[error("Transaction error: {0}")]
    Transaction(String),
}
