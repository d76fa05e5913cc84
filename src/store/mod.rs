//! Session-keyed persistence for chunk/embedding pairs.
//!
//! The search service only depends on the [`ChunkStore`] capability, so
//! backends can be swapped without touching chunking or ranking:
//!
//! - `memory`: process-local map, lost on exit
//! - `file`: one checksummed binary file per session

mod file;
mod lock;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::eid::ItemId;

/// A chunk persisted under a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub id: ItemId,
    pub session_id: String,
    pub chunk: String,
    pub embedding: Vec<f32>,
}

/// A chunk waiting to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub chunk: String,
    pub embedding: Vec<f32>,
}

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: session was stored with a different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Lock poisoned: {0}")]
    Poisoned(String),

    #[error("Stored {stored} items before failing: {source}")]
    Partial {
        stored: usize,
        #[source]
        source: Box<StoreError>,
    },
}

/// Append-only persistence keyed by session id.
pub trait ChunkStore: Send + Sync {
    /// Backend name, for logs and health reports.
    fn name(&self) -> &str;

    /// Persist one chunk under `session_id`.
    fn append(&self, session_id: &str, chunk: &str, embedding: &[f32])
        -> Result<ItemId, StoreError>;

    /// Persist several chunks under `session_id`, in order.
    ///
    /// The default appends one at a time; if an append fails after others
    /// succeeded, the already-written count is reported in
    /// [`StoreError::Partial`] and nothing is rolled back. Backends that can
    /// write a batch atomically should override this.
    fn append_all(&self, session_id: &str, items: &[NewItem]) -> Result<Vec<ItemId>, StoreError> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            match self.append(session_id, &item.chunk, &item.embedding) {
                Ok(id) => ids.push(id),
                Err(err) if ids.is_empty() => return Err(err),
                Err(err) => {
                    return Err(StoreError::Partial {
                        stored: ids.len(),
                        source: Box::new(err),
                    })
                }
            }
        }
        Ok(ids)
    }

    /// All chunks stored under `session_id`, in enumeration order.
    ///
    /// Unknown sessions yield an empty list.
    fn fetch_all(&self, session_id: &str) -> Result<Vec<StoredItem>, StoreError>;

    /// Check the backend is reachable and writable.
    fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
