use std::collections::HashMap;
use std::sync::RwLock;

use crate::eid::ItemId;
use crate::store::{ChunkStore, NewItem, StoreError, StoredItem};

/// Process-local store. Items are kept per session in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Vec<StoredItem>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn append(
        &self,
        session_id: &str,
        chunk: &str,
        embedding: &[f32],
    ) -> Result<ItemId, StoreError> {
        let ids = self.append_all(
            session_id,
            &[NewItem {
                chunk: chunk.to_string(),
                embedding: embedding.to_vec(),
            }],
        )?;
        ids.into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidFormat("append produced no id".to_string()))
    }

    fn append_all(&self, session_id: &str, items: &[NewItem]) -> Result<Vec<ItemId>, StoreError> {
        if items.is_empty() {
            return Ok(vec![]);
        }

        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        // Every item in a session must share the first item's dimension
        let expected = sessions
            .get(session_id)
            .and_then(|stored| stored.first())
            .map(|item| item.embedding.len())
            .unwrap_or(items[0].embedding.len());
        if let Some(bad) = items.iter().find(|item| item.embedding.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                got: bad.embedding.len(),
            });
        }

        let stored = sessions.entry(session_id.to_string()).or_default();

        let ids: Vec<ItemId> = items
            .iter()
            .map(|item| {
                let id = ItemId::new();
                stored.push(StoredItem {
                    id: id.clone(),
                    session_id: session_id.to_string(),
                    chunk: item.chunk.clone(),
                    embedding: item.embedding.clone(),
                });
                id
            })
            .collect();

        Ok(ids)
    }

    fn fetch_all(&self, session_id: &str) -> Result<Vec<StoredItem>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    fn health_check(&self) -> Result<(), StoreError> {
        self.sessions
            .read()
            .map(|_| ())
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}
