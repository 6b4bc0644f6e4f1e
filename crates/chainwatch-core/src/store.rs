//! In-memory [`EntityStore`], used when no external store is configured.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborator::EntityStore;
use crate::error::StoreError;
use crate::types::Entity;

/// Keeps every appended entity in a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Entity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all appended entities, in append order.
    pub fn entities(&self) -> Vec<Entity> {
        self.rows
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn append(&self, entity: &Entity) -> Result<(), StoreError> {
        self.rows
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(entity.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_keeps_order() {
        let store = MemoryStore::new();
        store.append(&Entity::new("a", "sig1")).await.unwrap();
        store.append(&Entity::new("b", "sig2")).await.unwrap();

        let keys: Vec<_> = store.entities().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
