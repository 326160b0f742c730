use std::collections::HashMap;
use std::sync::RwLock;

use resup_protocol::{Checkpoint, UploadId};

use crate::{CheckpointError, CheckpointStore};

/// Volatile checkpoint store. Useful for tests and for embedding where
/// surviving a restart is not required.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    offsets: RwLock<HashMap<UploadId, u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, upload_id: &UploadId) -> u64 {
        self.offsets
            .read()
            .map(|m| m.get(upload_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn set(&self, upload_id: &UploadId, bytes: u64) -> Result<(), CheckpointError> {
        let mut map = self.offsets.write().unwrap_or_else(|e| e.into_inner());
        map.insert(upload_id.clone(), bytes);
        Ok(())
    }

    fn clear(&self, upload_id: &UploadId) -> Result<(), CheckpointError> {
        let mut map = self.offsets.write().unwrap_or_else(|e| e.into_inner());
        map.remove(upload_id);
        Ok(())
    }

    fn entries(&self) -> Vec<Checkpoint> {
        let map = self.offsets.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Checkpoint> = map
            .iter()
            .map(|(id, &bytes)| Checkpoint {
                upload_id: id.clone(),
                bytes_confirmed: bytes,
            })
            .collect();
        out.sort_by(|a, b| a.upload_id.cmp(&b.upload_id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_is_zero() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.get(&"missing".into()), 0);
    }

    #[test]
    fn set_get_clear() {
        let store = MemoryCheckpointStore::new();
        let id = UploadId::from("u1");
        store.set(&id, 65536).unwrap();
        assert_eq!(store.get(&id), 65536);

        store.clear(&id).unwrap();
        assert_eq!(store.get(&id), 0);
        // Idempotent.
        store.clear(&id).unwrap();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn keys_are_disjoint() {
        let store = MemoryCheckpointStore::new();
        store.set(&"a".into(), 10).unwrap();
        store.set(&"b".into(), 20).unwrap();
        assert_eq!(store.get(&"a".into()), 10);
        assert_eq!(store.get(&"b".into()), 20);
        assert_eq!(store.entries().len(), 2);
    }
}
