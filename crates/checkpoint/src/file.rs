use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use resup_protocol::{Checkpoint, UploadId};
use tracing::{debug, warn};

use crate::{CheckpointError, CheckpointStore, storage_key, upload_id_from_key};

/// Checkpoint store persisted as a single JSON object file.
///
/// The map is cached in memory and loaded once on open. Every mutation
/// rewrites the whole file through a synced temp file and an atomic rename,
/// so after a crash the file holds either the previous or the new map.
pub struct FileCheckpointStore {
    path: PathBuf,
    offsets: Mutex<BTreeMap<String, u64>>,
}

impl FileCheckpointStore {
    /// Opens the store at `path`, loading existing entries. A missing file
    /// is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let offsets = load_offsets(&path)?;
        Ok(Self {
            path,
            offsets: Mutex::new(offsets),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `map` to disk. Called with the map lock held so renames
    /// never interleave.
    fn persist(&self, map: &BTreeMap<String, u64>) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(map)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = tmp_path(&self.path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        debug!(entries = map.len(), path = %self.path.display(), "persisted checkpoints");
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn get(&self, upload_id: &UploadId) -> u64 {
        let map = self.offsets.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&storage_key(upload_id)).copied().unwrap_or(0)
    }

    fn set(&self, upload_id: &UploadId, bytes: u64) -> Result<(), CheckpointError> {
        let mut map = self.offsets.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(storage_key(upload_id), bytes);
        self.persist(&map)
    }

    fn clear(&self, upload_id: &UploadId) -> Result<(), CheckpointError> {
        let mut map = self.offsets.lock().unwrap_or_else(|e| e.into_inner());
        if map.remove(&storage_key(upload_id)).is_none() {
            return Ok(());
        }
        self.persist(&map)
    }

    fn entries(&self) -> Vec<Checkpoint> {
        let map = self.offsets.lock().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .filter_map(|(key, &bytes)| {
                upload_id_from_key(key).map(|upload_id| Checkpoint {
                    upload_id,
                    bytes_confirmed: bytes,
                })
            })
            .collect()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Loads offsets from a JSON file on disk.
fn load_offsets(path: &Path) -> Result<BTreeMap<String, u64>, CheckpointError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        warn!(path = %path.display(), "checkpoint file is empty, starting fresh");
        return Ok(BTreeMap::new());
    }
    let offsets: BTreeMap<String, u64> = serde_json::from_str(&data)?;
    debug!("loaded {} checkpoint(s) from {:?}", offsets.len(), path);
    Ok(offsets)
}
