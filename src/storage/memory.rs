//! In-process [`BlobStore`] that records every call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BlobStore, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub container: String,
    pub path: String,
    pub content: Vec<u8>,
}

impl StoredBlob {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[derive(Default)]
struct State {
    containers: BTreeSet<String>,
    blobs: BTreeMap<(String, String), Vec<u8>>,
    uploads: Vec<StoredBlob>,
    create_calls: usize,
    upload_calls: usize,
    failing_uploads: usize,
    rejecting_creates: Option<u16>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(name: &str) -> Self {
        let store = Self::default();
        store.lock().containers.insert(name.to_string());
        store
    }

    /// The next `count` uploads fail with a 503 rejection.
    pub fn fail_next_uploads(&self, count: usize) {
        self.lock().failing_uploads = count;
    }

    /// Every container creation fails with the given status.
    pub fn reject_creates(&self, status: u16) {
        self.lock().rejecting_creates = Some(status);
    }

    pub fn containers(&self) -> Vec<String> {
        self.lock().containers.iter().cloned().collect()
    }

    pub fn blob(&self, container: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .blobs
            .get(&(container.to_string(), path.to_string()))
            .cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    /// Successful uploads in the order they happened.
    pub fn uploads(&self) -> Vec<StoredBlob> {
        self.lock().uploads.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    /// Upload attempts, failed ones included.
    pub fn upload_calls(&self) -> usize {
        self.lock().upload_calls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlobStore for MemoryStore {
    fn create_container(&self, container: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.create_calls += 1;

        if let Some(status) = state.rejecting_creates {
            return Err(StorageError::Rejected {
                status,
                code: Some("AuthorizationPermissionMismatch".to_string()),
                message: format!("cannot create container {container}"),
            });
        }

        if !state.containers.insert(container.to_string()) {
            return Err(StorageError::AlreadyExists(
                "ContainerAlreadyExists".to_string(),
            ));
        }

        Ok(())
    }

    fn upload_blob(
        &self,
        container: &str,
        path: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.upload_calls += 1;

        if state.failing_uploads > 0 {
            state.failing_uploads -= 1;
            return Err(StorageError::Rejected {
                status: 503,
                code: Some("ServerBusy".to_string()),
                message: "simulated upload failure".to_string(),
            });
        }

        if !state.containers.contains(container) {
            return Err(StorageError::Rejected {
                status: 404,
                code: Some("ContainerNotFound".to_string()),
                message: format!("container {container} does not exist"),
            });
        }

        let key = (container.to_string(), path.to_string());

        if !overwrite && state.blobs.contains_key(&key) {
            return Err(StorageError::AlreadyExists("BlobAlreadyExists".to_string()));
        }

        state.blobs.insert(key, content.clone());
        state.uploads.push(StoredBlob {
            container: container.to_string(),
            path: path.to_string(),
            content,
        });

        Ok(())
    }
}
