//! Remote object storage.
//!
//! [`BlobStore`] is the seam between the sink and the storage service: it can
//! create a container and upload a blob into one. [`azure::AzureBlobStore`]
//! talks to Azure Blob Storage through `object_store`, [`memory::MemoryStore`]
//! keeps everything in process.

mod auth;
pub mod azure;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use azure::AzureBlobStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("resource already exists ({0})")]
    AlreadyExists(String),

    #[error("request rejected with status {status} ({}): {message}", .code.as_deref().unwrap_or("no error code"))]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("object store failure: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("can't start storage runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Container and blob operations against an object store.
///
/// Implementations are shared read-only between sinks, hence `Send + Sync`.
pub trait BlobStore: Send + Sync {
    fn create_container(&self, container: &str) -> Result<(), StorageError>;

    fn upload_blob(
        &self,
        container: &str,
        path: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), StorageError>;
}

pub type BlobStoreRef = Arc<dyn BlobStore>;

/// Handle to one named container of a [`BlobStore`].
#[derive(Clone)]
pub struct Container {
    store: BlobStoreRef,
    name: String,
}

impl Container {
    pub fn new(store: BlobStoreRef, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create(&self) -> Result<(), StorageError> {
        self.store.create_container(&self.name)
    }

    pub fn upload(&self, path: &str, content: Vec<u8>, overwrite: bool) -> Result<(), StorageError> {
        self.store.upload_blob(&self.name, path, content, overwrite)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Container<{}>", self.name)
    }
}
