use crate::storage::{BlobStoreRef, Container, StorageError};
use crate::Error;

/// Creates the container if needed and hands back a handle to it. An
/// already-existing container is reused; any other failure is fatal.
pub fn ensure_container(store: BlobStoreRef, name: &str) -> Result<Container, Error> {
    let container = Container::new(store, name);

    match container.create() {
        Ok(()) => log::info!("created container {}", name),
        Err(StorageError::AlreadyExists(_)) => log::info!("container {} already exists", name),
        Err(err) => return Err(Error::ContainerSetup(format!("{name}: {err}"))),
    }

    Ok(container)
}
