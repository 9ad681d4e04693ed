use thiserror::Error;

use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error - {0}")]
    Config(String),

    #[error("container setup error - {0}")]
    ContainerSetup(String),

    #[error("upload error - {0}")]
    Upload(String),

    #[error("serialization error - {0}")]
    Serialization(String),

    #[error("message error - {0}")]
    Message(String),

    #[error("io error - {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn upload(path: &str, source: StorageError) -> Self {
        Error::Upload(format!("{path}: {source}"))
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Message(err.to_string())
    }
}
