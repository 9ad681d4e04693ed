use std::path::Path;

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::Error;

pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10;

pub const ENV_PREFIX: &str = "TARGET_AZURE";

#[derive(Default, Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    #[serde(default)]
    pub storage_account_name: String,
    pub storage_account_key: Option<String>,

    #[serde(default)]
    pub container_name: String,
    pub root_folder: Option<String>,

    #[serde(alias = "naming_convention")]
    pub file_name_template: Option<String>,
    pub max_buffer_size: Option<usize>,
    pub sanitize_file_names: Option<bool>,

    pub storage_endpoint: Option<String>,
}

impl TargetConfig {
    /// Reads the optional config file, layers `TARGET_AZURE_*` env vars on top
    /// and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: TargetConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.storage_account_name.trim().is_empty() {
            return Err(missing("storage_account_name"));
        }

        match self.storage_account_key.as_deref() {
            Some(key) if !key.trim().is_empty() => (),
            _ => return Err(missing("storage_account_key")),
        }

        if self.container_name.trim().is_empty() {
            return Err(missing("container_name"));
        }

        if self.max_buffer_size == Some(0) {
            return Err(Error::Config(
                "max_buffer_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn account_key(&self) -> &str {
        self.storage_account_key.as_deref().unwrap_or_default()
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size.unwrap_or(DEFAULT_MAX_BUFFER_SIZE)
    }
}

fn missing(option: &str) -> Error {
    Error::Config(format!("missing required option `{option}`"))
}
