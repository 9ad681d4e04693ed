//! Blob naming: `{root_folder}/{stream}/{file_name}`.

use chrono::NaiveDateTime;

use crate::config::TargetConfig;

pub const DEFAULT_FILE_NAME_TEMPLATE: &str = "{stream}_{timestamp}.csv";

pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const DATE_FORMAT: &str = "%Y%m%d";
const TIME_FORMAT: &str = "%H%M%S";

const ILLEGAL_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    root_folder: String,
    template: String,
    sanitize: bool,
}

impl Naming {
    pub fn new(root_folder: &str, template: &str, sanitize: bool) -> Self {
        Self {
            root_folder: root_folder.to_string(),
            template: template.to_string(),
            sanitize,
        }
    }

    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(
            config.root_folder.as_deref().unwrap_or_default(),
            config
                .file_name_template
                .as_deref()
                .unwrap_or(DEFAULT_FILE_NAME_TEMPLATE),
            config.sanitize_file_names.unwrap_or_default(),
        )
    }

    pub fn blob_path(&self, stream: &str, now: NaiveDateTime) -> String {
        let mut file_name = format_file_name(stream, &self.template, now);

        if self.sanitize {
            file_name = sanitize(&file_name);
        }

        compose(&self.root_folder, stream, &file_name)
    }
}

/// Substitutes the known tokens; anything else in braces stays as written.
pub fn format_file_name(stream: &str, template: &str, now: NaiveDateTime) -> String {
    template
        .replace("{stream}", stream)
        .replace("{timestamp}", &now.format(TIMESTAMP_FORMAT).to_string())
        .replace("{date}", &now.format(DATE_FORMAT).to_string())
        .replace("{time}", &now.format(TIME_FORMAT).to_string())
}

pub fn compose(root_folder: &str, stream: &str, file_name: &str) -> String {
    let root = root_folder.trim_end_matches('/');

    if root.is_empty() {
        format!("{stream}/{file_name}")
    } else {
        format!("{root}/{stream}/{file_name}")
    }
}

pub fn sanitize(file_name: &str) -> String {
    file_name.replace(ILLEGAL_CHARS, "_")
}
