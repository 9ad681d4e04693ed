use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use strum_macros::Display;

use crate::Error;

/// A single record: field name to scalar value, keys kept in arrival order.
pub type Record = Map<String, JsonValue>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchemaMessage {
    pub stream: String,
    pub schema: JsonValue,

    #[serde(default)]
    pub key_properties: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_properties: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordMessage {
    pub stream: String,
    pub record: Record,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_extracted: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StateMessage {
    pub value: JsonValue,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActivateVersionMessage {
    pub stream: String,
    pub version: u64,
}

/// One line of the upstream protocol, tagged by its `type` field.
#[derive(Serialize, Deserialize, Display, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Schema(SchemaMessage),
    Record(RecordMessage),
    State(StateMessage),
    ActivateVersion(ActivateVersionMessage),
}

impl Message {
    pub fn parse(line: &str) -> Result<Message, Error> {
        serde_json::from_str(line)
            .map_err(|err| Error::Message(format!("invalid message `{}`: {}", truncate(line), err)))
    }

    pub fn stream(&self) -> Option<&str> {
        match self {
            Message::Schema(x) => Some(&x.stream),
            Message::Record(x) => Some(&x.stream),
            Message::ActivateVersion(x) => Some(&x.stream),
            Message::State(_) => None,
        }
    }
}

fn truncate(line: &str) -> &str {
    const MAX: usize = 80;

    match line.char_indices().nth(MAX) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
