//! Buffered CSV sink for Azure Blob Storage.
//!
//! Records arrive one stream at a time, are buffered in memory by a
//! [`sink::Sink`], and every time the buffer reaches its threshold the whole
//! batch is serialized to CSV and uploaded as a new blob named after the
//! stream and the flush timestamp. [`target::Target`] owns one sink per
//! stream and guarantees every sink is closed (and flushed) exactly once.

pub mod config;
pub mod error;
pub mod model;
pub mod sink;
pub mod storage;
pub mod target;

pub use error::{Error, Result};
