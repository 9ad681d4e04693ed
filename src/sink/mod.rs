//! One sink per logical stream: buffer records, flush them as a CSV blob
//! whenever the buffer fills up, flush the remainder on close.

pub mod buffer;
pub mod clock;
pub mod encode;
pub mod naming;
pub mod setup;

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Timelike};
use strum_macros::Display;

use crate::config::TargetConfig;
use crate::model::Record;
use crate::storage::{BlobStoreRef, Container};
use crate::Error;

pub use buffer::RecordBuffer;
pub use clock::{Clock, LocalClock};
pub use naming::Naming;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum SinkState {
    Empty,
    Accumulating,
    Flushing,
}

pub struct Sink {
    stream: String,
    container: Container,
    naming: Naming,
    buffer: RecordBuffer,
    clock: Arc<dyn Clock>,
    last_stamp: Option<NaiveDateTime>,
    flushing: bool,
    closed: bool,
    records_accepted: usize,
    blobs_written: usize,
}

impl Sink {
    /// Binds a fresh buffer to `stream` and makes sure the configured
    /// container exists. Fails if the container can't be set up.
    pub fn new(
        stream: &str,
        config: &TargetConfig,
        store: BlobStoreRef,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let container = setup::ensure_container(store, &config.container_name)?;

        log::info!(
            "sink ready for stream {} (flush every {} records)",
            stream,
            config.max_buffer_size()
        );

        Ok(Sink {
            stream: stream.to_string(),
            container,
            naming: Naming::from_config(config),
            buffer: RecordBuffer::new(config.max_buffer_size()),
            clock,
            last_stamp: None,
            flushing: false,
            closed: false,
            records_accepted: 0,
            blobs_written: 0,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn state(&self) -> SinkState {
        if self.flushing {
            SinkState::Flushing
        } else if self.buffer.is_empty() {
            SinkState::Empty
        } else {
            SinkState::Accumulating
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn records_accepted(&self) -> usize {
        self.records_accepted
    }

    pub fn blobs_written(&self) -> usize {
        self.blobs_written
    }

    /// Buffers the record and flushes if that filled the buffer. On a failed
    /// flush the record stays buffered and the error is returned.
    pub fn accept(&mut self, record: Record) -> Result<(), Error> {
        self.buffer.push(record);
        self.records_accepted += 1;

        log::trace!(
            "stream {} buffered {}/{}",
            self.stream,
            self.buffer.len(),
            self.buffer.threshold()
        );

        if self.buffer.is_full() {
            self.flush()?;
        }

        Ok(())
    }

    /// Uploads everything buffered as one new blob, then empties the buffer.
    /// Nothing is cleared unless the upload succeeded.
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.flushing = true;
        let result = self.upload_buffer();
        self.flushing = false;

        let path = result?;

        log::info!(
            "flushed {} records of stream {} to {}/{}",
            self.buffer.len(),
            self.stream,
            self.container.name(),
            path
        );

        self.buffer.clear();
        self.blobs_written += 1;

        Ok(())
    }

    /// Timestamp for the next blob name. Names only go down to the second, so
    /// a flush within the same second as the previous one is moved one second
    /// past it; names of one sink never repeat and keep sorting in flush order.
    fn next_stamp(&mut self) -> NaiveDateTime {
        let now = self.clock.now();
        let now = now.with_nanosecond(0).unwrap_or(now);

        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::seconds(1),
            _ => now,
        };

        self.last_stamp = Some(stamp);
        stamp
    }

    fn upload_buffer(&mut self) -> Result<String, Error> {
        let content = encode::encode_csv(self.buffer.records())?;
        let stamp = self.next_stamp();
        let path = self.naming.blob_path(&self.stream, stamp);

        if let Err(err) = self.container.upload(&path, content, true) {
            log::error!(
                "failed to upload {} buffered records of stream {}: {}",
                self.buffer.len(),
                self.stream,
                err
            );
            return Err(Error::upload(&path, err));
        }

        Ok(path)
    }

    /// Final flush, then the sink and its client handle are gone. Taking
    /// `self` makes a second close impossible.
    pub fn close(mut self) -> Result<(), Error> {
        log::debug!("closing sink for stream {} ({})", self.stream, self.state());

        let result = self.flush();
        self.closed = true;

        if let Err(err) = &result {
            log::error!(
                "stream {} closed with {} records not persisted: {}",
                self.stream,
                self.buffer.len(),
                err
            );
        }

        result
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if !self.closed && !self.buffer.is_empty() {
            log::warn!(
                "sink for stream {} dropped without close, {} records were never flushed",
                self.stream,
                self.buffer.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Mutex;

    use super::*;
    use crate::storage::MemoryStore;

    struct StepClock(Mutex<NaiveDateTime>);

    impl StepClock {
        fn new() -> Arc<Self> {
            let start = NaiveDate::from_ymd_opt(2026, 10, 19)
                .and_then(|d| d.and_hms_opt(10, 0, 0))
                .unwrap();
            Arc::new(StepClock(Mutex::new(start)))
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> NaiveDateTime {
            let mut now = self.0.lock().unwrap();
            let current = *now;
            *now = current + Duration::seconds(1);
            current
        }
    }

    /// Always reads the same sub-second instant.
    struct StoppedClock;

    impl Clock for StoppedClock {
        fn now(&self) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, 10, 19)
                .and_then(|d| d.and_hms_milli_opt(10, 0, 0, 250))
                .unwrap()
        }
    }

    fn config(threshold: usize) -> TargetConfig {
        TargetConfig {
            storage_account_name: "acct".into(),
            storage_account_key: Some("a2V5".into()),
            container_name: "landing".into(),
            root_folder: Some("raw".into()),
            max_buffer_size: Some(threshold),
            ..Default::default()
        }
    }

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn sink(store: &Arc<MemoryStore>, threshold: usize) -> Sink {
        Sink::new("orders", &config(threshold), store.clone(), StepClock::new()).unwrap()
    }

    #[test]
    fn walks_through_states() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, 2);
        assert_eq!(sink.state(), SinkState::Empty);

        sink.accept(record(json!({"a": 1}))).unwrap();
        assert_eq!(sink.state(), SinkState::Accumulating);
        assert_eq!(sink.state().to_string(), "accumulating");

        sink.accept(record(json!({"a": 2}))).unwrap();
        assert_eq!(sink.state(), SinkState::Empty);
        assert_eq!(sink.blobs_written(), 1);

        let blob = &store.uploads()[0];
        assert_eq!(blob.container, "landing");
        assert_eq!(blob.path, "raw/orders/orders_20261019T100000.csv");
        assert_eq!(blob.text(), "a\n1\n2\n");
    }

    #[test]
    fn flushes_in_the_same_second_get_distinct_sorted_names() {
        let store = Arc::new(MemoryStore::new());
        let mut sink =
            Sink::new("orders", &config(1), store.clone(), Arc::new(StoppedClock)).unwrap();

        for a in 1..=3 {
            sink.accept(record(json!({ "a": a }))).unwrap();
        }
        sink.close().unwrap();

        let paths: Vec<_> = store.uploads().into_iter().map(|b| b.path).collect();
        assert_eq!(
            paths,
            vec![
                "raw/orders/orders_20261019T100000.csv",
                "raw/orders/orders_20261019T100001.csv",
                "raw/orders/orders_20261019T100002.csv",
            ]
        );
        assert_eq!(store.blob_count(), 3);
    }

    #[test]
    fn close_flushes_the_remainder_only_when_needed() {
        let store = Arc::new(MemoryStore::new());

        let mut sink_a = sink(&store, 5);
        sink_a.accept(record(json!({"a": 1}))).unwrap();
        sink_a.close().unwrap();
        assert_eq!(store.upload_calls(), 1);

        let sink_b = sink(&store, 5);
        sink_b.close().unwrap();
        assert_eq!(store.upload_calls(), 1);
    }

    #[test]
    fn failed_upload_keeps_records_for_next_flush() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, 2);

        store.fail_next_uploads(1);
        sink.accept(record(json!({"a": 1}))).unwrap();
        let err = sink.accept(record(json!({"a": 2}))).unwrap_err();

        assert!(matches!(err, Error::Upload(_)));
        assert_eq!(sink.buffered(), 2);
        assert_eq!(sink.state(), SinkState::Accumulating);

        sink.flush().unwrap();

        let uploads = store.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].text(), "a\n1\n2\n");
        assert_eq!(sink.buffered(), 0);
    }

    #[test]
    fn serialization_failure_keeps_records() {
        let store = Arc::new(MemoryStore::new());
        let mut sink = sink(&store, 1);

        let err = sink.accept(record(json!({"a": {"nested": true}}))).unwrap_err();

        assert!(matches!(err, Error::Serialization(_)));
        assert_eq!(sink.buffered(), 1);
        assert_eq!(store.upload_calls(), 0);
    }

    #[test]
    fn fails_when_container_cannot_be_created() {
        let store = Arc::new(MemoryStore::new());
        store.reject_creates(403);

        let result = Sink::new("orders", &config(2), store.clone(), StepClock::new());

        assert!(matches!(result, Err(Error::ContainerSetup(_))));
    }
}
