//! Drives the sinks from a stream of upstream messages.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::config::TargetConfig;
use crate::model::{Message, Record, RecordMessage, SchemaMessage};
use crate::sink::{Clock, LocalClock, Sink};
use crate::storage::BlobStoreRef;
use crate::Error;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub streams: usize,
    pub records: usize,
    pub blobs: usize,
}

/// Owns one [`Sink`] per stream and is responsible for closing all of them,
/// whether the input ends normally or processing fails half way.
pub struct Target {
    config: TargetConfig,
    store: BlobStoreRef,
    clock: Arc<dyn Clock>,
    sinks: BTreeMap<String, Sink>,
    state: Option<JsonValue>,
    summary: Summary,
}

impl Target {
    pub fn new(config: TargetConfig, store: BlobStoreRef) -> Self {
        Target {
            config,
            store,
            clock: Arc::new(LocalClock),
            sinks: BTreeMap::new(),
            state: None,
            summary: Summary::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(&self, stream: &str) -> Option<&Sink> {
        self.sinks.get(stream)
    }

    fn sink_for(&mut self, stream: &str) -> Result<&mut Sink, Error> {
        match self.sinks.entry(stream.to_string()) {
            Entry::Occupied(x) => Ok(x.into_mut()),
            Entry::Vacant(x) => {
                let sink = Sink::new(stream, &self.config, self.store.clone(), self.clock.clone())?;
                Ok(x.insert(sink))
            }
        }
    }

    pub fn accept(&mut self, stream: &str, record: Record) -> Result<(), Error> {
        self.sink_for(stream)?.accept(record)
    }

    pub fn process_message(&mut self, msg: Message) -> Result<(), Error> {
        log::trace!("processing {} message for {:?}", msg, msg.stream());

        match msg {
            Message::Schema(SchemaMessage { stream, .. }) => {
                self.sink_for(&stream)?;
            }
            Message::Record(RecordMessage { stream, record, .. }) => {
                self.accept(&stream, record)?;
            }
            Message::State(x) => {
                self.state = Some(x.value);
            }
            Message::ActivateVersion(x) => {
                log::debug!("ignoring version {} of stream {}", x.version, x.stream);
            }
        }

        Ok(())
    }

    pub fn process_line(&mut self, line: &str) -> Result<(), Error> {
        let line = line.trim();

        if line.is_empty() {
            return Ok(());
        }

        self.process_message(Message::parse(line)?)
    }

    /// Consumes the whole input, then closes every sink. The latest state
    /// message is written to `output` only if every sink closed cleanly.
    pub fn run<R: BufRead, W: Write>(mut self, input: R, mut output: W) -> Result<Summary, Error> {
        for line in input.lines() {
            let processed = line
                .map_err(Error::from)
                .and_then(|line| self.process_line(&line));

            if let Err(err) = processed {
                log::error!("stopping on error, closing all sinks: {}", err);

                if let Err(close_err) = self.close_all() {
                    log::error!("closing sinks after failure also failed: {}", close_err);
                }

                return Err(err);
            }
        }

        self.close_all()?;

        if let Some(state) = self.state.take() {
            let line = json!({ "type": "STATE", "value": state });
            writeln!(output, "{line}")?;
            output.flush()?;
        }

        log::info!(
            "done: {} records from {} streams written to {} blobs",
            self.summary.records,
            self.summary.streams,
            self.summary.blobs
        );

        Ok(self.summary)
    }

    /// Closes every open sink, continuing past failures. Returns the first
    /// error encountered.
    pub fn close_all(&mut self) -> Result<(), Error> {
        let mut first_err = None;

        for (stream, sink) in std::mem::take(&mut self.sinks) {
            let accepted = sink.records_accepted();
            let pending = sink.buffered();
            let written = sink.blobs_written();

            self.summary.streams += 1;

            match sink.close() {
                Ok(()) => {
                    self.summary.records += accepted;
                    self.summary.blobs += written + usize::from(pending > 0);
                }
                Err(err) => {
                    log::error!("stream {} lost {} records: {}", stream, pending, err);
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
