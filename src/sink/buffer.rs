use crate::model::Record;

/// Ordered, append-only batch of records waiting for the next flush.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    records: Vec<Record>,
    threshold: usize,
}

impl RecordBuffer {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);

        Self {
            records: Vec::with_capacity(threshold),
            threshold,
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// True once the buffer holds at least `threshold` records. A failed flush
    /// leaves it full, so it can grow past the threshold until one succeeds.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.threshold
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(a: i64) -> Record {
        match json!({ "a": a }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn fills_up_at_threshold() {
        let mut buffer = RecordBuffer::new(2);
        assert!(buffer.is_empty());

        buffer.push(record(1));
        assert!(!buffer.is_full());

        buffer.push(record(2));
        assert!(buffer.is_full());
        assert_eq!(buffer.records()[0]["a"], json!(1));

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn zero_threshold_behaves_like_one() {
        let mut buffer = RecordBuffer::new(0);
        assert_eq!(buffer.threshold(), 1);

        buffer.push(record(1));
        assert!(buffer.is_full());
    }
}
