//! In-memory record buffer between WAL append and segment flush.
//!
//! Records land here right after the WAL acknowledges them and leave in FIFO
//! order when the ingest coordinator drains the buffer into the active
//! segment. The WAL keeps everything here recoverable.

use tokio::sync::Mutex;

use loghouse_core::LogRecord;

#[derive(Default)]
pub struct MemoryBuffer {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, record: LogRecord) {
        self.records.lock().await.push(record);
    }

    /// Take every buffered record, leaving the buffer empty.
    pub async fn drain(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loghouse_core::{Level, Properties};

    fn record(ts: i64) -> LogRecord {
        LogRecord {
            timestamp: ts,
            level: Level::Debug,
            service: String::new(),
            host: String::new(),
            message: format!("r{}", ts),
            stack_trace: String::new(),
            properties: Properties::new(),
        }
    }

    #[tokio::test]
    async fn test_drain_preserves_fifo_order_and_empties() {
        let buffer = MemoryBuffer::new();
        for i in 0..4 {
            buffer.push(record(i)).await;
        }
        assert_eq!(buffer.len().await, 4);

        let drained = buffer.drain().await;
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[0].timestamp, 0);
        assert_eq!(drained[3].timestamp, 3);
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_empty_is_noop() {
        let buffer = MemoryBuffer::new();
        assert!(buffer.drain().await.is_empty());
    }
}
