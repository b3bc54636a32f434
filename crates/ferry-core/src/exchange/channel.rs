use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::{ExchangeError, RecordQueue};
use crate::element::{Record, TerminateRecord};

/// Traffic pushed through one channel (the terminate sentinel is not counted).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub records: u64,
    pub bytes: u64,
}

/// One reader-to-writer pipe, exclusively owned by a task attempt.
#[derive(Default)]
pub struct Channel {
    queue: RecordQueue,
    records: AtomicU64,
    bytes: AtomicU64,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: Box<dyn Record>) -> Result<usize, ExchangeError> {
        let bytes = record.byte_size() as u64;
        let len = self.queue.push_back(record)?;
        self.records.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        Ok(len)
    }

    pub fn push_terminate(&self) -> Result<usize, ExchangeError> {
        self.queue.push_back(Box::new(TerminateRecord))
    }

    /// See [`RecordQueue::push_back_all`].
    pub fn push_all<F, E>(&self, mut fetch: F) -> E
    where
        F: FnMut() -> Result<Box<dyn Record>, E>,
        E: From<ExchangeError>,
    {
        loop {
            let record = match fetch() {
                Ok(record) => record,
                Err(e) => return e,
            };
            if let Err(e) = self.push(record) {
                return e.into();
            }
        }
    }

    pub async fn pop(&self) -> Option<Box<dyn Record>> {
        self.queue.pop_front().await
    }

    pub fn try_pop(&self) -> Option<Box<dyn Record>> {
        self.queue.try_pop_front()
    }

    pub async fn pop_all<F, E>(&self, on_record: F) -> Result<(), E>
    where
        F: FnMut(Box<dyn Record>) -> Result<(), E>,
    {
        self.queue.pop_front_all(on_record).await
    }

    pub fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn size(&self) -> usize {
        self.queue.buffered()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}
