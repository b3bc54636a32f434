//! Unbounded record FIFO with close semantics.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::ExchangeError;
use crate::element::Record;

#[derive(Default)]
struct QueueState {
    records: VecDeque<Box<dyn Record>>,
    closed: bool,
}

/// Mutex-guarded `VecDeque` plus a `Notify` for blocked consumers.
///
/// - push は待機中の consumer を 1 つだけ起こす
/// - close は全員を起こす。残りのレコードは pop で引き続き取り出せる
#[derive(Default)]
pub struct RecordQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl RecordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record` and returns the new length.
    pub fn push_back(&self, record: Box<dyn Record>) -> Result<usize, ExchangeError> {
        let len = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ExchangeError::Closed);
            }
            state.records.push_back(record);
            state.records.len()
        };
        self.notify.notify_one();
        Ok(len)
    }

    /// Waits while the queue is empty and open. `None` once closed and drained.
    pub async fn pop_front(&self) -> Option<Box<dyn Record>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // 状態を見る前に登録しておかないと close/push の通知を取りこぼす
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(record) = state.records.pop_front() {
                    return Some(record);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    pub fn try_pop_front(&self) -> Option<Box<dyn Record>> {
        self.state.lock().records.pop_front()
    }

    /// Pushes whatever `fetch` yields until `fetch` or the push fails and
    /// returns the error that stopped the loop.
    pub fn push_back_all<F, E>(&self, mut fetch: F) -> E
    where
        F: FnMut() -> Result<Box<dyn Record>, E>,
        E: From<ExchangeError>,
    {
        loop {
            let record = match fetch() {
                Ok(record) => record,
                Err(e) => return e,
            };
            if let Err(e) = self.push_back(record) {
                return e.into();
            }
        }
    }

    /// Feeds popped records to `on_record` until it fails, or until the queue
    /// is closed and drained (`Ok`).
    pub async fn pop_front_all<F, E>(&self, mut on_record: F) -> Result<(), E>
    where
        F: FnMut(Box<dyn Record>) -> Result<(), E>,
    {
        while let Some(record) = self.pop_front().await {
            on_record(record)?;
        }
        Ok(())
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records currently buffered.
    pub fn buffered(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::element::{Column, DefaultRecord};

    fn numbered(n: i64) -> Box<dyn Record> {
        let mut r = DefaultRecord::new();
        r.add(Column::new("n", n)).unwrap();
        Box::new(r)
    }

    fn number_of(record: &dyn Record) -> i64 {
        let n = record.get_by_name("n").unwrap().value().as_bigint().unwrap();
        i64::try_from(n).unwrap()
    }

    #[tokio::test]
    async fn single_producer_single_consumer_is_fifo() {
        let queue = Arc::new(RecordQueue::new());
        let producer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move {
                for n in 1..=500 {
                    queue.push_back(numbered(n)).unwrap();
                    if n % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                queue.close();
            }
        });

        let mut seen = Vec::new();
        while let Some(record) = queue.pop_front().await {
            seen.push(number_of(record.as_ref()));
        }
        producer.await.unwrap();

        assert_eq!(seen, (1..=500).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn close_then_drain() {
        let queue = RecordQueue::new();
        assert_eq!(queue.push_back(numbered(1)).unwrap(), 1);
        assert_eq!(queue.push_back(numbered(2)).unwrap(), 2);
        queue.close();
        queue.close();

        assert!(matches!(queue.push_back(numbered(3)), Err(ExchangeError::Closed)));
        assert_eq!(number_of(queue.pop_front().await.unwrap().as_ref()), 1);
        assert_eq!(number_of(queue.pop_front().await.unwrap().as_ref()), 2);
        assert!(queue.pop_front().await.is_none());
        assert!(queue.pop_front().await.is_none());
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumers() {
        let queue = Arc::new(RecordQueue::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.pop_front().await.is_none() })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        for w in waiters {
            let drained = tokio::time::timeout(Duration::from_secs(1), w)
                .await
                .expect("consumer stayed blocked after close")
                .unwrap();
            assert!(drained);
        }
    }

    #[tokio::test]
    async fn push_wakes_blocked_consumer() {
        let queue = Arc::new(RecordQueue::new());
        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.pop_front().await.map(|r| number_of(r.as_ref())) }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push_back(numbered(9)).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(9));
    }

    #[test]
    fn try_pop_front_does_not_block() {
        let queue = RecordQueue::new();
        assert!(queue.try_pop_front().is_none());
        queue.push_back(numbered(4)).unwrap();
        assert_eq!(queue.buffered(), 1);
        assert_eq!(number_of(queue.try_pop_front().unwrap().as_ref()), 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn push_back_all_stops_on_fetch_error() {
        let queue = RecordQueue::new();
        let mut next = 0;
        let err: ExchangeError = queue.push_back_all(|| {
            next += 1;
            if next > 3 {
                Err(ExchangeError::Terminate)
            } else {
                Ok(numbered(next))
            }
        });
        assert_eq!(err, ExchangeError::Terminate);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn push_back_all_stops_when_closed() {
        let queue = RecordQueue::new();
        queue.close();
        let err: ExchangeError = queue.push_back_all(|| Ok(numbered(1)));
        assert_eq!(err, ExchangeError::Closed);
    }

    #[tokio::test]
    async fn pop_front_all_drains_until_closed() {
        let queue = RecordQueue::new();
        for n in 1..=4 {
            queue.push_back(numbered(n)).unwrap();
        }
        queue.close();

        let mut sum = 0;
        let result: Result<(), ExchangeError> = queue
            .pop_front_all(|r| {
                sum += number_of(r.as_ref());
                Ok(())
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(sum, 10);
    }

    #[tokio::test]
    async fn pop_front_all_returns_callback_error() {
        let queue = RecordQueue::new();
        queue.push_back(numbered(1)).unwrap();
        queue.push_back(numbered(2)).unwrap();

        let result = queue
            .pop_front_all(|_| Err(ExchangeError::Shutdown))
            .await;
        assert_eq!(result, Err(ExchangeError::Shutdown));
        assert_eq!(queue.len(), 1);
    }
}
