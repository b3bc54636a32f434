use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::{SchedulerError, TaskDoer};
use crate::error::FerryError;

type Completion = oneshot::Sender<Result<(), FerryError>>;
type Submission = (Arc<dyn TaskDoer>, Completion);

/// Fixed pool of workers fed by a bounded backlog.
///
/// - `push` は待たない（backlog が満杯なら `QueueFull`）
/// - `stop` 後も backlog に残った分は実行される
pub struct TaskScheduler {
    sender: parking_lot::Mutex<Option<mpsc::Sender<Submission>>>,
    workers: TaskTracker,
}

impl TaskScheduler {
    /// Spawns `max_worker_number` workers. Must be called inside a tokio runtime.
    pub fn new(max_worker_number: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Submission>(queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let workers = TaskTracker::new();

        for worker_id in 0..max_worker_number.max(1) {
            let rx = Arc::clone(&rx);
            workers.spawn(async move {
                loop {
                    // 受信だけロックし、実行中は手放す
                    let next = rx.lock().await.recv().await;
                    let Some((doer, done)) = next else {
                        break;
                    };
                    let result = doer.run().await;
                    // 受け手がいなくなっていても結果は捨てるだけ
                    let _ = done.send(result);
                }
                debug!(worker_id, "scheduler worker exited");
            });
        }
        workers.close();

        Self {
            sender: parking_lot::Mutex::new(Some(tx)),
            workers,
        }
    }

    /// Queues `doer`. The receiver gets exactly one value once it completes.
    pub fn push(
        &self,
        doer: Arc<dyn TaskDoer>,
    ) -> Result<oneshot::Receiver<Result<(), FerryError>>, SchedulerError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(SchedulerError::Stopped)?;
        let (done_tx, done_rx) = oneshot::channel();
        sender.try_send((doer, done_tx)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SchedulerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SchedulerError::Stopped,
        })?;
        Ok(done_rx)
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stops accepting work and waits for every worker to exit.
    pub async fn stop(&self) {
        let sender = self.sender.lock().take();
        drop(sender);
        self.workers.wait().await;
        debug!("scheduler stopped");
    }
}
