use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::{Keyed, ReaderRunner, TaskDoer, WriterRunner};
use crate::config::{Config, keys};
use crate::error::FerryError;
use crate::exchange::{Channel, ChannelStats, NoopTransformer, RecordExchanger, Transformer};
use crate::plugin::{PluginKind, PluginRegistry, ReaderTask, TaskInfo, WriterTask};

/// Lifecycle of a [`TaskExecuter`].
///
/// State transitions:
/// - Idle -> Running -> Finished
/// - any -> Shutdown (the current attempt is torn down; a retry starts again)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExecState {
    Idle,
    Running,
    Finished,
    Shutdown,
}

impl ExecState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecState::Finished | ExecState::Shutdown)
    }
}

type Outcome = (PluginKind, Result<(), FerryError>);

/// Everything that belongs to one attempt. Rebuilt by every `start`.
struct Attempt {
    ctx: CancellationToken,
    tracker: TaskTracker,
    outcomes: Option<mpsc::Receiver<Outcome>>,
    channel: Arc<Channel>,
    reader: ReaderRunner,
    writer: WriterRunner,
}

/// Runs one reader/writer pair for one task config.
///
/// The same executer is reused across fail-over attempts; every attempt gets
/// its own channel, exchanger and child cancellation token.
pub struct TaskExecuter {
    key: String,
    task_id: i64,
    parent: CancellationToken,
    reader_task: Arc<Mutex<Box<dyn ReaderTask>>>,
    writer_task: Arc<Mutex<Box<dyn WriterTask>>>,
    transformer: Arc<dyn Transformer>,
    support_fail_over: bool,
    attempt_count: AtomicU32,
    state: parking_lot::Mutex<ExecState>,
    attempt: parking_lot::Mutex<Option<Attempt>>,
    last_stats: parking_lot::Mutex<ChannelStats>,
}

impl TaskExecuter {
    /// Builds an executer from a task config (`taskId`, `reader.*`, `writer.*`).
    pub fn new(
        parent: &CancellationToken,
        job_id: i64,
        task_group_id: i64,
        conf: &Config,
        registry: &PluginRegistry,
    ) -> Result<Self, FerryError> {
        let task_id = conf.get_int64(keys::TASK_ID)?;
        let reader_maker = registry.reader(&conf.get_string(keys::READER_NAME)?)?;
        let writer_maker = registry.writer(&conf.get_string(keys::WRITER_NAME)?)?;

        let info = |parameter: Config| TaskInfo {
            job_id,
            task_group_id,
            task_id,
            parameter,
        };
        let reader = reader_maker.task(info(conf.get_config_or_empty(keys::READER_PARAMETER)?))?;
        let writer = writer_maker.task(info(conf.get_config_or_empty(keys::WRITER_PARAMETER)?))?;

        Ok(Self::with_tasks(
            parent,
            job_id,
            task_group_id,
            task_id,
            reader,
            writer,
        ))
    }

    pub fn with_tasks(
        parent: &CancellationToken,
        job_id: i64,
        task_group_id: i64,
        task_id: i64,
        reader: Box<dyn ReaderTask>,
        writer: Box<dyn WriterTask>,
    ) -> Self {
        let support_fail_over = writer.support_fail_over();
        Self {
            key: format!("{job_id}-{task_group_id}-{task_id}"),
            task_id,
            parent: parent.clone(),
            reader_task: Arc::new(Mutex::new(reader)),
            writer_task: Arc::new(Mutex::new(writer)),
            transformer: Arc::new(NoopTransformer),
            support_fail_over,
            attempt_count: AtomicU32::new(0),
            state: parking_lot::Mutex::new(ExecState::Idle),
            attempt: parking_lot::Mutex::new(None),
            last_stats: parking_lot::Mutex::new(ChannelStats::default()),
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }

    pub fn support_fail_over(&self) -> bool {
        self.support_fail_over
    }

    pub fn state(&self) -> ExecState {
        *self.state.lock()
    }

    /// Traffic of the current attempt, or of the last one after shutdown.
    pub fn stats(&self) -> ChannelStats {
        match self.attempt.lock().as_ref() {
            Some(attempt) => attempt.channel.stats(),
            None => *self.last_stats.lock(),
        }
    }

    /// Spawns the writer, waits until it is scheduled, then spawns the reader.
    pub async fn start(&self) -> Result<(), FerryError> {
        if self.parent.is_cancelled() {
            return Err(FerryError::Cancelled);
        }
        if self.attempt.lock().is_some() {
            return Err(FerryError::Other(format!(
                "task {} already has an attempt in flight",
                self.key
            )));
        }

        let channel = Arc::new(Channel::new());
        let exchanger = Arc::new(RecordExchanger::new(
            Arc::clone(&channel),
            Arc::clone(&self.transformer),
        ));
        let reader = ReaderRunner::new(
            self.key.as_str(),
            Arc::clone(&self.reader_task),
            Arc::clone(&exchanger),
        );
        let writer = WriterRunner::new(
            self.key.as_str(),
            Arc::clone(&self.writer_task),
            exchanger,
        );

        let ctx = self.parent.child_token();
        let tracker = TaskTracker::new();
        let (tx, rx) = mpsc::channel::<Outcome>(2);
        let (started_tx, started_rx) = oneshot::channel::<()>();

        tracker.spawn({
            let writer = writer.clone();
            let ctx = ctx.clone();
            let tx = tx.clone();
            async move {
                let _ = started_tx.send(());
                let result = writer.run(&ctx).await;
                let _ = tx.send((PluginKind::Writer, result)).await;
            }
        });

        // writer が動き出すまで reader を起動しない
        if started_rx.await.is_err() {
            debug!(task = %self.key, "writer exited before signalling start");
        }

        tracker.spawn({
            let reader = reader.clone();
            let ctx = ctx.clone();
            async move {
                let result = reader.run(&ctx).await;
                let _ = tx.send((PluginKind::Reader, result)).await;
            }
        });
        tracker.close();

        *self.attempt.lock() = Some(Attempt {
            ctx,
            tracker,
            outcomes: Some(rx),
            channel,
            reader,
            writer,
        });
        *self.state.lock() = ExecState::Running;
        debug!(task = %self.key, attempt = self.attempt_count(), "task started");
        Ok(())
    }

    /// Joins both sides and folds their results.
    pub async fn wait(&self) -> Result<(), FerryError> {
        let (tracker, outcomes) = {
            let mut slot = self.attempt.lock();
            let Some(attempt) = slot.as_mut() else {
                return Err(FerryError::Other(format!("task {} was not started", self.key)));
            };
            (attempt.tracker.clone(), attempt.outcomes.take())
        };
        let Some(mut outcomes) = outcomes else {
            return Err(FerryError::Other(format!(
                "task {} is already being waited on",
                self.key
            )));
        };

        tracker.wait().await;

        let mut reported = Vec::with_capacity(2);
        let mut errors = Vec::new();
        while let Ok((kind, result)) = outcomes.try_recv() {
            reported.push(kind);
            if let Err(e) = result {
                errors.push(e);
            }
        }
        for kind in [PluginKind::Writer, PluginKind::Reader] {
            if !reported.contains(&kind) {
                errors.push(FerryError::Other(format!(
                    "{kind} of task {} exited without reporting",
                    self.key
                )));
            }
        }

        {
            let mut state = self.state.lock();
            if *state == ExecState::Running {
                *state = ExecState::Finished;
            }
        }
        FerryError::combine(errors)
    }

    /// One attempt: `start` then `wait`. Counts the attempt whatever the result.
    pub async fn execute(&self) -> Result<(), FerryError> {
        let result = match self.start().await {
            Ok(()) => self.wait().await,
            Err(e) => Err(e),
        };
        let attempt = self.attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
        match &result {
            Ok(()) => info!(task = %self.key, attempt, "task finished"),
            Err(e) => info!(task = %self.key, attempt, error = %e, "task attempt failed"),
        }
        result
    }

    /// Cancels the current attempt, waits for both sides, then closes the
    /// exchange. Idempotent.
    pub async fn shutdown(&self) {
        let attempt = self.attempt.lock().take();
        if let Some(attempt) = attempt {
            attempt.ctx.cancel();
            attempt.tracker.close();
            attempt.tracker.wait().await;
            attempt.reader.shutdown();
            attempt.writer.shutdown();
            *self.last_stats.lock() = attempt.channel.stats();
        }
        *self.state.lock() = ExecState::Shutdown;
    }
}

impl Keyed for TaskExecuter {
    fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl TaskDoer for TaskExecuter {
    async fn run(&self) -> Result<(), FerryError> {
        self.execute().await
    }
}
