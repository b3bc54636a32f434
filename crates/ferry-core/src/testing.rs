//! Scriptable plugins shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::element::{Column, Record};
use crate::error::FerryError;
use crate::exchange::{RecordReceiver, RecordSender};
use crate::plugin::{
    BatchWriter, Plugin, ReaderJob, ReaderMaker, ReaderTask, TaskInfo, WriterJob, WriterMaker,
    WriterTask, batch,
};

/// Records every flushed batch; optionally fails on the n-th call.
pub(crate) struct RecordingBatchWriter {
    batch_size: usize,
    batch_timeout: Duration,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
    flushed: Mutex<Vec<usize>>,
}

impl RecordingBatchWriter {
    pub(crate) fn new(batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            batch_size,
            batch_timeout,
            fail_on_call: None,
            calls: AtomicUsize::new(0),
            flushed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Sizes of the batches written successfully, in order.
    pub(crate) fn flushed_sizes(&self) -> Vec<usize> {
        self.flushed.lock().clone()
    }

    pub(crate) fn total_records(&self) -> usize {
        self.flushed.lock().iter().sum()
    }
}

#[async_trait]
impl BatchWriter for RecordingBatchWriter {
    fn job_id(&self) -> i64 {
        1
    }

    fn task_group_id(&self) -> i64 {
        0
    }

    fn task_id(&self) -> i64 {
        0
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn batch_timeout(&self) -> Duration {
        self.batch_timeout
    }

    async fn batch_write(
        &self,
        _ctx: &CancellationToken,
        records: Vec<Box<dyn Record>>,
    ) -> Result<(), FerryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(FerryError::plugin(format!("injected failure on call {call}")));
        }
        self.flushed.lock().push(records.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ReadMode {
    Rows(usize),
    Endless,
    Fail,
}

/// Reader whose tasks send a fixed number of rows, run until cancelled, or fail.
#[derive(Clone)]
pub(crate) struct ScriptedReaderMaker {
    mode: ReadMode,
    pub(crate) sent: Arc<AtomicUsize>,
    pub(crate) destroyed: Arc<AtomicUsize>,
}

impl ScriptedReaderMaker {
    fn with_mode(mode: ReadMode) -> Self {
        Self {
            mode,
            sent: Arc::new(AtomicUsize::new(0)),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn rows(n: usize) -> Self {
        Self::with_mode(ReadMode::Rows(n))
    }

    pub(crate) fn endless() -> Self {
        Self::with_mode(ReadMode::Endless)
    }

    pub(crate) fn failing() -> Self {
        Self::with_mode(ReadMode::Fail)
    }
}

impl ReaderMaker for ScriptedReaderMaker {
    fn job(&self, _parameter: Config) -> Result<Box<dyn ReaderJob>, FerryError> {
        Ok(Box::new(ScriptedReaderJob {
            destroyed: Arc::clone(&self.destroyed),
        }))
    }

    fn task(&self, _info: TaskInfo) -> Result<Box<dyn ReaderTask>, FerryError> {
        Ok(Box::new(ScriptedReaderTask {
            mode: self.mode,
            sent: Arc::clone(&self.sent),
            destroyed: Arc::clone(&self.destroyed),
        }))
    }
}

struct ScriptedReaderJob {
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for ScriptedReaderJob {
    async fn destroy(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ReaderJob for ScriptedReaderJob {
    async fn split(
        &mut self,
        _ctx: &CancellationToken,
        advice_number: usize,
    ) -> Result<Vec<Config>, FerryError> {
        Ok((0..advice_number)
            .map(|slice| Config::from_value(json!({ "slice": slice })))
            .collect())
    }
}

struct ScriptedReaderTask {
    mode: ReadMode,
    sent: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl ScriptedReaderTask {
    fn send_one(&self, sender: &dyn RecordSender, n: usize) -> Result<(), FerryError> {
        let mut record = sender.create_record();
        record.add(Column::new("n", n as i64))?;
        sender.send_writer(record)?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Plugin for ScriptedReaderTask {
    async fn destroy(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ReaderTask for ScriptedReaderTask {
    async fn start_read(
        &mut self,
        ctx: &CancellationToken,
        sender: &dyn RecordSender,
    ) -> Result<(), FerryError> {
        match self.mode {
            ReadMode::Rows(n) => {
                for i in 0..n {
                    self.send_one(sender, i)?;
                }
                Ok(())
            }
            ReadMode::Endless => {
                let mut i = 0;
                loop {
                    self.send_one(sender, i)?;
                    i += 1;
                    tokio::select! {
                        _ = ctx.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(Duration::from_millis(1)) => {}
                    }
                }
            }
            ReadMode::Fail => Err(FerryError::plugin("injected read failure")),
        }
    }
}

/// Writer that drains through the batch loop and fails on demand.
#[derive(Clone, Default)]
pub(crate) struct ScriptedWriterMaker {
    fail_over: bool,
    /// Attempts (across all tasks) that fail after draining.
    fail_first: usize,
    split_extra: usize,
    pub(crate) attempts: Arc<AtomicUsize>,
    pub(crate) received: Arc<AtomicUsize>,
    pub(crate) destroyed: Arc<AtomicUsize>,
}

impl ScriptedWriterMaker {
    pub(crate) fn with_fail_over(mut self) -> Self {
        self.fail_over = true;
        self
    }

    pub(crate) fn failing_first(mut self, attempts: usize) -> Self {
        self.fail_first = attempts;
        self
    }

    pub(crate) fn failing_always(self) -> Self {
        self.failing_first(usize::MAX)
    }

    /// The writer job returns one more piece than the reader asked for.
    pub(crate) fn split_mismatch(mut self) -> Self {
        self.split_extra = 1;
        self
    }
}

impl WriterMaker for ScriptedWriterMaker {
    fn job(&self, _parameter: Config) -> Result<Box<dyn WriterJob>, FerryError> {
        Ok(Box::new(ScriptedWriterJob {
            extra: self.split_extra,
            destroyed: Arc::clone(&self.destroyed),
        }))
    }

    fn task(&self, info: TaskInfo) -> Result<Box<dyn WriterTask>, FerryError> {
        Ok(Box::new(ScriptedWriterTask {
            maker: self.clone(),
            info,
        }))
    }
}

struct ScriptedWriterJob {
    extra: usize,
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for ScriptedWriterJob {
    async fn destroy(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl WriterJob for ScriptedWriterJob {
    async fn split(
        &mut self,
        _ctx: &CancellationToken,
        reader_number: usize,
    ) -> Result<Vec<Config>, FerryError> {
        Ok((0..reader_number + self.extra).map(|_| Config::empty()).collect())
    }
}

struct ScriptedWriterTask {
    maker: ScriptedWriterMaker,
    info: TaskInfo,
}

#[async_trait]
impl Plugin for ScriptedWriterTask {
    async fn destroy(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        self.maker.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BatchWriter for ScriptedWriterTask {
    fn job_id(&self) -> i64 {
        self.info.job_id
    }

    fn task_group_id(&self) -> i64 {
        self.info.task_group_id
    }

    fn task_id(&self) -> i64 {
        self.info.task_id
    }

    fn batch_size(&self) -> usize {
        4
    }

    fn batch_timeout(&self) -> Duration {
        Duration::from_millis(20)
    }

    async fn batch_write(
        &self,
        _ctx: &CancellationToken,
        records: Vec<Box<dyn Record>>,
    ) -> Result<(), FerryError> {
        self.maker.received.fetch_add(records.len(), Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl WriterTask for ScriptedWriterTask {
    async fn start_write(
        &mut self,
        ctx: &CancellationToken,
        receiver: &dyn RecordReceiver,
    ) -> Result<(), FerryError> {
        let attempt = self.maker.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        batch::start_write(ctx, &*self, receiver).await?;
        if attempt <= self.maker.fail_first {
            return Err(FerryError::plugin(format!("injected write failure on attempt {attempt}")));
        }
        Ok(())
    }

    fn support_fail_over(&self) -> bool {
        self.maker.fail_over
    }
}
