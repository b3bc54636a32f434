use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::FerryError;
use crate::exchange::{RecordExchanger, RecordSender};
use crate::plugin::{Plugin, PluginKind, ReaderTask, WriterTask};

/// Drives one reader task: init -> prepare -> start_read -> post, then destroy.
///
/// The terminate record is pushed on every exit path so the writer side
/// always sees end-of-stream.
#[derive(Clone)]
pub struct ReaderRunner {
    key: Arc<str>,
    task: Arc<Mutex<Box<dyn ReaderTask>>>,
    exchanger: Arc<RecordExchanger>,
}

impl ReaderRunner {
    pub fn new(
        key: impl Into<Arc<str>>,
        task: Arc<Mutex<Box<dyn ReaderTask>>>,
        exchanger: Arc<RecordExchanger>,
    ) -> Self {
        Self {
            key: key.into(),
            task,
            exchanger,
        }
    }

    pub async fn run(&self, ctx: &CancellationToken) -> Result<(), FerryError> {
        let mut guard = self.task.lock().await;
        let task: &mut dyn ReaderTask = &mut **guard;

        let result = async {
            task.init(ctx).await?;
            task.prepare(ctx).await?;
            task.start_read(ctx, self.exchanger.as_ref()).await?;
            task.post(ctx).await
        }
        .await;

        // shutdown 済みなら送れないが、その場合 writer 側も止まっている
        if let Err(e) = self.exchanger.terminate() {
            debug!(task = %self.key, error = %e, "terminate record not delivered");
        }

        destroy(task, ctx, &self.key, PluginKind::Reader).await;
        result
    }

    pub fn shutdown(&self) {
        self.exchanger.shutdown();
    }
}

/// Drives one writer task: init -> prepare -> start_write -> post, then destroy.
#[derive(Clone)]
pub struct WriterRunner {
    key: Arc<str>,
    task: Arc<Mutex<Box<dyn WriterTask>>>,
    exchanger: Arc<RecordExchanger>,
}

impl WriterRunner {
    pub fn new(
        key: impl Into<Arc<str>>,
        task: Arc<Mutex<Box<dyn WriterTask>>>,
        exchanger: Arc<RecordExchanger>,
    ) -> Self {
        Self {
            key: key.into(),
            task,
            exchanger,
        }
    }

    pub async fn run(&self, ctx: &CancellationToken) -> Result<(), FerryError> {
        let mut guard = self.task.lock().await;
        let task: &mut dyn WriterTask = &mut **guard;

        let result = async {
            task.init(ctx).await?;
            task.prepare(ctx).await?;
            task.start_write(ctx, self.exchanger.as_ref()).await?;
            task.post(ctx).await
        }
        .await;

        destroy(task, ctx, &self.key, PluginKind::Writer).await;
        result
    }

    pub fn shutdown(&self) {
        self.exchanger.shutdown();
    }
}

async fn destroy<P>(task: &mut P, ctx: &CancellationToken, key: &str, kind: PluginKind)
where
    P: Plugin + ?Sized,
{
    if let Err(e) = task.destroy(ctx).await {
        warn!(task = %key, plugin = %kind, error = %e, "destroy failed");
    }
}
