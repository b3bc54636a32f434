//! Batch-write loop shared by writers that flush in size- or time-bounded batches.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::element::Record;
use crate::error::FerryError;
use crate::exchange::{ExchangeError, RecordReceiver};

/// How long the pump waits before polling an empty exchange again.
pub const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(1);

const MIN_BATCH_TIMEOUT: Duration = Duration::from_millis(1);

/// A sink that accepts records in batches.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    fn job_id(&self) -> i64;

    fn task_group_id(&self) -> i64;

    fn task_id(&self) -> i64;

    fn batch_size(&self) -> usize;

    /// Partial batches older than this are flushed anyway.
    fn batch_timeout(&self) -> Duration;

    async fn batch_write(
        &self,
        ctx: &CancellationToken,
        records: Vec<Box<dyn Record>>,
    ) -> Result<(), FerryError>;
}

/// Drains `receiver` into `writer` until the reader terminates.
///
/// # フロー
/// 1. pump が `get_from_reader` を回し、レコードを容量 1 の内部チャネルへ流す
/// 2. メインループは「レコード到着 / ticker / チャネル close」を select する
/// 3. 終了時に pump を cancel して join する
///
/// Cancellation and `Terminate` count as success. A write failure wins over
/// a reader failure.
pub async fn start_write(
    ctx: &CancellationToken,
    writer: &dyn BatchWriter,
    receiver: &dyn RecordReceiver,
) -> Result<(), FerryError> {
    let batch_size = writer.batch_size().max(1);
    let batch_timeout = writer.batch_timeout().max(MIN_BATCH_TIMEOUT);
    let pump_ctx = ctx.child_token();
    let (tx, mut rx) = mpsc::channel::<Box<dyn Record>>(1);

    let pump = pump_records(&pump_ctx, receiver, tx);
    let drain = async {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + batch_timeout, batch_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch: Vec<Box<dyn Record>> = Vec::with_capacity(batch_size);

        let result = loop {
            tokio::select! {
                record = rx.recv() => match record {
                    Some(record) => {
                        batch.push(record);
                        if batch.len() >= batch_size
                            && let Err(e) = flush(ctx, writer, &mut batch).await
                        {
                            break Err(e);
                        }
                    }
                    None => break flush(ctx, writer, &mut batch).await,
                },
                _ = ticker.tick() => {
                    if let Err(e) = flush(ctx, writer, &mut batch).await {
                        break Err(e);
                    }
                }
            }
        };

        pump_ctx.cancel();
        drop(rx);
        result
    };

    let (read_result, write_result) = tokio::join!(pump, drain);
    if let Err(e) = write_result {
        warn!(
            job_id = writer.job_id(),
            task_group_id = writer.task_group_id(),
            task_id = writer.task_id(),
            error = %e,
            "batch write failed"
        );
        return Err(e);
    }

    match read_result {
        Ok(()) | Err(FerryError::Cancelled) | Err(FerryError::Exchange(ExchangeError::Terminate)) => {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn flush(
    ctx: &CancellationToken,
    writer: &dyn BatchWriter,
    batch: &mut Vec<Box<dyn Record>>,
) -> Result<(), FerryError> {
    if batch.is_empty() {
        return Ok(());
    }
    let records = std::mem::replace(batch, Vec::with_capacity(writer.batch_size().max(1)));
    let count = records.len();
    writer.batch_write(ctx, records).await?;
    debug!(
        job_id = writer.job_id(),
        task_group_id = writer.task_group_id(),
        task_id = writer.task_id(),
        records = count,
        "batch flushed"
    );
    Ok(())
}

async fn pump_records(
    ctx: &CancellationToken,
    receiver: &dyn RecordReceiver,
    tx: mpsc::Sender<Box<dyn Record>>,
) -> Result<(), FerryError> {
    loop {
        match receiver.get_from_reader() {
            Ok(record) => {
                tokio::select! {
                    sent = tx.send(record) => {
                        // drain 側が先に終わった
                        if sent.is_err() {
                            return Err(FerryError::Cancelled);
                        }
                    }
                    _ = ctx.cancelled() => return Err(FerryError::Cancelled),
                }
            }
            Err(ExchangeError::Empty) => {
                tokio::select! {
                    _ = tokio::time::sleep(EMPTY_POLL_INTERVAL) => {}
                    _ = ctx.cancelled() => return Err(FerryError::Cancelled),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}
