//! Demo plugins: an in-memory row generator and a stdout sink.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ferry_core::Config;
use ferry_core::FerryError;
use ferry_core::element::{Column, Record};
use ferry_core::exchange::{RecordReceiver, RecordSender};
use ferry_core::plugin::{
    BatchWriter, Plugin, ReaderJob, ReaderMaker, ReaderTask, TaskInfo, WriterJob, WriterMaker,
    WriterTask, start_write,
};

fn parse<T: DeserializeOwned>(parameter: &Config) -> Result<T, FerryError> {
    serde_json::from_value(parameter.as_value().clone())
        .map_err(|e| FerryError::plugin(format!("invalid parameter: {e}")))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryReaderParameter {
    #[serde(default = "default_slice_record_count")]
    slice_record_count: u64,
    #[serde(default = "default_slice_number")]
    slice_number: usize,
    /// Set by the job split.
    #[serde(default)]
    slice: usize,
}

fn default_slice_record_count() -> u64 {
    10
}

fn default_slice_number() -> usize {
    1
}

/// `memoryreader`: every split generates `sliceRecordCount` rows.
pub struct MemoryReaderMaker;

impl ReaderMaker for MemoryReaderMaker {
    fn job(&self, parameter: Config) -> Result<Box<dyn ReaderJob>, FerryError> {
        Ok(Box::new(MemoryReaderJob {
            parameter: parse(&parameter)?,
        }))
    }

    fn task(&self, info: TaskInfo) -> Result<Box<dyn ReaderTask>, FerryError> {
        Ok(Box::new(MemoryReaderTask {
            parameter: parse(&info.parameter)?,
            task_id: info.task_id,
        }))
    }
}

struct MemoryReaderJob {
    parameter: MemoryReaderParameter,
}

impl Plugin for MemoryReaderJob {}

#[async_trait]
impl ReaderJob for MemoryReaderJob {
    async fn split(
        &mut self,
        _ctx: &CancellationToken,
        _advice_number: usize,
    ) -> Result<Vec<Config>, FerryError> {
        // advice は使わず sliceNumber に従う
        Ok((0..self.parameter.slice_number.max(1))
            .map(|slice| {
                Config::from_value(json!({
                    "sliceRecordCount": self.parameter.slice_record_count,
                    "sliceNumber": self.parameter.slice_number,
                    "slice": slice,
                }))
            })
            .collect())
    }
}

struct MemoryReaderTask {
    parameter: MemoryReaderParameter,
    task_id: i64,
}

impl Plugin for MemoryReaderTask {}

#[async_trait]
impl ReaderTask for MemoryReaderTask {
    async fn start_read(
        &mut self,
        ctx: &CancellationToken,
        sender: &dyn RecordSender,
    ) -> Result<(), FerryError> {
        for i in 0..self.parameter.slice_record_count {
            if ctx.is_cancelled() {
                return Err(FerryError::Cancelled);
            }
            let mut record = sender.create_record();
            record.add(Column::new("id", i as i64))?;
            record.add(Column::new(
                "name",
                format!("slice-{}-row-{i}", self.parameter.slice),
            ))?;
            record.add(Column::new("even", i % 2 == 0))?;
            sender.send_writer(record)?;
        }
        sender.flush()?;
        debug!(task_id = self.task_id, rows = self.parameter.slice_record_count, "memory reader done");
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StdoutWriterParameter {
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    batch_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    4
}

fn default_batch_timeout_ms() -> u64 {
    200
}

/// `stdoutwriter`: prints each batch, one line per record.
pub struct StdoutWriterMaker;

impl WriterMaker for StdoutWriterMaker {
    fn job(&self, parameter: Config) -> Result<Box<dyn WriterJob>, FerryError> {
        Ok(Box::new(StdoutWriterJob { parameter }))
    }

    fn task(&self, info: TaskInfo) -> Result<Box<dyn WriterTask>, FerryError> {
        Ok(Box::new(StdoutWriterTask {
            parameter: parse(&info.parameter)?,
            info,
        }))
    }
}

struct StdoutWriterJob {
    parameter: Config,
}

impl Plugin for StdoutWriterJob {}

#[async_trait]
impl WriterJob for StdoutWriterJob {
    async fn split(
        &mut self,
        _ctx: &CancellationToken,
        reader_number: usize,
    ) -> Result<Vec<Config>, FerryError> {
        Ok(vec![self.parameter.clone(); reader_number])
    }
}

struct StdoutWriterTask {
    parameter: StdoutWriterParameter,
    info: TaskInfo,
}

impl Plugin for StdoutWriterTask {}

#[async_trait]
impl BatchWriter for StdoutWriterTask {
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
        self.parameter.batch_size
    }

    fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.parameter.batch_timeout_ms)
    }

    async fn batch_write(
        &self,
        _ctx: &CancellationToken,
        records: Vec<Box<dyn Record>>,
    ) -> Result<(), FerryError> {
        let mut out = std::io::stdout().lock();
        for record in &records {
            let line = render(record.as_ref())?;
            writeln!(out, "[task {}] {line}", self.info.task_id)
                .map_err(|e| FerryError::plugin(format!("stdout: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl WriterTask for StdoutWriterTask {
    async fn start_write(
        &mut self,
        ctx: &CancellationToken,
        receiver: &dyn RecordReceiver,
    ) -> Result<(), FerryError> {
        start_write(ctx, &*self, receiver).await
    }

    fn support_fail_over(&self) -> bool {
        true
    }
}

fn render(record: &dyn Record) -> Result<String, FerryError> {
    let mut fields = Vec::with_capacity(record.column_number());
    for i in 0..record.column_number() {
        let column = record.get_by_index(i)?;
        let value = if column.value().is_nil() {
            "null".to_string()
        } else {
            column.value().as_string()?
        };
        fields.push(format!("{}={value}", column.name()));
    }
    Ok(fields.join(" "))
}
