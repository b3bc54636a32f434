//! Job splitting: one reader/writer pair becomes N task configs.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, keys};
use crate::error::FerryError;
use crate::plugin::{Plugin, PluginKind, PluginRegistry, ReaderJob, WriterJob};

const READER_NAME: &str = "job.content[0].reader.name";
const READER_PARAMETER: &str = "job.content[0].reader.parameter";
const WRITER_NAME: &str = "job.content[0].writer.name";
const WRITER_PARAMETER: &str = "job.content[0].writer.parameter";

/// Turns a job config into a task-group config.
///
/// # フロー
/// 1. reader/writer の job を registry から作る
/// 2. init -> prepare
/// 3. reader を advice_number で分割し、writer を reader の数に合わせて分割
/// 4. post（成功時のみ）。destroy は必ず呼ぶ
/// 5. `job.content[i]` に zip して書き戻す（`core.*` はそのまま）
pub struct JobSplitter<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> JobSplitter<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    pub async fn split(
        &self,
        ctx: &CancellationToken,
        conf: &Config,
        advice_number: usize,
    ) -> Result<Config, FerryError> {
        let reader_name = conf.get_string(READER_NAME)?;
        let writer_name = conf.get_string(WRITER_NAME)?;
        let reader_maker = self.registry.reader(&reader_name)?;
        let writer_maker = self.registry.writer(&writer_name)?;

        let mut reader = reader_maker.job(conf.get_config_or_empty(READER_PARAMETER)?)?;
        let mut writer = writer_maker.job(conf.get_config_or_empty(WRITER_PARAMETER)?)?;

        let result = async {
            reader.init(ctx).await?;
            writer.init(ctx).await?;
            reader.prepare(ctx).await?;
            writer.prepare(ctx).await?;

            let readers = reader.split(ctx, advice_number.max(1)).await?;
            let writers = writer.split(ctx, readers.len()).await?;
            if readers.len() != writers.len() {
                return Err(FerryError::SplitMismatch {
                    reader: readers.len(),
                    writer: writers.len(),
                });
            }

            reader.post(ctx).await?;
            writer.post(ctx).await?;
            Ok::<_, FerryError>((readers, writers))
        }
        .await;

        destroy(reader.as_mut(), ctx, PluginKind::Reader).await;
        destroy(writer.as_mut(), ctx, PluginKind::Writer).await;
        let (readers, writers) = result?;

        let content: Vec<Value> = readers
            .into_iter()
            .zip(writers)
            .enumerate()
            .map(|(task_id, (r, w))| {
                json!({
                    "taskId": task_id,
                    "reader": {"name": reader_name, "parameter": r.into_value()},
                    "writer": {"name": writer_name, "parameter": w.into_value()},
                })
            })
            .collect();

        info!(
            reader = %reader_name,
            writer = %writer_name,
            tasks = content.len(),
            "job split"
        );

        let mut out = conf.clone();
        out.set(keys::JOB_CONTENT, Value::Array(content))?;
        Ok(out)
    }
}

async fn destroy<P>(job: &mut P, ctx: &CancellationToken, kind: PluginKind)
where
    P: Plugin + ?Sized,
{
    if let Err(e) = job.destroy(ctx).await {
        warn!(plugin = %kind, error = %e, "job destroy failed");
    }
}
