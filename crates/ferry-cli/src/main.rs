use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ferry_core::plugin::PluginRegistry;
use ferry_core::{Config, FerryError, JobSplitter, TaskGroupContainer};

mod plugins;

use plugins::{MemoryReaderMaker, StdoutWriterMaker};

/// Channel count suggested to the reader's split.
const ADVICE_NUMBER: usize = 4;

fn job_config() -> Config {
    Config::from_value(json!({
        "core": {"container": {
            "job": {"id": 1, "sleepInterval": 50},
            "taskGroup": {"id": 0, "maxWorkerNumber": 2},
            "task": {"failover": {"maxRetryTimes": 2, "retryIntervalInMsec": 500}}
        }},
        "job": {"content": [{
            "reader": {
                "name": "memoryreader",
                "parameter": {"sliceRecordCount": 6, "sliceNumber": 3}
            },
            "writer": {
                "name": "stdoutwriter",
                "parameter": {"batchSize": 4, "batchTimeoutMs": 100}
            }
        }]}
    }))
}

#[tokio::main]
async fn main() -> Result<(), FerryError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) プラグインを登録
    let mut registry = PluginRegistry::new();
    registry.register_reader("memoryreader", Arc::new(MemoryReaderMaker))?;
    registry.register_writer("stdoutwriter", Arc::new(StdoutWriterMaker))?;
    let registry = Arc::new(registry);

    // (B) Ctrl-C で root token を cancel
    let ctx = CancellationToken::new();
    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("interrupt received, cancelling");
                    ctx.cancel();
                }
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
            }
        }
    });

    // (C) job を分割して 1 つの task group として実行
    let conf = JobSplitter::new(&registry)
        .split(&ctx, &job_config(), ADVICE_NUMBER)
        .await?;
    let container = TaskGroupContainer::new(&ctx, &conf, &registry)?;
    let result = container.start().await;

    let counts = container.counts();
    match serde_json::to_string(&counts) {
        Ok(json) => info!(counts = %json, "task group counts"),
        Err(e) => warn!(error = %e, "failed to encode counts"),
    }
    result
}
