use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{FailoverPolicy, MappedTaskManager, TaskDoer, TaskExecuter, TaskScheduler};
use crate::config::{Config, ConfigError, keys};
use crate::error::FerryError;
use crate::observability::TaskGroupCounts;
use crate::plugin::PluginRegistry;

const DEFAULT_SLEEP_INTERVAL_MS: i64 = 100;
const DEFAULT_MAX_RETRY_TIMES: i64 = 1;
const DEFAULT_RETRY_INTERVAL_MS: i64 = 1000;
const DEFAULT_MAX_WORKER_NUMBER: i64 = 4;

/// Container settings read from `core.container.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskGroupSettings {
    pub job_id: i64,
    pub task_group_id: i64,
    /// Pause before polling again when nothing is runnable.
    pub sleep_interval: Duration,
    pub failover: FailoverPolicy,
    pub max_worker_number: usize,
}

impl TaskGroupSettings {
    pub fn from_config(conf: &Config) -> Result<Self, ConfigError> {
        let millis = |v: i64| Duration::from_millis(u64::try_from(v).unwrap_or(0));

        let sleep_interval =
            conf.get_int64_or_default(keys::JOB_SLEEP_INTERVAL, DEFAULT_SLEEP_INTERVAL_MS)?;
        let retry_max_count = conf
            .get_int64_or_default(keys::TASK_FAILOVER_MAX_RETRY_TIMES, DEFAULT_MAX_RETRY_TIMES)?;
        let retry_interval = conf.get_int64_or_default(
            keys::TASK_FAILOVER_RETRY_INTERVAL_IN_MSEC,
            DEFAULT_RETRY_INTERVAL_MS,
        )?;
        let max_worker_number = conf
            .get_int64_or_default(keys::TASK_GROUP_MAX_WORKER_NUMBER, DEFAULT_MAX_WORKER_NUMBER)?;

        Ok(Self {
            job_id: conf.get_int64(keys::JOB_ID)?,
            task_group_id: conf.get_int64(keys::TASK_GROUP_ID)?,
            // 0 だと ticker が作れない
            sleep_interval: millis(sleep_interval).max(Duration::from_millis(1)),
            failover: FailoverPolicy {
                retry_max_count: u32::try_from(retry_max_count.max(0)).unwrap_or(u32::MAX),
                retry_interval: millis(retry_interval),
            },
            max_worker_number: usize::try_from(max_worker_number).unwrap_or(0).max(1),
        })
    }
}

#[derive(Default)]
struct Tally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

/// Runs every task of one task group with bounded concurrency and fail-over.
///
/// # フロー
/// 1. `new` で job.content を分割し、タスクごとに executer を作って remaining に積む
/// 2. `start` のメインループで remaining -> running に移し scheduler に投入
/// 3. タスクごとの監視タスクが完了を待ち、リトライするか取り除くかを決める
/// 4. 全タスク終了 or cancel でループを抜け、監視タスクと scheduler を join
pub struct TaskGroupContainer {
    ctx: CancellationToken,
    settings: TaskGroupSettings,
    manager: Arc<MappedTaskManager<TaskExecuter>>,
    task_count: usize,
    tally: Arc<Tally>,
}

impl TaskGroupContainer {
    /// Builds one executer per `job.content` entry. Config errors and unknown
    /// plugins are returned here.
    pub fn new(
        ctx: &CancellationToken,
        conf: &Config,
        registry: &PluginRegistry,
    ) -> Result<Self, FerryError> {
        let settings = TaskGroupSettings::from_config(conf)?;
        let contents = conf.get_configs(keys::JOB_CONTENT)?;

        let manager = Arc::new(MappedTaskManager::new());
        let mut seen = HashSet::with_capacity(contents.len());
        for content in &contents {
            let task = TaskExecuter::new(
                ctx,
                settings.job_id,
                settings.task_group_id,
                content,
                registry,
            )?;
            if !seen.insert(task.task_id()) {
                return Err(FerryError::Other(format!(
                    "duplicate task id {} in {}",
                    task.task_id(),
                    keys::JOB_CONTENT
                )));
            }
            manager.push_remain(Arc::new(task));
        }

        Ok(Self {
            ctx: ctx.clone(),
            settings,
            manager,
            task_count: contents.len(),
            tally: Arc::new(Tally::default()),
        })
    }

    pub fn settings(&self) -> &TaskGroupSettings {
        &self.settings
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn counts(&self) -> TaskGroupCounts {
        let sets = self.manager.counts();
        TaskGroupCounts {
            remaining: sets.remaining,
            running: sets.running,
            succeeded: self.tally.succeeded.load(Ordering::Relaxed),
            failed: self.tally.failed.load(Ordering::Relaxed),
            retried: self.tally.retried.load(Ordering::Relaxed),
        }
    }

    /// Runs until every task finished or the token is cancelled.
    ///
    /// Precedence of the result: a submission failure, then `Cancelled`, then
    /// the permanent task failures.
    pub async fn start(&self) -> Result<(), FerryError> {
        let settings = self.settings;
        let scheduler = TaskScheduler::new(settings.max_worker_number, self.task_count.max(1));
        let mut supervisors: JoinSet<Option<FerryError>> = JoinSet::new();
        let mut failures = Vec::new();
        let mut fatal = None;

        let mut ticker = tokio::time::interval(settings.sleep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            job_id = settings.job_id,
            task_group_id = settings.task_group_id,
            tasks = self.task_count,
            workers = settings.max_worker_number,
            "task group started"
        );

        while !self.manager.is_empty() && !self.ctx.is_cancelled() {
            while let Some(joined) = supervisors.try_join_next() {
                collect(joined, &mut failures);
            }

            let Some(task) = self.manager.pop_remain_and_add_run() else {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.ctx.cancelled() => {}
                }
                continue;
            };

            let done = match scheduler.push(Arc::clone(&task) as Arc<dyn TaskDoer>) {
                Ok(done) => done,
                Err(e) => {
                    error!(task = %task.key(), error = %e, "task submission failed");
                    self.manager.remove_run(&task);
                    fatal = Some(FerryError::from(e));
                    break;
                }
            };

            supervisors.spawn(supervise(
                self.ctx.clone(),
                task,
                done,
                Arc::clone(&self.manager),
                settings.failover,
                Arc::clone(&self.tally),
            ));
        }

        info!(
            task_group_id = settings.task_group_id,
            in_flight = supervisors.len(),
            "task group draining"
        );
        while let Some(joined) = supervisors.join_next().await {
            collect(joined, &mut failures);
        }
        scheduler.stop().await;

        let counts = self.counts();
        info!(
            task_group_id = settings.task_group_id,
            succeeded = counts.succeeded,
            failed = counts.failed,
            retried = counts.retried,
            "task group finished"
        );

        if let Some(e) = fatal {
            return Err(e);
        }
        if self.ctx.is_cancelled() {
            return Err(FerryError::Cancelled);
        }
        FerryError::combine(failures)
    }
}

fn collect(joined: Result<Option<FerryError>, JoinError>, failures: &mut Vec<FerryError>) {
    match joined {
        Ok(Some(e)) => failures.push(e),
        Ok(None) => {}
        Err(e) => failures.push(FerryError::Other(format!("task supervisor panicked: {e}"))),
    }
}

/// Waits for one attempt and decides: done, retry, or permanent failure.
async fn supervise(
    ctx: CancellationToken,
    task: Arc<TaskExecuter>,
    done: oneshot::Receiver<Result<(), FerryError>>,
    manager: Arc<MappedTaskManager<TaskExecuter>>,
    policy: FailoverPolicy,
    tally: Arc<Tally>,
) -> Option<FerryError> {
    let result = tokio::select! {
        result = done => result.unwrap_or_else(|_| {
            Err(FerryError::Other(format!("task {} was dropped by the scheduler", task.key())))
        }),
        _ = ctx.cancelled() => Err(FerryError::Cancelled),
    };

    let e = match result {
        Ok(()) => {
            task.shutdown().await;
            manager.remove_run(&task);
            tally.succeeded.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Err(_) if ctx.is_cancelled() => {
            task.shutdown().await;
            manager.remove_run(&task);
            return None;
        }
        Err(e) => e,
    };

    let attempts = task.attempt_count();
    if policy.should_retry(task.support_fail_over(), attempts) {
        warn!(task = %task.key(), attempt = attempts, error = %e, "task failed, retrying");
        task.shutdown().await;
        tokio::select! {
            _ = tokio::time::sleep(policy.retry_interval) => {}
            _ = ctx.cancelled() => {}
        }
        if ctx.is_cancelled() {
            manager.remove_run(&task);
        } else {
            manager.remove_run_and_push_remain(&task);
            tally.retried.fetch_add(1, Ordering::Relaxed);
        }
        return None;
    }

    error!(task = %task.key(), attempts, error = %e, "task failed permanently");
    task.shutdown().await;
    manager.remove_run(&task);
    tally.failed.fetch_add(1, Ordering::Relaxed);
    Some(FerryError::TaskFailed {
        key: task.key().to_string(),
        attempts,
        source: Box::new(e),
    })
}
