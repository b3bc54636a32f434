//! Task-group execution: runners, executers, scheduling and fail-over.
//!
//! # 構成
//! - **runner**: 1 つのプラグインタスクのライフサイクルを回す
//! - **executer**: reader/writer の 1 ペアを 1 回の attempt として実行する
//! - **manager**: remaining / running の 2 集合
//! - **scheduler**: 上限付きワーカープール
//! - **failover**: リトライ判定
//! - **container**: 上記をまとめるメインループ

mod container;
mod executer;
mod failover;
mod manager;
mod runner;
mod scheduler;

pub use container::{TaskGroupContainer, TaskGroupSettings};
pub use executer::{ExecState, TaskExecuter};
pub use failover::FailoverPolicy;
pub use manager::{MappedTaskManager, ManagerCounts};
pub use runner::{ReaderRunner, WriterRunner};
pub use scheduler::TaskScheduler;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::FerryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler is stopped")]
    Stopped,

    #[error("scheduler backlog is full")]
    QueueFull,
}

/// Anything tracked by a [`MappedTaskManager`].
pub trait Keyed: Send + Sync {
    fn key(&self) -> &str;
}

/// One unit of work accepted by a [`TaskScheduler`].
#[async_trait]
pub trait TaskDoer: Send + Sync {
    async fn run(&self) -> Result<(), FerryError>;
}
