//! Plugin contracts consumed by the engine.
//!
//! Lifecycle defaults live on one base trait ([`Plugin`]); jobs and tasks
//! extend it with a single extra capability each.

pub mod batch;
mod registry;

pub use batch::{BatchWriter, start_write};
pub use registry::PluginRegistry;

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::FerryError;
use crate::exchange::{RecordReceiver, RecordSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Reader,
    Writer,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Reader => f.write_str("reader"),
            PluginKind::Writer => f.write_str("writer"),
        }
    }
}

/// Lifecycle shared by jobs and tasks. Every step defaults to a no-op.
#[async_trait]
pub trait Plugin: Send {
    async fn init(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        Ok(())
    }

    async fn prepare(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        Ok(())
    }

    async fn post(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        Ok(())
    }

    async fn destroy(&mut self, _ctx: &CancellationToken) -> Result<(), FerryError> {
        Ok(())
    }
}

/// Splits a reader's job-level parameter into per-task parameters.
#[async_trait]
pub trait ReaderJob: Plugin {
    async fn split(
        &mut self,
        ctx: &CancellationToken,
        advice_number: usize,
    ) -> Result<Vec<Config>, FerryError>;
}

/// Splits a writer's parameter to match the reader's task count.
#[async_trait]
pub trait WriterJob: Plugin {
    async fn split(
        &mut self,
        ctx: &CancellationToken,
        reader_number: usize,
    ) -> Result<Vec<Config>, FerryError>;
}

#[async_trait]
pub trait ReaderTask: Plugin {
    async fn start_read(
        &mut self,
        ctx: &CancellationToken,
        sender: &dyn RecordSender,
    ) -> Result<(), FerryError>;
}

#[async_trait]
pub trait WriterTask: Plugin {
    async fn start_write(
        &mut self,
        ctx: &CancellationToken,
        receiver: &dyn RecordReceiver,
    ) -> Result<(), FerryError>;

    /// Can a failed attempt be retried without corrupting the destination?
    fn support_fail_over(&self) -> bool {
        false
    }
}

/// Identity and parameters handed to a task when it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub job_id: i64,
    pub task_group_id: i64,
    pub task_id: i64,
    pub parameter: Config,
}

/// Builds reader jobs and tasks. Registered by name in [`PluginRegistry`].
pub trait ReaderMaker: Send + Sync {
    fn job(&self, parameter: Config) -> Result<Box<dyn ReaderJob>, FerryError>;

    fn task(&self, info: TaskInfo) -> Result<Box<dyn ReaderTask>, FerryError>;
}

pub trait WriterMaker: Send + Sync {
    fn job(&self, parameter: Config) -> Result<Box<dyn WriterJob>, FerryError>;

    fn task(&self, info: TaskInfo) -> Result<Box<dyn WriterTask>, FerryError>;
}
