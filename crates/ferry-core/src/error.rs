use thiserror::Error;

use crate::config::ConfigError;
use crate::element::ElementError;
use crate::exchange::ExchangeError;
use crate::plugin::PluginKind;
use crate::taskgroup::SchedulerError;

#[derive(Debug, Error)]
pub enum FerryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Element(#[from] ElementError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("{kind} plugin not found: {name}")]
    PluginNotFound { kind: PluginKind, name: String },

    #[error("duplicate {kind} plugin: {name}")]
    DuplicatePlugin { kind: PluginKind, name: String },

    /// Failure reported by a reader/writer implementation.
    #[error("{0}")]
    Plugin(String),

    #[error("writer split into {writer} pieces but reader split into {reader}")]
    SplitMismatch { reader: usize, writer: usize },

    #[error("cancelled")]
    Cancelled,

    #[error("task {key} failed after {attempts} attempt(s): {source}")]
    TaskFailed {
        key: String,
        attempts: u32,
        #[source]
        source: Box<FerryError>,
    },

    #[error("{}", join_messages(.0))]
    Multiple(Vec<FerryError>),

    #[error("{0}")]
    Other(String),
}

impl FerryError {
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::Plugin(message.into())
    }

    /// Folds collected errors: none is `Ok`, one is returned as is.
    pub fn combine(mut errors: Vec<FerryError>) -> Result<(), FerryError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn join_messages(errors: &[FerryError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
