//! Exchange: the in-memory path between a reader and a writer.
//!
//! RecordQueue (buffer + wakeups) -> Channel (sentinel + stats) ->
//! RecordExchanger (sender/receiver roles with shutdown semantics).

mod channel;
mod exchanger;
mod queue;

pub use channel::{Channel, ChannelStats};
pub use exchanger::{NoopTransformer, RecordExchanger, Transformer};
pub use queue::RecordQueue;

use thiserror::Error;

use crate::element::{ElementError, Record};

/// Exchange errors. `Empty` and `Terminate` are control signals rather than
/// failures: the writer side interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("no record buffered")]
    Empty,

    #[error("reader terminated the stream")]
    Terminate,

    #[error("exchanger is shut down")]
    Shutdown,

    #[error("record queue is closed")]
    Closed,

    #[error("transform: {0}")]
    Transform(#[from] ElementError),
}

/// Reader-side view of an exchange.
pub trait RecordSender: Send + Sync {
    fn create_record(&self) -> Box<dyn Record>;

    fn send_writer(&self, record: Box<dyn Record>) -> Result<(), ExchangeError>;

    fn flush(&self) -> Result<(), ExchangeError>;

    fn terminate(&self) -> Result<(), ExchangeError>;

    fn shutdown(&self) -> Result<(), ExchangeError>;
}

/// Writer-side view of an exchange.
pub trait RecordReceiver: Send + Sync {
    /// Non-blocking: `Err(Empty)` when nothing is buffered right now.
    fn get_from_reader(&self) -> Result<Box<dyn Record>, ExchangeError>;

    fn shutdown(&self) -> Result<(), ExchangeError>;
}
