//! Element model: the records and columns that flow from readers to writers.

mod column;
mod record;

pub use column::{Column, ColumnType, ColumnValue, DEFAULT_TIME_FORMAT};
pub use record::{DefaultRecord, Record, TerminateRecord, is_terminate};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    #[error("cannot convert {from} to {to}: {reason}")]
    Transform {
        from: ColumnType,
        to: ColumnType,
        reason: String,
    },

    #[error("nil {0} value")]
    NilValue(ColumnType),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column already exists: {0}")]
    ColumnExists(String),

    #[error("column index {index} out of range (len={len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),
}
