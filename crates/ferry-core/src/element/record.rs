//! Records: ordered, named collections of columns.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::mem::size_of;

use super::{Column, ElementError};

/// A row travelling through a channel.
///
/// Plugins may bring their own implementation; the engine only needs these
/// operations plus `as_any` to recognise the terminate sentinel.
pub trait Record: fmt::Debug + Send + Sync {
    fn add(&mut self, column: Column) -> Result<(), ElementError>;

    fn get_by_index(&self, index: usize) -> Result<&Column, ElementError>;

    fn get_by_name(&self, name: &str) -> Result<&Column, ElementError>;

    /// Replace the column at `index`.
    fn set(&mut self, index: usize, column: Column) -> Result<(), ElementError>;

    fn column_number(&self) -> usize;

    /// Sum of the columns' payload sizes.
    fn byte_size(&self) -> usize;

    fn memory_size(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// Is `record` the end-of-stream sentinel?
pub fn is_terminate(record: &dyn Record) -> bool {
    record.as_any().is::<TerminateRecord>()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultRecord {
    columns: Vec<Column>,
    names: HashMap<String, usize>,
    byte_size: usize,
    memory_size: usize,
}

impl DefaultRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl Record for DefaultRecord {
    fn add(&mut self, column: Column) -> Result<(), ElementError> {
        if self.names.contains_key(column.name()) {
            return Err(ElementError::ColumnExists(column.name().to_string()));
        }
        self.byte_size += column.byte_size();
        self.memory_size += column.memory_size();
        self.names.insert(column.name().to_string(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    fn get_by_index(&self, index: usize) -> Result<&Column, ElementError> {
        self.columns.get(index).ok_or(ElementError::IndexOutOfRange {
            index,
            len: self.columns.len(),
        })
    }

    fn get_by_name(&self, name: &str) -> Result<&Column, ElementError> {
        self.names
            .get(name)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| ElementError::ColumnNotFound(name.to_string()))
    }

    fn set(&mut self, index: usize, column: Column) -> Result<(), ElementError> {
        let len = self.columns.len();
        let Some(old) = self.columns.get(index) else {
            return Err(ElementError::IndexOutOfRange { index, len });
        };
        if old.name() != column.name() {
            if self.names.contains_key(column.name()) {
                return Err(ElementError::ColumnExists(column.name().to_string()));
            }
            self.names.remove(old.name());
            self.names.insert(column.name().to_string(), index);
        }
        self.byte_size = self.byte_size - old.byte_size() + column.byte_size();
        self.memory_size = self.memory_size - old.memory_size() + column.memory_size();
        self.columns[index] = column;
        Ok(())
    }

    fn column_number(&self) -> usize {
        self.columns.len()
    }

    fn byte_size(&self) -> usize {
        self.byte_size
    }

    fn memory_size(&self) -> usize {
        size_of::<Self>() + self.memory_size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// End-of-stream sentinel. Carries no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminateRecord;

impl Record for TerminateRecord {
    fn add(&mut self, _column: Column) -> Result<(), ElementError> {
        Err(ElementError::NotSupported("add on terminate record"))
    }

    fn get_by_index(&self, _index: usize) -> Result<&Column, ElementError> {
        Err(ElementError::NotSupported("get_by_index on terminate record"))
    }

    fn get_by_name(&self, _name: &str) -> Result<&Column, ElementError> {
        Err(ElementError::NotSupported("get_by_name on terminate record"))
    }

    fn set(&mut self, _index: usize, _column: Column) -> Result<(), ElementError> {
        Err(ElementError::NotSupported("set on terminate record"))
    }

    fn column_number(&self) -> usize {
        0
    }

    fn byte_size(&self) -> usize {
        0
    }

    fn memory_size(&self) -> usize {
        0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
