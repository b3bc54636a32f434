use std::collections::HashMap;
use std::sync::Arc;

use super::{PluginKind, ReaderMaker, WriterMaker};
use crate::error::FerryError;

/// Registry of reader/writer makers (name -> maker).
///
/// Design:
/// - Built once during initialization (mutable).
/// - Shared read-only afterwards behind an `Arc`, so no locks.
/// - Passed explicitly to whoever needs it; there is no global registry.
#[derive(Default)]
pub struct PluginRegistry {
    readers: HashMap<String, Arc<dyn ReaderMaker>>,
    writers: HashMap<String, Arc<dyn WriterMaker>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_reader(
        &mut self,
        name: impl Into<String>,
        maker: Arc<dyn ReaderMaker>,
    ) -> Result<(), FerryError> {
        let name = name.into();
        if self.readers.contains_key(&name) {
            return Err(FerryError::DuplicatePlugin {
                kind: PluginKind::Reader,
                name,
            });
        }
        self.readers.insert(name, maker);
        Ok(())
    }

    pub fn register_writer(
        &mut self,
        name: impl Into<String>,
        maker: Arc<dyn WriterMaker>,
    ) -> Result<(), FerryError> {
        let name = name.into();
        if self.writers.contains_key(&name) {
            return Err(FerryError::DuplicatePlugin {
                kind: PluginKind::Writer,
                name,
            });
        }
        self.writers.insert(name, maker);
        Ok(())
    }

    pub fn reader(&self, name: &str) -> Result<Arc<dyn ReaderMaker>, FerryError> {
        self.readers
            .get(name)
            .cloned()
            .ok_or_else(|| FerryError::PluginNotFound {
                kind: PluginKind::Reader,
                name: name.to_string(),
            })
    }

    pub fn writer(&self, name: &str) -> Result<Arc<dyn WriterMaker>, FerryError> {
        self.writers
            .get(name)
            .cloned()
            .ok_or_else(|| FerryError::PluginNotFound {
                kind: PluginKind::Writer,
                name: name.to_string(),
            })
    }

    pub fn reader_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.readers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn writer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.writers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.readers.len() + self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedReaderMaker, ScriptedWriterMaker};

    #[test]
    fn register_and_resolve() {
        let mut reg = PluginRegistry::new();
        reg.register_reader("mem", Arc::new(ScriptedReaderMaker::rows(1)))
            .unwrap();
        reg.register_writer("sink", Arc::new(ScriptedWriterMaker::default()))
            .unwrap();

        assert!(reg.reader("mem").is_ok());
        assert!(reg.writer("sink").is_ok());
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.reader_names(), vec!["mem".to_string()]);
        assert_eq!(reg.writer_names(), vec!["sink".to_string()]);
    }

    #[test]
    fn duplicate_names_are_rejected_per_kind() {
        let mut reg = PluginRegistry::new();
        reg.register_reader("x", Arc::new(ScriptedReaderMaker::rows(1)))
            .unwrap();
        let err = reg
            .register_reader("x", Arc::new(ScriptedReaderMaker::rows(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            FerryError::DuplicatePlugin { kind: PluginKind::Reader, .. }
        ));

        // readers and writers live in separate namespaces
        reg.register_writer("x", Arc::new(ScriptedWriterMaker::default()))
            .unwrap();
    }

    #[test]
    fn unknown_names_are_errors() {
        let reg = PluginRegistry::new();
        assert!(reg.is_empty());
        let err = reg.writer("nope").err().unwrap();
        assert!(err.to_string().contains("writer plugin not found: nope"));
        assert!(matches!(
            reg.reader("nope").err().unwrap(),
            FerryError::PluginNotFound { kind: PluginKind::Reader, .. }
        ));
    }
}
