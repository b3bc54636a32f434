use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Channel, ExchangeError, RecordReceiver, RecordSender};
use crate::element::{DefaultRecord, ElementError, Record, is_terminate};

/// Hook applied to every record on its way to the writer.
pub trait Transformer: Send + Sync {
    fn transform(&self, record: Box<dyn Record>) -> Result<Box<dyn Record>, ElementError>;
}

/// Identity transformer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransformer;

impl Transformer for NoopTransformer {
    fn transform(&self, record: Box<dyn Record>) -> Result<Box<dyn Record>, ElementError> {
        Ok(record)
    }
}

/// Turns a [`Channel`] into the sender/receiver roles used by runners.
pub struct RecordExchanger {
    channel: Arc<Channel>,
    transformer: Arc<dyn Transformer>,
    shutdown: AtomicBool,
}

impl RecordExchanger {
    pub fn new(channel: Arc<Channel>, transformer: Arc<dyn Transformer>) -> Self {
        Self {
            channel,
            transformer,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn without_transformer(channel: Arc<Channel>) -> Self {
        Self::new(channel, Arc::new(NoopTransformer))
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), ExchangeError> {
        if self.is_shutdown() {
            return Err(ExchangeError::Shutdown);
        }
        Ok(())
    }

    /// Marks the exchanger inert and closes the channel. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.channel.close();
    }
}

impl RecordSender for RecordExchanger {
    fn create_record(&self) -> Box<dyn Record> {
        Box::new(DefaultRecord::new())
    }

    fn send_writer(&self, record: Box<dyn Record>) -> Result<(), ExchangeError> {
        self.ensure_running()?;
        let record = self.transformer.transform(record)?;
        self.channel.push(record)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn terminate(&self) -> Result<(), ExchangeError> {
        self.ensure_running()?;
        self.channel.push_terminate()?;
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ExchangeError> {
        RecordExchanger::shutdown(self);
        Ok(())
    }
}

impl RecordReceiver for RecordExchanger {
    fn get_from_reader(&self) -> Result<Box<dyn Record>, ExchangeError> {
        self.ensure_running()?;
        match self.channel.try_pop() {
            None => Err(ExchangeError::Empty),
            Some(record) if is_terminate(record.as_ref()) => Err(ExchangeError::Terminate),
            Some(record) => Ok(record),
        }
    }

    fn shutdown(&self) -> Result<(), ExchangeError> {
        RecordExchanger::shutdown(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Column, ColumnValue};

    struct Uppercase;

    impl Transformer for Uppercase {
        fn transform(&self, record: Box<dyn Record>) -> Result<Box<dyn Record>, ElementError> {
            let mut out = DefaultRecord::new();
            for i in 0..record.column_number() {
                let col = record.get_by_index(i)?;
                let text = col.value().as_string()?.to_uppercase();
                out.add(Column::new(col.name(), text))?;
            }
            Ok(Box::new(out))
        }
    }

    fn exchanger() -> RecordExchanger {
        RecordExchanger::without_transformer(Arc::new(Channel::new()))
    }

    fn send_named(ex: &RecordExchanger, value: impl Into<ColumnValue>) -> Result<(), ExchangeError> {
        let mut r = ex.create_record();
        r.add(Column::new("v", value)).unwrap();
        ex.send_writer(r)
    }

    #[test]
    fn empty_then_record_then_terminate() {
        let ex = exchanger();
        assert!(matches!(ex.get_from_reader(), Err(ExchangeError::Empty)));

        send_named(&ex, "a").unwrap();
        ex.terminate().unwrap();

        let r = ex.get_from_reader().unwrap();
        assert_eq!(r.get_by_name("v").unwrap().value(), &ColumnValue::from("a"));
        assert!(matches!(ex.get_from_reader(), Err(ExchangeError::Terminate)));
        assert!(matches!(ex.get_from_reader(), Err(ExchangeError::Empty)));
    }

    #[test]
    fn shutdown_makes_exchanger_inert() {
        let ex = exchanger();
        ex.terminate().unwrap();
        assert!(matches!(ex.get_from_reader(), Err(ExchangeError::Terminate)));

        ex.shutdown();
        ex.shutdown();
        assert!(ex.is_shutdown());
        assert!(ex.channel().is_closed());
        assert!(matches!(ex.get_from_reader(), Err(ExchangeError::Shutdown)));
        assert!(matches!(send_named(&ex, 1i64), Err(ExchangeError::Shutdown)));
        assert!(matches!(ex.terminate(), Err(ExchangeError::Shutdown)));
    }

    #[test]
    fn transformer_is_applied_before_push() {
        let ex = RecordExchanger::new(Arc::new(Channel::new()), Arc::new(Uppercase));
        send_named(&ex, "abc").unwrap();
        let r = ex.get_from_reader().unwrap();
        assert_eq!(r.get_by_name("v").unwrap().value(), &ColumnValue::from("ABC"));
    }

    #[test]
    fn transformer_failure_surfaces_as_transform_error() {
        let ex = RecordExchanger::new(Arc::new(Channel::new()), Arc::new(Uppercase));
        let mut r = ex.create_record();
        r.add(Column::null("v", crate::element::ColumnType::String)).unwrap();
        assert!(matches!(
            ex.send_writer(r),
            Err(ExchangeError::Transform(ElementError::NilValue(_)))
        ));
        assert!(ex.channel().is_empty());
    }

    #[test]
    fn sender_and_receiver_traits_share_shutdown() {
        let ex = exchanger();
        let receiver: &dyn RecordReceiver = &ex;
        receiver.shutdown().unwrap();
        let sender: &dyn RecordSender = &ex;
        assert!(matches!(sender.flush(), Ok(())));
        assert!(matches!(sender.send_writer(sender.create_record()), Err(ExchangeError::Shutdown)));
    }
}
