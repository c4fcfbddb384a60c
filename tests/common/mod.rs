#![allow(dead_code)]

use sentry_log_pipeline::record::LogRecord;
use sentry_log_pipeline::severity::Severity;
use sentry_log_pipeline::sink::{Sink, SinkError};
use std::io;
use std::sync::{Arc, Mutex};

/// Sink that keeps every record it is handed.
#[derive(Clone)]
pub struct RecordingSink {
    min: Severity,
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingSink {
    pub fn new(min: Severity) -> Self {
        Self {
            min,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn min_severity(&self) -> Severity {
        self.min
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Sink whose every write fails.
pub struct FailingSink;

impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn min_severity(&self) -> Severity {
        Severity::Silly
    }

    fn handle(&self, _record: &LogRecord) -> Result<(), SinkError> {
        Err(SinkError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed")))
    }
}

/// In-memory writer usable as a `MakeWriter` through a closure.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn make_writer(&self) -> impl Fn() -> SharedBuffer + Send + Sync + 'static {
        let buffer = self.clone();
        move || buffer.clone()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails, like a closed pipe.
pub struct BrokenPipe;

impl io::Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
