use crate::record::LogRecord;
use crate::severity::Severity;
use crate::sink::{Sink, SinkError};

/// A sink that accepts every record and drops it.
///
/// Useful for measuring the overhead of the logger itself (record
/// building, trace capture, middleware) without any I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn min_severity(&self) -> Severity {
        Severity::Silly
    }

    fn handle(&self, _record: &LogRecord) -> Result<(), SinkError> {
        Ok(())
    }
}
