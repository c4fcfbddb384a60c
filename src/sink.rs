use crate::format::FormatError;
use crate::record::LogRecord;
use crate::severity::Severity;

/// Errors a [`Sink`] can report back to the logger.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to format record: {0}")]
    Format(#[from] FormatError),

    #[error("failed to write record: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for [`LogRecord`]s dispatched by the [`Logger`](crate::logger::Logger).
///
/// Implementations perform one side effect per record (console write,
/// Sentry submission, ...). The logger calls `handle` synchronously on the
/// logging thread for every record at or above [`Sink::min_severity`], so
/// implementations must not wait on the network: remote delivery is left
/// to the client library's own queue.
pub trait Sink: Send + Sync {
    /// Short name used in error messages.
    fn name(&self) -> &str;

    /// Least severe level this sink accepts.
    fn min_severity(&self) -> Severity;

    fn accepts(&self, level: Severity) -> bool {
        level >= self.min_severity()
    }

    /// Handle a single record.
    ///
    /// **Returns**
    /// - `Ok(())` once the local side effect completed (for remote sinks:
    ///   once the record was handed to the client's queue).
    /// - `Err(..)` if the local side effect failed. The logger still
    ///   dispatches to the remaining sinks and then surfaces the error.
    fn handle(&self, record: &LogRecord) -> Result<(), SinkError>;
}
