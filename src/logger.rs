use crate::middleware::{RecordMiddleware, TraceInjection, TraceNaming};
use crate::record::{LogRecord, TRACE_KEY};
use crate::severity::Severity;
use crate::sink::{Sink, SinkError};
use crate::trace::CapturedTrace;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Payload key used for caller data that is not a key/value mapping.
pub const DATA_KEY: &str = "data";

static GLOBAL: OnceLock<Logger> = OnceLock::new();

#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("failed to serialize log data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink `{sink}` failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: SinkError,
    },
}

/// Process-wide logging facade.
///
/// Each call builds a [`LogRecord`], runs it through the middleware chain
/// and hands it to every sink whose minimum severity admits it. Cloning is
/// cheap; all clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

struct Inner {
    sinks: Vec<Arc<dyn Sink>>,
    middleware: Vec<Box<dyn RecordMiddleware>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks: Vec<&str> = self.inner.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("Logger")
            .field("sinks", &sinks)
            .field("middleware", &self.inner.middleware.len())
            .finish()
    }
}

/// Builder for [`Logger`].
///
/// [`TraceInjection`] is always installed first and [`TraceNaming`] right
/// after it, so every `warn`/`error` record carries a trace whatever else is
/// configured.
#[derive(Default)]
pub struct LoggerBuilder {
    sinks: Vec<Arc<dyn Sink>>,
    middleware: Vec<Box<dyn RecordMiddleware>>,
}

impl LoggerBuilder {
    pub fn sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn middleware<M: RecordMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    pub fn build(self) -> Logger {
        let mut middleware: Vec<Box<dyn RecordMiddleware>> =
            vec![Box::new(TraceInjection::default()), Box::new(TraceNaming)];
        middleware.extend(self.middleware);
        Logger {
            inner: Arc::new(Inner {
                sinks: self.sinks,
                middleware,
            }),
        }
    }
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Logger without sinks; records are built and dropped.
    pub fn disabled() -> Self {
        Self::builder().build()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.inner.sinks.iter().map(|s| s.name()).collect()
    }

    /// Log `message` at `level` with optional structured `data`.
    ///
    /// `data` may be anything serializable: `()` for no data, a map or
    /// struct for fields, any other value is stored under `data`. A `trace`
    /// entry holding a [`CapturedTrace`] (or a string) is attached as the
    /// record's trace instead of a field.
    pub fn log<T: Serialize>(&self, level: Severity, message: &str, data: T) -> Result<(), LogError> {
        let (fields, trace) = split_payload(serde_json::to_value(data)?);
        let mut record = LogRecord::new(level, message).with_fields(fields);
        record.trace = trace;
        self.dispatch(record)
    }

    /// Run middleware and fan the record out to the sinks.
    ///
    /// Every accepting sink sees the record even when an earlier one
    /// fails; the first failure is returned.
    pub fn dispatch(&self, mut record: LogRecord) -> Result<(), LogError> {
        for middleware in &self.inner.middleware {
            middleware.apply(&mut record);
        }

        let mut first_error = None;
        for sink in &self.inner.sinks {
            if !sink.accepts(record.level) {
                continue;
            }
            if let Err(source) = sink.handle(&record) {
                first_error.get_or_insert(LogError::Sink {
                    sink: sink.name().to_string(),
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn error<T: Serialize>(&self, message: &str, data: T) -> Result<(), LogError> {
        self.log(Severity::Error, message, data)
    }

    pub fn warn<T: Serialize>(&self, message: &str, data: T) -> Result<(), LogError> {
        self.log(Severity::Warn, message, data)
    }

    pub fn info<T: Serialize>(&self, message: &str, data: T) -> Result<(), LogError> {
        self.log(Severity::Info, message, data)
    }

    pub fn http<T: Serialize>(&self, message: &str, data: T) -> Result<(), LogError> {
        self.log(Severity::Http, message, data)
    }

    pub fn verbose<T: Serialize>(&self, message: &str, data: T) -> Result<(), LogError> {
        self.log(Severity::Verbose, message, data)
    }

    pub fn debug<T: Serialize>(&self, message: &str, data: T) -> Result<(), LogError> {
        self.log(Severity::Debug, message, data)
    }

    pub fn silly<T: Serialize>(&self, message: &str, data: T) -> Result<(), LogError> {
        self.log(Severity::Silly, message, data)
    }
}

/// Install the process-wide logger. Fails (returning the logger) if one is
/// already installed.
pub fn set_global(logger: Logger) -> Result<(), Logger> {
    GLOBAL.set(logger)
}

pub fn global() -> Option<&'static Logger> {
    GLOBAL.get()
}

/// Separate caller data into record fields and an optional trace.
pub(crate) fn split_payload(value: Value) -> (Map<String, Value>, Option<CapturedTrace>) {
    match value {
        Value::Null => (Map::new(), None),
        Value::Object(mut fields) => {
            let trace = match fields.remove(TRACE_KEY) {
                None | Some(Value::Null) => None,
                Some(raw) => match CapturedTrace::from_value(&raw) {
                    Some(trace) => Some(trace),
                    None => {
                        fields.insert(TRACE_KEY.to_string(), raw);
                        None
                    }
                },
            };
            (fields, trace)
        }
        other => {
            let mut fields = Map::new();
            fields.insert(DATA_KEY.to_string(), other);
            (fields, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop_sink::NoopSink;
    use serde_json::json;

    #[test]
    fn split_payload_handles_every_shape() {
        assert_eq!(split_payload(Value::Null), (Map::new(), None));

        let (fields, trace) = split_payload(json!("just text"));
        assert_eq!(fields.get(DATA_KEY), Some(&json!("just text")));
        assert!(trace.is_none());

        let (fields, trace) = split_payload(json!({ "some": "data", "trace": { "message": "x" } }));
        assert_eq!(fields.len(), 1);
        assert_eq!(trace.and_then(|t| t.message).as_deref(), Some("x"));

        let (fields, trace) = split_payload(json!({ "trace": { "id": "abc" } }));
        assert_eq!(fields.get(TRACE_KEY), Some(&json!({ "id": "abc" })));
        assert!(trace.is_none());

        let (fields, trace) = split_payload(json!({ "trace": 17 }));
        assert_eq!(fields.get(TRACE_KEY), Some(&json!(17)));
        assert!(trace.is_none());

        let (fields, trace) = split_payload(json!({ "trace": null }));
        assert!(fields.is_empty());
        assert!(trace.is_none());
    }

    #[test]
    fn unserializable_data_is_reported() {
        use std::collections::HashMap;
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        let err = Logger::disabled().info("bad", &bad).unwrap_err();
        assert!(matches!(err, LogError::Serialize(_)));
    }

    #[test]
    fn shared_sinks_keep_registration_order() {
        let shared: Arc<dyn Sink> = Arc::new(NoopSink);
        let logger = Logger::builder()
            .shared_sink(Arc::clone(&shared))
            .sink(NoopSink)
            .build();
        assert_eq!(logger.sink_names(), vec!["noop", "noop"]);
        assert!(logger.error("dropped", json!({ "n": 1 })).is_ok());
        assert_eq!(Arc::strong_count(&shared), 2);
    }
}
