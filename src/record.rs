use crate::severity::Severity;
use crate::trace::CapturedTrace;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Reserved payload key carrying a [`CapturedTrace`].
pub const TRACE_KEY: &str = "trace";

/// One call to the logger, as seen by every sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub level: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<CapturedTrace>,
}

impl LogRecord {
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            fields: Map::new(),
            trace: None,
        }
    }

    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_trace(mut self, trace: CapturedTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// ISO-8601 timestamp with millisecond precision and a `Z` suffix.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// The caller's structured payload, `null` when nothing was supplied.
    pub fn payload(&self) -> Value {
        if self.fields.is_empty() {
            Value::Null
        } else {
            Value::Object(self.fields.clone())
        }
    }
}
