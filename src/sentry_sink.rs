use crate::config::Config;
use crate::record::LogRecord;
use crate::severity::Severity;
use crate::sink::{Sink, SinkError};
use crate::trace::{CapturedTrace, ResolvedTrace, TraceFrame};
use sentry::protocol::{Event, Exception, Value};
use serde_json::json;
use std::sync::Arc;

/// Reports `warn` and `error` records to Sentry as full events.
///
/// Every event gets its own scope carrying the configured tags and extras,
/// a snapshot of the resolved configuration and the record details.
/// Submission goes through the current hub; the Sentry transport queues it,
/// so `handle` never waits on the network and always completes.
pub struct SentryEventSink {
    config: Arc<Config>,
}

impl SentryEventSink {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Build the event for a record without submitting it.
    ///
    /// Returns the event together with the frames to attach as the
    /// `stacktrace` extra.
    pub fn build_event(&self, record: &LogRecord) -> (Event<'static>, Vec<TraceFrame>) {
        let level = record.level.sentry_level();
        let Some(trace) = &record.trace else {
            let event = Event {
                message: Some(record.message.clone()),
                level,
                ..Default::default()
            };
            return (event, Vec::new());
        };

        match trace.resolve() {
            ResolvedTrace::Internal { origin, frames } => {
                let event = Event {
                    message: Some(record.message.clone()),
                    transaction: origin.map(TraceFrame::origin_label),
                    stacktrace: CapturedTrace::to_sentry_stacktrace(frames),
                    level,
                    ..Default::default()
                };
                (event, frames.to_vec())
            }
            ResolvedTrace::External(trace) => {
                let exception = Exception {
                    ty: trace.name.clone(),
                    value: trace.message.clone().or_else(|| Some(record.message.clone())),
                    stacktrace: CapturedTrace::to_sentry_stacktrace(&trace.frames),
                    ..Default::default()
                };
                let event = Event {
                    message: Some(record.message.clone()),
                    exception: vec![exception].into(),
                    level,
                    ..Default::default()
                };
                (event, trace.frames.clone())
            }
        }
    }

    fn details(&self, record: &LogRecord) -> Value {
        json!({
            "level": record.level.as_str(),
            "payload": record.payload(),
            "timestamp": record.timestamp_string(),
            "message": record.message,
        })
    }
}

impl Sink for SentryEventSink {
    fn name(&self) -> &str {
        "sentry-events"
    }

    fn min_severity(&self) -> Severity {
        Severity::Warn
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        let settings = &self.config.settings().log.sentry;
        let (event, frames) = self.build_event(record);
        let stacktrace = serde_json::to_value(&frames).unwrap_or(Value::Null);

        sentry::with_scope(
            |scope| {
                for key in &settings.tags {
                    match self.config.get(key) {
                        Some(Value::String(value)) => scope.set_tag(key, value),
                        Some(Value::Null) | None => {}
                        Some(value) => scope.set_tag(key, value),
                    }
                }
                for key in &settings.extra {
                    scope.set_extra(key, self.config.get(key).cloned().unwrap_or(Value::Null));
                }
                scope.set_extra("config", self.config.snapshot());
                scope.set_extra("details", self.details(record));
                scope.set_extra("stacktrace", stacktrace);
                scope.set_level(Some(record.level.sentry_level()));
            },
            || sentry::capture_event(event),
        );
        Ok(())
    }
}
