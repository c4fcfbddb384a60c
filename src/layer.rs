use crate::logger::Logger;
use crate::record::LogRecord;
use crate::severity::Severity;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns `tracing` events into
/// [`LogRecord`]s and hands them to a [`Logger`].
///
/// Events therefore get the same treatment as direct logger calls: trace
/// injection on `WARN`/`ERROR`, console formatting and Sentry routing.
pub struct PipelineLayer {
    logger: Logger,
    min_level: Severity,
    /// Events rejected by a sink.
    pub failed_events: Arc<AtomicU64>,
}

impl PipelineLayer {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            min_level: Severity::Silly,
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Disable events below `level`, so they are neither visited nor built
    /// into records.
    pub fn with_min_level(mut self, level: Severity) -> Self {
        self.min_level = level;
        self
    }
}

impl<S> Layer<S> for PipelineLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        Severity::from(metadata.level()) >= self.min_level
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = Severity::from(meta.level());
        if level < self.min_level {
            return;
        }

        let mut fields = Map::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        fields.insert("target".to_string(), Value::String(meta.target().to_string()));
        let record = LogRecord::new(level, message.unwrap_or_default()).with_fields(fields);

        if let Err(e) = self.logger.dispatch(record) {
            self.failed_events.fetch_add(1, Ordering::Relaxed);
            eprintln!("failed to log tracing event: {}", e);
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
