use crate::config::Config;
use crate::record::LogRecord;
use crate::severity::Severity;
use crate::sink::{Sink, SinkError};
use sentry::protocol::{Breadcrumb, Map, Value};
use std::sync::Arc;

/// Appends `info`-and-above records to the current Sentry session trail.
///
/// Breadcrumbs never alert on their own; they show up on the next event
/// captured on the same hub. Trail size and rotation are handled by the
/// client (`max_breadcrumbs`).
pub struct BreadcrumbSink {
    config: Arc<Config>,
}

impl BreadcrumbSink {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn build_breadcrumb(&self, record: &LogRecord) -> Breadcrumb {
        let mut data: Map<String, Value> = record
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(trace) = &record.trace {
            let frames = trace.resolve().frames();
            if !frames.is_empty() {
                data.insert(
                    "stacktrace".to_string(),
                    serde_json::to_value(frames).unwrap_or(Value::Null),
                );
            }
        }

        Breadcrumb {
            category: Some(self.config.settings().job.name.clone()),
            message: Some(record.message.clone()),
            level: record.level.sentry_level(),
            data,
            ..Default::default()
        }
    }
}

impl Sink for BreadcrumbSink {
    fn name(&self) -> &str {
        "sentry-breadcrumbs"
    }

    fn min_severity(&self) -> Severity {
        Severity::Info
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        sentry::add_breadcrumb(self.build_breadcrumb(record));
        Ok(())
    }
}
