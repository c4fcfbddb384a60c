use crate::record::LogRecord;
use crate::severity::Severity;
use crate::trace::CapturedTrace;

/// Step applied to every record after it is built and before any sink sees
/// it. Middleware is composed once, when the logger is built.
pub trait RecordMiddleware: Send + Sync {
    fn apply(&self, record: &mut LogRecord);
}

/// Guarantees that records at the configured levels carry a trace,
/// capturing the current stack when the caller did not supply one.
#[derive(Debug, Clone)]
pub struct TraceInjection {
    levels: Vec<Severity>,
}

impl Default for TraceInjection {
    fn default() -> Self {
        Self {
            levels: Severity::ALL
                .into_iter()
                .filter(|level| level.requires_trace())
                .collect(),
        }
    }
}

impl TraceInjection {
    pub fn levels(&self) -> &[Severity] {
        &self.levels
    }
}

impl RecordMiddleware for TraceInjection {
    #[inline(never)]
    fn apply(&self, record: &mut LogRecord) {
        if record.trace.is_none() && self.levels.contains(&record.level) {
            record.trace = Some(CapturedTrace::capture());
        }
    }
}

/// Renames caller-supplied traces that only carry the generic `Error`
/// name after the log message, which groups better in Sentry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceNaming;

impl RecordMiddleware for TraceNaming {
    fn apply(&self, record: &mut LogRecord) {
        if let Some(trace) = record.trace.as_mut() {
            if trace.has_generic_name() {
                trace.name = record.message.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_only_for_warn_and_error() {
        let injection = TraceInjection::default();
        assert_eq!(injection.levels(), &[Severity::Warn, Severity::Error]);

        for level in Severity::ALL {
            let mut record = LogRecord::new(level, "msg");
            injection.apply(&mut record);
            assert_eq!(record.trace.is_some(), level.requires_trace(), "level {}", level);
        }
    }

    #[test]
    fn keeps_supplied_trace() {
        let supplied = CapturedTrace {
            message: Some("mine".into()),
            ..CapturedTrace::default()
        };
        let mut record = LogRecord::new(Severity::Error, "msg").with_trace(supplied.clone());
        TraceInjection::default().apply(&mut record);
        assert_eq!(record.trace, Some(supplied));
    }

    #[test]
    fn generic_names_take_the_message() {
        let mut record = LogRecord::new(Severity::Error, "Failed something")
            .with_trace(CapturedTrace::default());
        TraceNaming.apply(&mut record);
        assert_eq!(record.trace.unwrap().name, "Failed something");

        let mut record = LogRecord::new(Severity::Error, "Failed something").with_trace(CapturedTrace {
            name: "ParseError".into(),
            ..CapturedTrace::default()
        });
        TraceNaming.apply(&mut record);
        assert_eq!(record.trace.unwrap().name, "ParseError");
    }
}
