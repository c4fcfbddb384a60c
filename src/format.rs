use crate::config::Settings;
use crate::record::{LogRecord, TRACE_KEY};
use crate::severity::Severity;
use nu_ansi_term::Color;
use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How records are rendered on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Interactive terminal: colored level, pretty JSON payload.
    Pretty { highlight: bool },
    /// One JSON object per line.
    Json,
    /// `level: message`, nothing else.
    Raw,
}

/// Deterministic renderer from [`LogRecord`] to a single console entry
/// (without trailing newline).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatter {
    mode: FormatMode,
}

impl Formatter {
    pub fn new(mode: FormatMode) -> Self {
        Self { mode }
    }

    /// Pick the mode from configuration and whether stdout is a terminal.
    pub fn detect(settings: &Settings, is_tty: bool) -> Self {
        let mode = if settings.log.fast {
            FormatMode::Raw
        } else if is_tty && settings.log.colors {
            FormatMode::Pretty {
                highlight: settings.environment.is_develop(),
            }
        } else {
            FormatMode::Json
        };
        Self::new(mode)
    }

    pub fn mode(&self) -> FormatMode {
        self.mode
    }

    pub fn format(&self, record: &LogRecord) -> Result<String, FormatError> {
        match self.mode {
            FormatMode::Raw => Ok(format!("{}: {}", record.level, record.message)),
            FormatMode::Json => format_json(record),
            FormatMode::Pretty { highlight } => format_pretty(record, highlight),
        }
    }
}

fn format_json(record: &LogRecord) -> Result<String, FormatError> {
    let mut line = record.fields.clone();
    if let Some(trace) = &record.trace {
        line.insert(TRACE_KEY.to_string(), serde_json::to_value(trace)?);
    }
    line.insert("timestamp".to_string(), Value::String(record.timestamp_string()));
    line.insert("level".to_string(), Value::String(record.level.to_string()));
    line.insert("message".to_string(), Value::String(record.message.clone()));
    Ok(serde_json::to_string(&line)?)
}

fn format_pretty(record: &LogRecord, highlight: bool) -> Result<String, FormatError> {
    let payload = if record.fields.is_empty() {
        "null".to_string()
    } else if highlight {
        let mut out = String::new();
        highlight_object(&record.fields, 0, &mut out);
        out
    } else {
        serde_json::to_string_pretty(&record.fields)?
    };
    Ok(format!(
        "{} {}: {} - {}",
        record.timestamp_string(),
        level_color(record.level).paint(record.level.as_str()),
        record.message,
        payload
    ))
}

fn level_color(level: Severity) -> Color {
    match level {
        Severity::Error => Color::Red,
        Severity::Warn => Color::Yellow,
        Severity::Info => Color::Green,
        Severity::Http => Color::Green,
        Severity::Verbose => Color::Cyan,
        Severity::Debug => Color::Blue,
        Severity::Silly => Color::Purple,
    }
}

// Pretty-printed JSON, two-space indent like `to_string_pretty`, with
// tokens colored by type.
fn highlight_value(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) => out.push_str(&Color::Purple.paint(value.to_string()).to_string()),
        Value::Number(n) => out.push_str(&Color::Yellow.paint(n.to_string()).to_string()),
        Value::String(_) => out.push_str(&Color::Green.paint(value.to_string()).to_string()),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                indent(depth + 1, out);
                highlight_value(item, depth + 1, out);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(depth, out);
            out.push(']');
        }
        Value::Object(map) => highlight_object(map, depth, out),
    }
}

fn highlight_object(map: &Map<String, Value>, depth: usize, out: &mut String) {
    if map.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for (i, (key, value)) in map.iter().enumerate() {
        indent(depth + 1, out);
        let key = Value::String(key.clone()).to_string();
        out.push_str(&Color::Cyan.paint(key).to_string());
        out.push_str(": ");
        highlight_value(value, depth + 1, out);
        if i + 1 < map.len() {
            out.push(',');
        }
        out.push('\n');
    }
    indent(depth, out);
    out.push('}');
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::CapturedTrace;
    use serde_json::json;

    fn record(level: Severity) -> LogRecord {
        let fields = json!({ "some": "data", "count": 3, "nested": { "ok": true, "list": [1, null] } });
        LogRecord::new(level, "Test Info").with_fields(fields.as_object().cloned().unwrap())
    }

    #[test]
    fn detect_picks_mode_from_flags() {
        let mut settings = Settings::default();
        assert_eq!(Formatter::detect(&settings, true).mode(), FormatMode::Pretty { highlight: true });
        assert_eq!(Formatter::detect(&settings, false).mode(), FormatMode::Json);

        settings.environment.level = "production".to_string();
        assert_eq!(Formatter::detect(&settings, true).mode(), FormatMode::Pretty { highlight: false });

        settings.log.colors = false;
        assert_eq!(Formatter::detect(&settings, true).mode(), FormatMode::Json);

        settings.log.fast = true;
        assert_eq!(Formatter::detect(&settings, true).mode(), FormatMode::Raw);
    }

    #[test]
    fn json_lines_parse_back() {
        let formatter = Formatter::new(FormatMode::Json);
        for level in Severity::ALL {
            let record = record(level);
            let line = formatter.format(&record).unwrap();
            assert!(!line.contains('\n'));
            let parsed: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(parsed["level"], json!(level.as_str()));
            assert_eq!(parsed["message"], json!("Test Info"));
            assert_eq!(parsed["timestamp"], json!(record.timestamp_string()));
            assert_eq!(parsed["some"], json!("data"));
        }
    }

    #[test]
    fn reserved_keys_win_over_fields() {
        let record = LogRecord::new(Severity::Info, "real")
            .with_fields(json!({ "message": "shadow", "level": "x" }).as_object().cloned().unwrap());
        let parsed: Value =
            serde_json::from_str(&Formatter::new(FormatMode::Json).format(&record).unwrap()).unwrap();
        assert_eq!(parsed["message"], json!("real"));
        assert_eq!(parsed["level"], json!("info"));
    }

    #[test]
    fn json_includes_trace() {
        let record = record(Severity::Error).with_trace(CapturedTrace {
            message: Some("boom".into()),
            ..CapturedTrace::default()
        });
        let parsed: Value =
            serde_json::from_str(&Formatter::new(FormatMode::Json).format(&record).unwrap()).unwrap();
        assert_eq!(parsed["trace"]["message"], json!("boom"));
        assert_eq!(parsed["trace"]["name"], json!("Error"));
    }

    #[test]
    fn formatting_is_idempotent() {
        let record = record(Severity::Warn);
        for mode in [
            FormatMode::Json,
            FormatMode::Raw,
            FormatMode::Pretty { highlight: true },
            FormatMode::Pretty { highlight: false },
        ] {
            let formatter = Formatter::new(mode);
            assert_eq!(formatter.format(&record).unwrap(), formatter.format(&record).unwrap());
        }
    }

    #[test]
    fn pretty_without_highlight_embeds_pretty_json() {
        let record = record(Severity::Info);
        let out = Formatter::new(FormatMode::Pretty { highlight: false }).format(&record).unwrap();
        let expected_payload = serde_json::to_string_pretty(&record.fields).unwrap();
        assert!(out.starts_with(&record.timestamp_string()));
        assert!(out.contains(": Test Info - "));
        assert!(out.ends_with(&expected_payload));
    }

    #[test]
    fn highlighted_payload_has_same_text_once_colors_are_removed() {
        let record = record(Severity::Info);
        let mut highlighted = String::new();
        highlight_object(&record.fields, 0, &mut highlighted);
        let plain = strip_ansi(&highlighted);
        assert_eq!(plain, serde_json::to_string_pretty(&record.fields).unwrap());
    }

    #[test]
    fn pretty_prints_null_without_payload() {
        let record = LogRecord::new(Severity::Info, "bare");
        let out = Formatter::new(FormatMode::Pretty { highlight: true }).format(&record).unwrap();
        assert!(out.ends_with("bare - null"));
    }

    #[test]
    fn raw_mode_skips_everything() {
        let out = Formatter::new(FormatMode::Raw).format(&record(Severity::Warn)).unwrap();
        assert_eq!(out, "warn: Test Info");
    }

    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\u{1b}' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }
}
