use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt;

/// Name given to traces synthesized by the logger itself.
pub const SYNTHESIZED_NAME: &str = "Trace";

/// Generic name carried by traces built from plain errors.
pub const GENERIC_ERROR_NAME: &str = "Error";

/// Function-path prefixes that belong to the logging pipeline rather than
/// to the code that called it.
const INTERNAL_PREFIXES: &[&str] = &[
    concat!(env!("CARGO_CRATE_NAME"), "::logger::"),
    concat!(env!("CARGO_CRATE_NAME"), "::middleware::"),
    concat!(env!("CARGO_CRATE_NAME"), "::layer::"),
    concat!(env!("CARGO_CRATE_NAME"), "::trace::"),
    "tracing::",
    "tracing_core::",
    "tracing_subscriber::",
];

/// Standard-library frames that can sit between pipeline frames (thread
/// locals, closures called through `FnOnce`).
const RUNTIME_PREFIXES: &[&str] = &["std::", "core::", "alloc::"];

/// A single resolved stack frame. Every field is optional because symbol
/// information depends on how the binary was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceFrame {
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl TraceFrame {
    /// True when the frame was produced by the pipeline's own machinery.
    pub fn is_internal(&self) -> bool {
        self.function
            .as_deref()
            .map(|f| f.trim_start_matches('<'))
            .is_some_and(|f| INTERNAL_PREFIXES.iter().any(|p| f.starts_with(p)))
    }

    fn is_runtime(&self) -> bool {
        self.function
            .as_deref()
            .map(|f| f.trim_start_matches('<'))
            .is_some_and(|f| RUNTIME_PREFIXES.iter().any(|p| f.starts_with(p)))
    }

    /// `"<file> in <function> (<line>:<column>)"`, used as the logical
    /// origin of a message event.
    pub fn origin_label(&self) -> String {
        let unknown = "<unknown>";
        let line = self.line.map_or_else(|| "?".to_string(), |l| l.to_string());
        let column = self.column.map_or_else(|| "?".to_string(), |c| c.to_string());
        format!(
            "{} in {} ({}:{})",
            self.file.as_deref().unwrap_or(unknown),
            self.function.as_deref().unwrap_or(unknown),
            line,
            column
        )
    }
}

/// Keys a caller-supplied trace object may carry.
const TRACE_FIELDS: &[&str] = &["name", "message", "frames"];

/// Owned snapshot of a call stack, innermost frame first.
///
/// Deserialization is lenient about missing fields, which fall back to
/// their defaults, but rejects unknown ones so ordinary data under a
/// `trace` key is not mistaken for a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapturedTrace {
    pub name: String,
    pub message: Option<String>,
    pub frames: Vec<TraceFrame>,
}

impl Default for CapturedTrace {
    fn default() -> Self {
        Self {
            name: GENERIC_ERROR_NAME.to_string(),
            message: None,
            frames: Vec::new(),
        }
    }
}

impl CapturedTrace {
    /// Walk the current stack.
    ///
    /// Frames belonging to the unwinder and to this function are dropped,
    /// so the first frame is whoever called `capture`.
    #[inline(never)]
    pub fn capture() -> Self {
        Self {
            name: SYNTHESIZED_NAME.to_string(),
            message: None,
            frames: walk_stack("CapturedTrace::capture"),
        }
    }

    /// Build a trace for an existing error, captured at the call site.
    ///
    /// The message carries the error and its `source()` chain joined by
    /// `": "`. The name is the generic `Error`, which the logger replaces
    /// with the log message when the trace is attached to a record.
    #[inline(never)]
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            name: GENERIC_ERROR_NAME.to_string(),
            message: Some(message),
            frames: walk_stack("CapturedTrace::from_error"),
        }
    }

    /// Interpret a caller-supplied `trace` value.
    ///
    /// Objects holding at least one trace field and nothing else are
    /// parsed leniently, strings become the message of a generic error.
    /// Anything else is not a trace.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                if !map.keys().any(|key| TRACE_FIELDS.contains(&key.as_str())) {
                    return None;
                }
                let mut trace: CapturedTrace = serde_json::from_value(value.clone()).ok()?;
                if trace.name.is_empty() {
                    trace.name = GENERIC_ERROR_NAME.to_string();
                }
                Some(trace)
            }
            Value::String(message) => Some(Self {
                message: Some(message.clone()),
                ..Self::default()
            }),
            _ => None,
        }
    }

    pub fn has_generic_name(&self) -> bool {
        self.name == GENERIC_ERROR_NAME
    }

    /// Split off the leading frames that belong to the pipeline.
    ///
    /// Standard-library frames interleaved with pipeline frames are
    /// stripped along with them. The origin is the first non-std frame
    /// after the last pipeline frame.
    pub fn resolve(&self) -> ResolvedTrace<'_> {
        let mut last_internal = None;
        for (index, frame) in self.frames.iter().enumerate() {
            if frame.is_internal() {
                last_internal = Some(index);
            } else if !frame.is_runtime() {
                break;
            }
        }
        match last_internal {
            None => ResolvedTrace::External(self),
            Some(index) => {
                let remaining = &self.frames[index + 1..];
                ResolvedTrace::Internal {
                    origin: remaining.iter().find(|f| !f.is_runtime()).or(remaining.first()),
                    frames: remaining,
                }
            }
        }
    }

    /// Sentry stacktrace, oldest frame first as the protocol expects.
    pub fn to_sentry_stacktrace(frames: &[TraceFrame]) -> Option<sentry::protocol::Stacktrace> {
        if frames.is_empty() {
            return None;
        }
        let frames = frames
            .iter()
            .rev()
            .map(|frame| sentry::protocol::Frame {
                function: frame.function.clone(),
                abs_path: frame.file.clone(),
                filename: frame.file.clone(),
                lineno: frame.line.map(u64::from),
                colno: frame.column.map(u64::from),
                in_app: Some(!frame.is_internal()),
                ..Default::default()
            })
            .collect();
        Some(sentry::protocol::Stacktrace {
            frames,
            ..Default::default()
        })
    }
}

/// Resolve the current stack, dropping every frame up to and including the
/// innermost one whose function contains `marker`.
#[inline(never)]
fn walk_stack(marker: &str) -> Vec<TraceFrame> {
    let backtrace = backtrace::Backtrace::new();
    let mut frames: Vec<TraceFrame> = backtrace
        .frames()
        .iter()
        .flat_map(|frame| frame.symbols())
        .map(|symbol| TraceFrame {
            function: symbol.name().map(|name| format!("{:#}", name)),
            file: symbol.filename().map(|path| path.display().to_string()),
            line: symbol.lineno(),
            column: symbol.colno(),
        })
        .collect();

    let cut = frames
        .iter()
        .position(|frame| frame.function.as_deref().is_some_and(|f| f.contains(marker)));
    match cut {
        Some(index) => {
            frames.drain(..=index);
        }
        // No symbols: keep what we have minus the unwinder itself.
        None => frames.retain(|frame| {
            !frame
                .function
                .as_deref()
                .is_some_and(|f| f.starts_with("backtrace::") || f.contains("walk_stack"))
        }),
    }
    frames
}

impl fmt::Display for CapturedTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.name, message)?,
            None => f.write_str(&self.name)?,
        }
        for frame in &self.frames {
            write!(f, "\n    at {}", frame.origin_label())?;
        }
        Ok(())
    }
}

/// Outcome of splitting a trace into pipeline frames and caller frames.
#[derive(Debug, PartialEq, Eq)]
pub enum ResolvedTrace<'a> {
    /// The trace was synthesized inside the pipeline. `origin` is the first
    /// caller frame, `frames` everything from it outwards.
    Internal {
        origin: Option<&'a TraceFrame>,
        frames: &'a [TraceFrame],
    },
    /// The trace came from user code and is reported as-is.
    External(&'a CapturedTrace),
}

impl<'a> ResolvedTrace<'a> {
    pub fn frames(&self) -> &'a [TraceFrame] {
        match self {
            ResolvedTrace::Internal { frames, .. } => frames,
            ResolvedTrace::External(trace) => &trace.frames,
        }
    }
}
