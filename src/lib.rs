//! Process-wide structured logger with Sentry error reporting.
//!
//! Records logged through [`Logger`] are fanned out to a set of sinks:
//!
//! - [`ConsoleSink`]: colored, pretty output on a terminal and one JSON
//!   object per line otherwise,
//! - [`SentryEventSink`]: `warn` and `error` records as Sentry events,
//! - [`BreadcrumbSink`]: `info` and above as Sentry breadcrumbs.
//!
//! Every `warn`/`error` record carries a [`CapturedTrace`] so Sentry can
//! attribute it to the calling code. [`init::init`] wires everything from
//! [`Config`], installs the global logger and a `tracing` subscriber, and
//! arms the [`ProcessGuard`].
//!
//! ```no_run
//! use sentry_log_pipeline::{init, Config};
//! use serde_json::json;
//!
//! let pipeline = init::init(Config::load()?)?;
//! let log = pipeline.logger();
//! log.info("Test Info", json!({ "some": "data" }))?;
//! log.warn("Test Warn", json!({ "test": "testing" }))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod breadcrumb;
pub mod config;
pub mod console;
pub mod env;
pub mod format;
pub mod guard;
pub mod init;
pub mod layer;
pub mod logger;
pub mod middleware;
pub mod noop_sink;
pub mod record;
pub mod sentry_sink;
pub mod severity;
pub mod sink;
pub mod trace;

pub use breadcrumb::BreadcrumbSink;
pub use config::{Config, ConfigError, Settings};
pub use console::ConsoleSink;
pub use format::{FormatMode, Formatter};
pub use guard::{Flush, GuardState, ProcessGuard, SentryFlusher};
pub use logger::{LogError, Logger, LoggerBuilder};
pub use record::LogRecord;
pub use sentry_sink::SentryEventSink;
pub use severity::Severity;
pub use sink::{Sink, SinkError};
pub use trace::{CapturedTrace, TraceFrame};
