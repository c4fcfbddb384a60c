use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal log level, least severe first.
///
/// The variants follow the npm level set so that configuration values
/// such as `"verbose"` or `"silly"` keep working. Comparison is by
/// severity: `Severity::Error > Severity::Warn > Severity::Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    Silly,
    Debug,
    Verbose,
    Http,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 7] = [
        Severity::Silly,
        Severity::Debug,
        Severity::Verbose,
        Severity::Http,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Silly => "silly",
            Severity::Debug => "debug",
            Severity::Verbose => "verbose",
            Severity::Http => "http",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    /// Label used when talking to the error-tracking service.
    ///
    /// Only `warn` differs (`"warning"`); every other level passes through.
    pub fn external_label(self) -> &'static str {
        match self {
            Severity::Warn => "warning",
            other => other.as_str(),
        }
    }

    /// Sentry level derived from [`Severity::external_label`].
    ///
    /// Sentry has no equivalent for the sub-info levels, they collapse
    /// into `debug`.
    pub fn sentry_level(self) -> sentry::Level {
        match self.external_label() {
            "error" => sentry::Level::Error,
            "warning" => sentry::Level::Warning,
            "info" => sentry::Level::Info,
            _ => sentry::Level::Debug,
        }
    }

    /// Whether a record at this level must carry a stack trace.
    pub fn requires_trace(self) -> bool {
        matches!(self, Severity::Warn | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown severity `{0}`")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .or_else(|| (lower == "warning").then_some(Severity::Warn))
            .ok_or_else(|| ParseSeverityError(s.to_string()))
    }
}

impl TryFrom<String> for Severity {
    type Error = ParseSeverityError;

    fn try_from(value: String) -> Result<Self, ParseSeverityError> {
        value.parse()
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Severity::Error,
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::TRACE => Severity::Silly,
        }
    }
}
