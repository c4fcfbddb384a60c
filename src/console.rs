use crate::format::Formatter;
use crate::record::LogRecord;
use crate::severity::Severity;
use crate::sink::{Sink, SinkError};
use std::io::{self, Stderr, Stdout, Write};
use tracing_subscriber::fmt::MakeWriter;

/// Writes formatted records to stdout, `error` to stderr.
///
/// `warn` can additionally be duplicated to stderr. Writers are anything
/// implementing [`MakeWriter`], which keeps the sink testable with
/// in-memory buffers.
pub struct ConsoleSink<O = fn() -> Stdout, E = fn() -> Stderr> {
    formatter: Formatter,
    level: Severity,
    warn_to_stderr: bool,
    stdout: O,
    stderr: E,
}

impl ConsoleSink {
    pub fn new(formatter: Formatter, level: Severity) -> Self {
        ConsoleSink {
            formatter,
            level,
            warn_to_stderr: false,
            stdout: io::stdout,
            stderr: io::stderr,
        }
    }
}

impl<O, E> ConsoleSink<O, E> {
    pub fn warn_to_stderr(mut self, enabled: bool) -> Self {
        self.warn_to_stderr = enabled;
        self
    }

    pub fn with_stdout<O2>(self, stdout: O2) -> ConsoleSink<O2, E>
    where
        O2: for<'a> MakeWriter<'a>,
    {
        ConsoleSink {
            formatter: self.formatter,
            level: self.level,
            warn_to_stderr: self.warn_to_stderr,
            stdout,
            stderr: self.stderr,
        }
    }

    pub fn with_stderr<E2>(self, stderr: E2) -> ConsoleSink<O, E2>
    where
        E2: for<'a> MakeWriter<'a>,
    {
        ConsoleSink {
            formatter: self.formatter,
            level: self.level,
            warn_to_stderr: self.warn_to_stderr,
            stdout: self.stdout,
            stderr,
        }
    }
}

fn write_line<W: Write>(mut writer: W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

impl<O, E> Sink for ConsoleSink<O, E>
where
    O: for<'a> MakeWriter<'a> + Send + Sync,
    E: for<'a> MakeWriter<'a> + Send + Sync,
{
    fn name(&self) -> &str {
        "console"
    }

    fn min_severity(&self) -> Severity {
        self.level
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.formatter.format(record)?;
        match record.level {
            Severity::Error => write_line(self.stderr.make_writer(), &line)?,
            Severity::Warn if self.warn_to_stderr => {
                write_line(self.stdout.make_writer(), &line)?;
                write_line(self.stderr.make_writer(), &line)?;
            }
            _ => write_line(self.stdout.make_writer(), &line)?,
        }
        Ok(())
    }
}
