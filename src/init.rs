use crate::breadcrumb::BreadcrumbSink;
use crate::config::{Config, ConfigError, Settings};
use crate::console::ConsoleSink;
use crate::format::Formatter;
use crate::guard::{ProcessGuard, SentryFlusher};
use crate::layer::PipelineLayer;
use crate::logger::{self, Logger};
use crate::sentry_sink::SentryEventSink;
use crate::severity::Severity;
use serde_json::json;
use std::borrow::Cow;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("a global logger is already installed")]
    AlreadyInitialized,

    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Keeps the pipeline alive. Dropping it flushes the Sentry client.
#[must_use]
pub struct LoggingGuard {
    logger: Logger,
    config: Arc<Config>,
    process_guard: Option<Arc<ProcessGuard>>,
    sentry_guard: Option<sentry::ClientInitGuard>,
}

impl LoggingGuard {
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn process_guard(&self) -> Option<&Arc<ProcessGuard>> {
        self.process_guard.as_ref()
    }

    pub fn reporting_enabled(&self) -> bool {
        self.sentry_guard.as_ref().is_some_and(|guard| guard.is_enabled())
    }
}

/// Assemble a logger from configuration.
///
/// Sinks, in dispatch order: Sentry events (`warn`+), Sentry breadcrumbs
/// (`info`+), both only when `reporting` is set, then the console.
pub fn build_logger(config: &Arc<Config>, is_tty: bool, reporting: bool) -> Logger {
    build_logger_with(config, is_tty, reporting, io::stdout, io::stderr)
}

/// [`build_logger`] with the console writing to `stdout` and `stderr`.
pub fn build_logger_with<O, E>(
    config: &Arc<Config>,
    is_tty: bool,
    reporting: bool,
    stdout: O,
    stderr: E,
) -> Logger
where
    O: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    E: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let settings = config.settings();
    let mut builder = Logger::builder();
    if reporting {
        builder = builder
            .sink(SentryEventSink::new(Arc::clone(config)))
            .sink(BreadcrumbSink::new(Arc::clone(config)));
    }
    let console = ConsoleSink::new(Formatter::detect(settings, is_tty), settings.log.level)
        .warn_to_stderr(settings.log.warn_to_stderr)
        .with_stdout(stdout)
        .with_stderr(stderr);
    builder.sink(console).build()
}

/// Least severe level any sink built by [`build_logger`] accepts.
pub fn pipeline_min_level(settings: &Settings) -> Severity {
    Severity::Info.min(settings.log.level)
}

/// Log the outcome of the Sentry configuration: the DSN being connected
/// to, or why error reporting is off.
pub fn announce(logger: &Logger, dsn: &Result<Option<sentry::types::Dsn>, ConfigError>) {
    let result = match dsn {
        Ok(Some(dsn)) => logger.info(&format!("Connecting to {}", dsn), ()),
        Ok(None) => Ok(()),
        Err(e) => logger.error("Error reporting disabled", json!({ "reason": e.to_string() })),
    };
    if let Err(e) = result {
        eprintln!("failed to log reporting status: {}", e);
    }
}

/// Sentry client options derived from settings.
pub fn client_options(settings: &Settings, dsn: sentry::types::Dsn) -> sentry::ClientOptions {
    let proxy = settings.proxy_address().map(|p| Cow::Owned(p.to_string()));
    sentry::ClientOptions {
        dsn: Some(dsn),
        release: settings
            .metadata
            .release
            .clone()
            .map(Cow::Owned)
            .or_else(|| sentry::release_name!()),
        environment: Some(Cow::Owned(settings.environment.level.clone())),
        debug: settings.log.sentry.debug,
        // Panics are reported by the process guard. Stacks come from the
        // record's own trace.
        default_integrations: false,
        http_proxy: proxy.clone(),
        https_proxy: proxy,
        ..Default::default()
    }
}

/// Initialize the process-wide pipeline.
///
/// **Effects**
/// - starts the Sentry client when `log.sentry.enabled` is set and the DSN
///   is valid; otherwise the problem is logged and startup continues
///   without error reporting,
/// - installs the logger returned by [`logger::global`],
/// - installs a `tracing` subscriber forwarding events into the logger,
/// - installs the [`ProcessGuard`] panic hook when `process.guard` is set.
///   The hook reports panics; only [`ProcessGuard::run`] and
///   [`ProcessGuard::spawn_watched`] end the process.
pub fn init(config: Config) -> Result<LoggingGuard, InitError> {
    let config = Arc::new(config);
    let settings = config.settings();

    let dsn = settings.sentry_dsn();
    let sentry_guard = match &dsn {
        Ok(Some(dsn)) => Some(sentry::init(client_options(settings, dsn.clone()))),
        _ => None,
    };

    let logger = build_logger(&config, io::stdout().is_terminal(), sentry_guard.is_some());
    announce(&logger, &dsn);

    logger::set_global(logger.clone()).map_err(|_| InitError::AlreadyInitialized)?;
    tracing::subscriber::set_global_default(
        Registry::default()
            .with(PipelineLayer::new(logger.clone()).with_min_level(pipeline_min_level(settings))),
    )?;

    let process_guard = settings.process.guard.then(|| {
        let guard = Arc::new(
            ProcessGuard::new(logger.clone(), Arc::new(SentryFlusher::current()))
                .with_flush_timeout(settings.process.flush_timeout()),
        );
        guard.install_panic_hook();
        guard
    });

    Ok(LoggingGuard {
        logger,
        config,
        process_guard,
        sentry_guard,
    })
}

/// [`init`] with configuration loaded by [`Config::load`].
pub fn init_from_env() -> Result<LoggingGuard, InitError> {
    init(Config::load()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dsn() -> sentry::types::Dsn {
        "https://public@sentry.example.com/42".parse().unwrap()
    }

    #[test]
    fn client_options_follow_settings() {
        let config = Config::from_json(json!({
            "environment": { "level": "staging" },
            "proxy": { "enabled": true },
            "metadata": { "release": "svc@1.2.3" },
            "log": { "sentry": { "debug": true } }
        }))
        .unwrap();

        let options = client_options(config.settings(), dsn());
        assert_eq!(options.environment.as_deref(), Some("staging"));
        assert_eq!(options.release.as_deref(), Some("svc@1.2.3"));
        assert_eq!(options.http_proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(options.https_proxy.as_deref(), Some("http://proxy:3128"));
        assert!(options.debug);
        assert!(!options.default_integrations);
    }

    #[test]
    fn no_proxy_unless_enabled() {
        let options = client_options(&Settings::default(), dsn());
        assert!(options.http_proxy.is_none());
        assert!(options.https_proxy.is_none());
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn lines(&self) -> Vec<serde_json::Value> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn console_logger(config: Config) -> (Logger, Buffer, Buffer) {
        let (out, err) = (Buffer::default(), Buffer::default());
        let (o, e) = (out.clone(), err.clone());
        let logger = build_logger_with(&Arc::new(config), false, false, move || o.clone(), move || e.clone());
        (logger, out, err)
    }

    #[test]
    fn valid_dsn_announces_the_connection() {
        let config = Config::from_json(json!({
            "log": { "sentry": { "enabled": true, "dsn": "https://public@sentry.example.com/42" } }
        }))
        .unwrap();
        let dsn = config.settings().sentry_dsn();
        let (logger, out, err) = console_logger(config);

        announce(&logger, &dsn);

        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        let message = lines[0]["message"].as_str().unwrap();
        assert!(message.starts_with("Connecting to https://public@sentry.example.com"), "got {}", message);
        assert!(err.lines().is_empty());
    }

    #[test]
    fn configuration_problems_are_logged_and_startup_goes_on() {
        for dsn in [json!(null), json!("not a dsn")] {
            let config = Config::from_json(json!({ "log": { "sentry": { "enabled": true, "dsn": dsn } } }))
                .unwrap();
            let status = config.settings().sentry_dsn();
            assert!(status.is_err());
            let (logger, out, err) = console_logger(config);

            announce(&logger, &status);

            assert!(out.lines().is_empty());
            let lines = err.lines();
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0]["message"], json!("Error reporting disabled"));
            assert_eq!(lines[0]["level"], json!("error"));
            assert!(lines[0]["reason"].as_str().is_some_and(|r| !r.is_empty()));
        }
    }

    #[test]
    fn reporting_off_announces_nothing() {
        let config = Config::default();
        let status = config.settings().sentry_dsn();
        let (logger, out, err) = console_logger(config);
        announce(&logger, &status);
        assert!(out.lines().is_empty());
        assert!(err.lines().is_empty());
    }

    #[test]
    fn layer_floor_is_the_most_permissive_sink() {
        let mut settings = Settings::default();
        assert_eq!(pipeline_min_level(&settings), Severity::Info);
        settings.log.level = Severity::Error;
        assert_eq!(pipeline_min_level(&settings), Severity::Info);
        settings.log.level = Severity::Debug;
        assert_eq!(pipeline_min_level(&settings), Severity::Debug);
    }

    #[test]
    fn reporting_adds_sentry_sinks_first() {
        let config = Arc::new(Config::default());
        assert_eq!(build_logger(&config, false, false).sink_names(), vec!["console"]);
        assert_eq!(
            build_logger(&config, false, true).sink_names(),
            vec!["sentry-events", "sentry-breadcrumbs", "console"]
        );
    }
}
