//! Walks through the common logging calls against a configured pipeline.
//!
//! Run with `APP_LOG__SENTRY__ENABLED=true APP_LOG__SENTRY__DSN=<dsn>` to
//! see the warnings and errors arrive in Sentry.

use sentry_log_pipeline::init::init_from_env;
use sentry_log_pipeline::trace::CapturedTrace;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("worker gave up after {0} attempts")]
struct WorkerError(u32);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = init_from_env()?;
    let log = pipeline.logger();

    log.info("Test Info", json!({ "some": "data" }))?;
    log.warn("Test Warn", json!({ "test": "testing" }))?;
    log.error("Error Test", json!({ "some": "Stuff" }))?;

    let err = std::io::Error::new(std::io::ErrorKind::Other, "Test Exception");
    log.error(
        "Passed Exception",
        json!({ "trace": CapturedTrace::from_error(&err) }),
    )?;

    if let Err(e) = serde_json::from_str::<serde_json::Value>("this will fail to parse{}[][[]") {
        log.error("Failed something", json!({ "trace": CapturedTrace::from_error(&e) }))?;
    }

    tracing::warn!(user_id = 42, "tracing events share the pipeline");

    if let Some(guard) = pipeline.process_guard() {
        let watched = guard.spawn_watched(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<(), _>(WorkerError(3))
        });
        watched.await?;
    }

    Ok(())
}
