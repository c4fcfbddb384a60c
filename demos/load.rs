use sentry_log_pipeline::layer::PipelineLayer;
use sentry_log_pipeline::logger::Logger;
use sentry_log_pipeline::noop_sink::NoopSink;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

const EVENTS: u64 = 100_000;

fn main() {
    let logger = Logger::builder().sink(NoopSink).build();

    let start = Instant::now();
    for i in 0..EVENTS {
        let _ = logger.info("direct load test", i);
    }
    report("direct info", start);

    let start = Instant::now();
    for i in 0..EVENTS {
        let _ = logger.error("direct load test error", i);
    }
    report("direct error (with trace)", start);

    let subscriber = Registry::default().with(PipelineLayer::new(logger));
    tracing::subscriber::with_default(subscriber, || {
        let start = Instant::now();
        for i in 0..EVENTS {
            info!(iteration = i, "tracing load test");
        }
        report("tracing info", start);

        let start = Instant::now();
        for i in 0..EVENTS {
            error!(iteration = i, "tracing load test error");
        }
        report("tracing error (with trace)", start);
    });
}

fn report(label: &str, start: Instant) {
    let elapsed = start.elapsed();
    println!(
        "{}: {} records in {:?} (~{:.0} rec/s)",
        label,
        EVENTS,
        elapsed,
        EVENTS as f64 / elapsed.as_secs_f64()
    );
}
