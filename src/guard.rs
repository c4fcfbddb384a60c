use crate::logger::Logger;
use crate::severity::Severity;
use crate::trace::CapturedTrace;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::error::Error;
use std::future::Future;
use std::panic::{AssertUnwindSafe, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Once};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Exit status used after an unhandled failure.
pub const EXIT_FAILURE: i32 = 1;

/// Default bounded wait for pending submissions before exiting.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

static PANIC_HOOK: Once = Once::new();

/// Something that can push out pending reports within a deadline.
pub trait Flush: Send + Sync {
    /// Returns `true` when everything pending was delivered in time.
    fn flush(&self, timeout: Duration) -> bool;
}

/// Flushes the Sentry client bound to the hub that was current when the
/// flusher was created. The client stays usable afterwards.
#[derive(Clone, Default)]
pub struct SentryFlusher {
    client: Option<Arc<sentry::Client>>,
}

impl SentryFlusher {
    pub fn current() -> Self {
        Self {
            client: sentry::Hub::current().client(),
        }
    }
}

impl Flush for SentryFlusher {
    fn flush(&self, timeout: Duration) -> bool {
        match &self.client {
            Some(client) => client.flush(Some(timeout)),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Watching for unhandled failures.
    Armed,
    /// A failure was handled, the process is on its way out.
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The flusher returned before the deadline with its own result.
    Completed(bool),
    /// The deadline passed first.
    TimedOut,
}

/// Last line of defence for failures nobody handled.
///
/// A failure is unhandled when a task started with [`spawn_watched`] or
/// the closure given to [`run`] ends in `Err` or a panic. On the first one
/// the guard logs it at `error`, waits at most `flush_timeout` for pending
/// reports and exits with [`EXIT_FAILURE`]. Later failures are ignored.
///
/// Panics seen by the hook from [`install_panic_hook`] are only reported
/// and flushed: the hook runs before unwinding and cannot tell whether a
/// caller will catch the panic.
///
/// [`spawn_watched`]: ProcessGuard::spawn_watched
/// [`run`]: ProcessGuard::run
/// [`install_panic_hook`]: ProcessGuard::install_panic_hook
pub struct ProcessGuard {
    logger: Logger,
    flusher: Arc<dyn Flush>,
    flush_timeout: Duration,
    terminating: AtomicBool,
    exit: Arc<dyn Fn(i32) + Send + Sync>,
}

impl ProcessGuard {
    pub fn new(logger: Logger, flusher: Arc<dyn Flush>) -> Self {
        Self {
            logger,
            flusher,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            terminating: AtomicBool::new(false),
            exit: Arc::new(|code| std::process::exit(code)),
        }
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Replace `std::process::exit`.
    pub fn with_exit<F>(mut self, exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit = Arc::new(exit);
        self
    }

    pub fn state(&self) -> GuardState {
        if self.terminating.load(Ordering::SeqCst) {
            GuardState::Terminating
        } else {
            GuardState::Armed
        }
    }

    /// Handle an unhandled failure. Returns `None` when the guard was
    /// already terminating.
    pub fn on_unhandled(&self, failure: &str, trace: Option<CapturedTrace>) -> Option<FlushOutcome> {
        if self.terminating.swap(true, Ordering::SeqCst) {
            return None;
        }
        let outcome = self.report_and_flush("Unhandled failure", failure, trace);
        (self.exit)(EXIT_FAILURE);
        Some(outcome)
    }

    /// Report a panic and flush, without exiting. Returns `None` when the
    /// guard is already terminating.
    pub fn on_panic(&self, failure: &str, trace: Option<CapturedTrace>) -> Option<FlushOutcome> {
        if self.terminating.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.report_and_flush("Panic", failure, trace))
    }

    fn report_and_flush(&self, message: &str, failure: &str, trace: Option<CapturedTrace>) -> FlushOutcome {
        self.report(Severity::Error, message, json!({ "failure": failure, "trace": trace }));
        self.report(Severity::Info, "Flushing Sentry...", ());
        let outcome = self.bounded_flush();
        match outcome {
            FlushOutcome::Completed(_) => self.report(Severity::Info, "Sentry flush complete.", ()),
            FlushOutcome::TimedOut => self.report(
                Severity::Info,
                "Sentry flush timed out",
                json!({ "timeout_ms": self.flush_timeout.as_millis() as u64 }),
            ),
        }
        outcome
    }

    fn report<T: Serialize>(&self, level: Severity, message: &str, data: T) {
        if let Err(e) = self.logger.log(level, message, data) {
            eprintln!("failed to log `{}`: {}", message, e);
        }
    }

    // The flush runs on its own thread so the deadline holds even when the
    // flusher never returns.
    fn bounded_flush(&self) -> FlushOutcome {
        let (tx, rx) = mpsc::channel();
        let flusher = Arc::clone(&self.flusher);
        let timeout = self.flush_timeout;
        let spawned = std::thread::Builder::new()
            .name("log-flush".to_string())
            .spawn(move || {
                let _ = tx.send(flusher.flush(timeout));
            });
        if spawned.is_err() {
            return FlushOutcome::Completed(self.flusher.flush(timeout));
        }
        match rx.recv_timeout(timeout) {
            Ok(delivered) => FlushOutcome::Completed(delivered),
            Err(_) => FlushOutcome::TimedOut,
        }
    }

    /// Report panics through the guard. Registered once per process; later
    /// calls are no-ops. The previously installed hook still runs first.
    pub fn install_panic_hook(self: &Arc<Self>) {
        let guard = Arc::clone(self);
        PANIC_HOOK.call_once(move || {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                previous(info);
                let trace = CapturedTrace {
                    name: "panic".to_string(),
                    ..CapturedTrace::capture()
                };
                guard.on_panic(&describe_panic(info), Some(trace));
            }));
        });
    }

    /// Spawn a task whose error or panic, if nobody handles it, takes the
    /// process down through the guard. A cancelled task is not a failure.
    pub fn spawn_watched<F, E>(self: &Arc<Self>, future: F) -> JoinHandle<Option<FlushOutcome>>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let guard = Arc::clone(self);
        let task = tokio::spawn(future);
        tokio::spawn(async move {
            let (failure, trace) = match task.await {
                Ok(Ok(())) => return None,
                Ok(Err(err)) => error_failure(&err),
                Err(join) if join.is_panic() => panic_failure(join.into_panic().as_ref()),
                Err(_) => return None,
            };
            tokio::task::spawn_blocking(move || guard.on_unhandled(&failure, Some(trace)))
                .await
                .ok()
                .flatten()
        })
    }

    /// Run the body of `main` under the guard.
    ///
    /// Returns the closure's value, or `None` after an `Err` or a panic was
    /// handed to [`on_unhandled`](ProcessGuard::on_unhandled).
    pub fn run<F, T, E>(&self, body: F) -> Option<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error,
    {
        let (failure, trace) = match std::panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => error_failure(&err),
            Err(payload) => panic_failure(payload.as_ref()),
        };
        self.on_unhandled(&failure, Some(trace));
        None
    }
}

fn error_failure<E: Error + ?Sized>(err: &E) -> (String, CapturedTrace) {
    let trace = CapturedTrace::from_error(err);
    let failure = trace.message.clone().unwrap_or_else(|| err.to_string());
    (failure, trace)
}

// The stack is gone once the panic unwound; the hook already reported it.
fn panic_failure(payload: &(dyn Any + Send)) -> (String, CapturedTrace) {
    let failure = format!("panicked: {}", describe_payload(payload));
    let trace = CapturedTrace {
        name: "panic".to_string(),
        message: Some(failure.clone()),
        frames: Vec::new(),
    };
    (failure, trace)
}

fn describe_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn describe_panic(info: &PanicHookInfo<'_>) -> String {
    let payload = describe_payload(info.payload());
    match info.location() {
        Some(location) => format!("panicked at {}:{}: {}", location.file(), location.line(), payload),
        None => format!("panicked: {}", payload),
    }
}
