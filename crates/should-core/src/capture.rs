//! Per-invocation capture of log records and printed output.
//!
//! A [`CaptureContext`] owns interception for exactly one checked call.
//!
//! - **Logs**: every context builds its own `tracing` dispatcher (a registry
//!   with a [`CaptureLayer`]) and installs it as the *scoped* default for the
//!   duration of the call. Sync calls use `tracing::dispatcher::set_default`,
//!   async calls use [`WithSubscriber`], which re-installs the dispatcher on
//!   every poll. The global subscriber is never touched.
//! - **Printed output**: Rust's `print!` cannot be redirected, so captured
//!   text goes through [`stdout()`] or the [`cprint!`](crate::cprint) /
//!   [`cprintln!`](crate::cprintln) macros. Writes land in the sink of the
//!   current logical task, which is a task-local set around each poll of an
//!   async scope and a thread-local slot for the extent of a sync call.
//!   Outside any capture the text goes to the real process stdout.
//!
//! # Isolation Contract
//! Two invocations never share a sink. Overlapping async checks joined on one
//! task are attributed per poll; sync checks on parallel threads are
//! attributed per thread. Output from threads or tasks *spawned* by the
//! wrapped function is outside the invocation and is not captured.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::{EnvFilter, Registry};

use crate::evidence::{CapturedOutput, LogEntry};

/// Errors raised while attaching a capture.
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },
}

/// Capture settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// `EnvFilter` directive for captured log records
    pub log_level: String,

    /// Also forward captured printed text to the real stdout
    pub echo_stdout: bool,

    /// Also format captured log records to the test output
    pub echo_logs: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            echo_stdout: false,
            echo_logs: false,
        }
    }
}

tokio::task_local! {
    static ACTIVE_SINK: Arc<Sink>;
}

#[derive(Debug, Default)]
struct SinkState {
    logs: Vec<LogEntry>,
    stdout: Vec<String>,
    /// Text written since the last newline
    partial: String,
}

#[derive(Debug)]
struct Sink {
    state: Mutex<SinkState>,
    echo_stdout: bool,
}

impl Sink {
    fn new(echo_stdout: bool) -> Self {
        Self {
            state: Mutex::new(SinkState::default()),
            echo_stdout,
        }
    }

    fn record_log(&self, entry: LogEntry) {
        self.state.lock().logs.push(entry);
    }

    fn write_text(&self, text: &str) {
        let mut state = self.state.lock();
        state.partial.push_str(text);
        while let Some(pos) = state.partial.find('\n') {
            let line: String = state.partial.drain(..=pos).collect();
            push_line(&mut state.stdout, &line);
        }
    }

    fn finish(&self) -> CapturedOutput {
        let mut state = self.state.lock();
        let rest = std::mem::take(&mut state.partial);
        push_line(&mut state.stdout, &rest);
        CapturedOutput {
            logs: std::mem::take(&mut state.logs),
            stdout: std::mem::take(&mut state.stdout),
        }
    }
}

fn push_line(lines: &mut Vec<String>, line: &str) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_string());
    }
}

fn active_sink() -> Option<Arc<Sink>> {
    ACTIVE_SINK.try_with(Arc::clone).ok()
}

/// Whether the current logical task is inside an active capture.
pub fn is_capturing() -> bool {
    active_sink().is_some()
}

/// Layer that records every enabled event into one invocation's sink.
struct CaptureLayer {
    sink: Arc<Sink>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.sink.record_log(LogEntry {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
            timestamp: Utc::now(),
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

fn build_dispatch(sink: &Arc<Sink>, config: &CaptureConfig) -> Result<Dispatch, CaptureError> {
    let filter =
        EnvFilter::try_new(&config.log_level).map_err(|e| CaptureError::InvalidFilter {
            directive: config.log_level.clone(),
            message: e.to_string(),
        })?;

    let echo = config
        .echo_logs
        .then(|| tracing_subscriber::fmt::layer().with_test_writer());

    let subscriber = Registry::default()
        .with(filter)
        .with(CaptureLayer {
            sink: Arc::clone(sink),
        })
        .with(echo);

    Ok(Dispatch::new(subscriber))
}

/// Interception state for one invocation.
///
/// Open it, run the wrapped code inside [`run`](Self::run) or
/// [`scope`](Self::scope), then [`close`](Self::close) it to take the
/// captured output. Dropping the context without closing simply discards
/// what was captured.
pub struct CaptureContext {
    sink: Arc<Sink>,
    dispatch: Dispatch,
}

impl fmt::Debug for CaptureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureContext")
            .field("echo_stdout", &self.sink.echo_stdout)
            .finish_non_exhaustive()
    }
}

impl CaptureContext {
    /// Prepare a capture. Fails only if the configuration is unusable.
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let sink = Arc::new(Sink::new(config.echo_stdout));
        let dispatch = build_dispatch(&sink, config)?;
        Ok(Self { sink, dispatch })
    }

    /// Run a synchronous call with capture attached.
    ///
    /// Both the dispatcher and the printed-output sink are restored when `f`
    /// returns or unwinds.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _dispatch = tracing::dispatcher::set_default(&self.dispatch);
        ACTIVE_SINK.sync_scope(Arc::clone(&self.sink), f)
    }

    /// Wrap a future so that capture is attached whenever it is polled.
    ///
    /// The returned future owns everything it needs; dropping it mid-flight
    /// detaches capture together with the inner future.
    pub fn scope<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        ACTIVE_SINK.scope(
            Arc::clone(&self.sink),
            fut.with_subscriber(self.dispatch.clone()),
        )
    }

    /// Detach and take everything captured so far.
    ///
    /// A trailing line without a newline is included.
    pub fn close(self) -> CapturedOutput {
        self.sink.finish()
    }
}

/// Capture-aware stdout handle.
///
/// Obtain one with [`stdout()`]. It is cheap and stateless; create a fresh
/// one per write.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStdout {
    _private: (),
}

/// Handle for printing text that a surrounding check can observe.
pub fn stdout() -> CaptureStdout {
    CaptureStdout { _private: () }
}

impl Write for CaptureStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match active_sink() {
            Some(sink) => {
                sink.write_text(&String::from_utf8_lossy(buf));
                if sink.echo_stdout {
                    io::stdout().write_all(buf)?;
                }
                Ok(buf.len())
            }
            None => io::stdout().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// `print!` through the capture-aware stdout.
#[macro_export]
macro_rules! cprint {
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        let _ = ::std::write!($crate::capture::stdout(), $($arg)*);
    }};
}

/// `println!` through the capture-aware stdout.
#[macro_export]
macro_rules! cprintln {
    () => {
        $crate::cprint!("\n")
    };
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        let _ = ::std::writeln!($crate::capture::stdout(), $($arg)*);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_run_captures_logs_and_lines() {
        let capture = CaptureContext::open(&CaptureConfig::default()).unwrap();

        let value = capture.run(|| {
            tracing::info!(order_id = 17, "order created");
            crate::cprintln!("registering user: {}", "ada");
            crate::cprint!("partial ");
            crate::cprint!("line");
            5
        });
        let captured = capture.close();

        assert_eq!(value, 5);
        assert_eq!(captured.logs.len(), 1);
        assert_eq!(captured.logs[0].level, "INFO");
        assert_eq!(captured.logs[0].message, "order created");
        assert_eq!(captured.logs[0].fields.get("order_id").map(String::as_str), Some("17"));
        assert_eq!(captured.stdout, vec!["registering user: ada", "partial line"]);
    }

    #[test]
    fn test_level_filter_applies() {
        let capture = CaptureContext::open(&CaptureConfig::default()).unwrap();
        capture.run(|| {
            tracing::debug!("too chatty");
            tracing::warn!("kept");
        });
        let captured = capture.close();

        let messages: Vec<_> = captured.logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["kept"]);
    }

    #[test]
    fn test_debug_level_config_keeps_debug_records() {
        let config = CaptureConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };
        let capture = CaptureContext::open(&config).unwrap();
        capture.run(|| tracing::debug!("now visible"));
        assert_eq!(capture.close().logs.len(), 1);
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = CaptureConfig {
            log_level: "orders=loudest".to_string(),
            ..Default::default()
        };
        let err = CaptureContext::open(&config).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFilter { .. }));
        assert!(err.to_string().contains("orders=loudest"));
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let capture = CaptureContext::open(&CaptureConfig::default()).unwrap();
        capture.run(|| {
            crate::cprintln!();
            crate::cprintln!("   ");
            crate::cprintln!("  padded  ");
        });
        assert_eq!(capture.close().stdout, vec!["padded"]);
    }

    #[test]
    fn test_capture_detached_after_run_and_on_panic() {
        let capture = CaptureContext::open(&CaptureConfig::default()).unwrap();
        assert!(!is_capturing());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            capture.run(|| {
                assert!(is_capturing());
                tracing::error!("about to fail");
                panic!("boom");
            })
        }));
        assert!(result.is_err());
        assert!(!is_capturing());

        // Nothing after the scope reaches the closed-over sink.
        tracing::error!("outside");
        crate::cprintln!("outside");

        let captured = capture.close();
        assert_eq!(captured.logs.len(), 1);
        assert!(captured.stdout.is_empty());
    }

    #[test]
    fn test_parallel_threads_are_isolated() {
        let outputs: Vec<CapturedOutput> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    s.spawn(move || {
                        let capture = CaptureContext::open(&CaptureConfig::default()).unwrap();
                        capture.run(|| {
                            for _ in 0..20 {
                                tracing::info!("marker-{}", i);
                                crate::cprintln!("line-{}", i);
                            }
                        });
                        capture.close()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (i, captured) in outputs.iter().enumerate() {
            assert_eq!(captured.logs.len(), 20);
            assert!(captured.logs.iter().all(|l| l.message == format!("marker-{}", i)));
            assert!(captured.stdout.iter().all(|l| *l == format!("line-{}", i)));
        }
    }

    async fn chatty(marker: &'static str) -> &'static str {
        for _ in 0..3 {
            tracing::info!("{}", marker);
            tokio::task::yield_now().await;
            crate::cprintln!("{}", marker);
            tokio::task::yield_now().await;
        }
        marker
    }

    #[tokio::test]
    async fn test_interleaved_async_scopes_are_isolated() {
        let a = CaptureContext::open(&CaptureConfig::default()).unwrap();
        let b = CaptureContext::open(&CaptureConfig::default()).unwrap();

        let (ra, rb) = tokio::join!(a.scope(chatty("alpha")), b.scope(chatty("beta")));
        assert_eq!((ra, rb), ("alpha", "beta"));

        let (a, b) = (a.close(), b.close());
        assert_eq!(a.logs.len(), 3);
        assert_eq!(b.logs.len(), 3);
        assert!(a.logs.iter().all(|l| l.message == "alpha"));
        assert!(b.logs.iter().all(|l| l.message == "beta"));
        assert_eq!(a.stdout, vec!["alpha"; 3]);
        assert_eq!(b.stdout, vec!["beta"; 3]);
    }

    #[tokio::test]
    async fn test_dropped_scope_releases_capture() {
        let capture = CaptureContext::open(&CaptureConfig::default()).unwrap();
        let pending = capture.scope(async {
            crate::cprintln!("started");
            std::future::pending::<()>().await;
        });

        // Poll once, then abandon the future.
        let _ = tokio::time::timeout(std::time::Duration::from_millis(5), pending).await;
        assert!(!is_capturing());

        crate::cprintln!("after cancellation");
        assert_eq!(capture.close().stdout, vec!["started"]);
    }
}
