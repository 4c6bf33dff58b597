//! Asynchronous operation waiter
//!
//! The only place commands wait on long-running API work. Both variants
//! draw a one-line indicator on stderr with the elapsed time, and neither
//! imposes a timeout: the futures are expected to observe the context's
//! cancellation token themselves.

use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::error::CliError;
use crate::state::{Context, SharedWriter};

/// Fan-out concurrency bound.
pub const MAX_CONCURRENT_OPERATIONS: usize = 10;

const TICK: Duration = Duration::from_millis(100);
const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Run one operation behind a progress indicator.
pub async fn decorate_async_operation<T, F>(
    ctx: &Context,
    message: &str,
    operation: F,
) -> Result<T, CliError>
where
    F: Future<Output = Result<T, CliError>>,
{
    let indicator = Indicator::start(ctx, message, None);
    let result = operation.await;
    indicator.finish();
    result
}

/// Run up to [`MAX_CONCURRENT_OPERATIONS`] operations at a time behind a
/// single counting indicator.
///
/// Every failure is collected; completion order is not preserved.
pub async fn decorate_async_operations<I, F>(
    ctx: &Context,
    message: &str,
    operations: I,
) -> Result<(), CliError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<(), CliError>>,
{
    let operations: Vec<F> = operations.into_iter().collect();
    let indicator = Indicator::start(ctx, message, Some(operations.len()));

    let errors: Vec<CliError> = stream::iter(operations.into_iter().map(|op| {
        let indicator = &indicator;
        async move {
            let result = op.await;
            indicator.inc();
            result
        }
    }))
    .buffer_unordered(MAX_CONCURRENT_OPERATIONS)
    .filter_map(|result| async move { result.err() })
    .collect()
    .await;

    indicator.finish();
    CliError::aggregate(errors)
}

// ============ Indicator ============

struct Progress {
    message: String,
    started: Instant,
    done: AtomicUsize,
    total: Option<usize>,
}

impl Progress {
    fn line(&self, symbol: &str) -> String {
        let mut line = format!(
            "{symbol} {} {}",
            self.message,
            format_elapsed(self.started.elapsed())
        );
        if let Some(total) = self.total {
            line.push_str(&format!(" [{}/{}]", self.done.load(Ordering::SeqCst), total));
        }
        line
    }
}

struct Indicator {
    progress: Arc<Progress>,
    out: Option<SharedWriter>,
    live: bool,
    ticker: Option<tokio::task::JoinHandle<()>>,
}

impl Indicator {
    fn start(ctx: &Context, message: &str, total: Option<usize>) -> Self {
        let progress = Arc::new(Progress {
            message: message.to_string(),
            started: Instant::now(),
            done: AtomicUsize::new(0),
            total,
        });

        // Quiet mode discards the indicator entirely.
        let out = (!ctx.quiet()).then(|| ctx.stderr());
        let live = out.is_some() && ctx.state().stderr_is_term;

        let ticker = match (&out, live) {
            (Some(out), true) => {
                let mut out = out.clone();
                let progress = progress.clone();
                Some(tokio::spawn(async move {
                    let mut frame = 0usize;
                    let mut interval = tokio::time::interval(TICK);
                    loop {
                        interval.tick().await;
                        let _ = write!(
                            out,
                            "\r\x1b[2K{}",
                            progress.line(SPINNER[frame % SPINNER.len()])
                        );
                        let _ = out.flush();
                        frame += 1;
                    }
                }))
            }
            _ => None,
        };

        tracing::debug!(message, ?total, "waiting on operation");
        Self {
            progress,
            out,
            live,
            ticker,
        }
    }

    fn inc(&self) {
        self.progress.done.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(out) = self.out.as_mut() {
            let clear = if self.live { "\r\x1b[2K" } else { "" };
            let done = console::style("✔").for_stderr().green();
            let _ = writeln!(out, "{clear}{}", self.progress.line(&done.to_string()));
            let _ = out.flush();
        }
    }
}

impl Drop for Indicator {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// `1h2m3s` style, rounded to the second.
pub fn format_elapsed(d: Duration) -> String {
    let secs = (d.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}
