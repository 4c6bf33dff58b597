//! Process-wide state and the per-invocation context

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigDir, Profile};
use crate::error::{CliError, SdkResultExt};
use crate::output::OutputFormat;
use crate::sdk::{self, ComputeApi, SdkError};

/// Settings resolved once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct GlobalState {
    pub output_format: OutputFormat,
    pub output_template: Option<String>,
    pub quiet: bool,
    pub config_dir: ConfigDir,
    pub profile: Profile,
    pub stderr_is_term: bool,
}

// ============ Streams ============

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable handle on an output stream.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new(w: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(w))))
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        lock(&self.0).write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.0).flush()
    }
}

/// Cloneable handle on the input stream.
#[derive(Clone)]
pub struct SharedReader(Arc<Mutex<Box<dyn BufRead + Send>>>);

impl SharedReader {
    pub fn new(r: impl BufRead + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(r))))
    }

    pub fn stdin() -> Self {
        Self::new(io::BufReader::new(io::stdin()))
    }

    /// Read one line; an empty string means end of input.
    pub fn read_line(&self) -> io::Result<String> {
        let mut line = String::new();
        lock(&self.0).read_line(&mut line)?;
        Ok(line)
    }
}

#[derive(Clone)]
pub struct Streams {
    pub stdout: SharedWriter,
    pub stderr: SharedWriter,
    pub stdin: SharedReader,
}

impl Streams {
    pub fn process() -> Self {
        Self {
            stdout: SharedWriter::stdout(),
            stderr: SharedWriter::stderr(),
            stdin: SharedReader::stdin(),
        }
    }
}

/// In-memory sink, handy to assert on what a command printed.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }

    pub fn writer(&self) -> SharedWriter {
        SharedWriter::new(self.clone())
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============ Context ============

/// Everything a command sees during one invocation.
#[derive(Clone)]
pub struct Context {
    state: Arc<GlobalState>,
    client: Arc<dyn ComputeApi>,
    cancel: CancellationToken,
    deadline: Arc<Mutex<Instant>>,
    streams: Streams,
}

impl Context {
    /// The ambient deadline starts at the profile's client timeout.
    pub fn new(state: GlobalState, client: Arc<dyn ComputeApi>) -> Self {
        let deadline = Instant::now() + state.profile.client_timeout();
        Self {
            state: Arc::new(state),
            client,
            cancel: CancellationToken::new(),
            deadline: Arc::new(Mutex::new(deadline)),
            streams: Streams::process(),
        }
    }

    /// Share `cancel` with something outside the context, such as the
    /// signal handler or the HTTP client.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_streams(mut self, streams: Streams) -> Self {
        self.streams = streams;
        self
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn quiet(&self) -> bool {
        self.state.quiet
    }

    pub fn client(&self) -> &Arc<dyn ComputeApi> {
        &self.client
    }

    /// Client bound to `zone`'s endpoint.
    pub async fn zone_client(&self, zone: &str) -> Result<Arc<dyn ComputeApi>, CliError> {
        if self.client.zone() == Some(zone) {
            return Ok(self.client.clone());
        }
        self.call(self.client.in_zone(zone))
            .await
            .sdk_context(format!("unable to switch to zone {zone}"))
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Await an SDK call, giving up with [`SdkError::Cancelled`] as soon as
    /// the invocation is cancelled.
    pub async fn call<T, F>(&self, call: F) -> Result<T, SdkError>
    where
        F: Future<Output = Result<T, SdkError>>,
    {
        sdk::cancellable(&self.cancel, call).await
    }

    /// Fill an unset zone from the active profile.
    pub fn default_zone(&self, zone: &mut String) -> Result<(), CliError> {
        if zone.is_empty() {
            if let Some(default) = &self.state.profile.default_zone {
                zone.clone_from(default);
            }
        }
        if zone.is_empty() {
            return Err(CliError::Usage(
                "no zone specified: use --zone or set default_zone in your profile".into(),
            ));
        }
        Ok(())
    }

    /// Push the deadline to at least `by` from now. Never shortens it.
    pub fn extend_deadline(&self, by: Duration) {
        let candidate = Instant::now() + by;
        let mut deadline = lock(&self.deadline);
        if candidate > *deadline {
            tracing::debug!(?by, "extending invocation deadline");
            *deadline = candidate;
        }
    }

    pub fn deadline(&self) -> Instant {
        *lock(&self.deadline)
    }

    /// Cancel the context once the deadline passes. Dropping the guard
    /// disarms it.
    pub(crate) fn arm_deadline(&self) -> DeadlineGuard {
        let ctx = self.clone();
        let task = tokio::spawn(async move {
            loop {
                let deadline = ctx.deadline();
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => {}
                }
                if ctx.deadline() <= Instant::now() {
                    tracing::warn!("invocation deadline reached, cancelling");
                    ctx.cancel.cancel();
                    return;
                }
            }
        });
        DeadlineGuard(task)
    }

    pub fn stdout(&self) -> SharedWriter {
        self.streams.stdout.clone()
    }

    pub fn stderr(&self) -> SharedWriter {
        self.streams.stderr.clone()
    }

    pub fn stdin(&self) -> SharedReader {
        self.streams.stdin.clone()
    }
}

pub(crate) struct DeadlineGuard(tokio::task::JoinHandle<()>);

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
