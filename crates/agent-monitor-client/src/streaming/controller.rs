//! Log stream controller: one subscription, one buffer epoch

use std::sync::Arc;

use agent_monitor_core::{
    MonitorParams, PageRequest, Placement, PreconditionError, Query, StreamMode,
};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use super::buffer::LogBuffer;
use super::codec::ChunkDecoder;
use crate::config::ControllerOptions;
use crate::error::{MonitorError, Result};
use crate::fetch::{AuthorizedFetch, ChunkStream};

/// Lifecycle state of a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerStatus {
    /// Paged mode, waiting for range requests
    Idle,
    /// Streaming mode, first connection not open yet
    Connecting,
    /// Streaming connection open
    Active,
    /// Streaming connection lost, waiting to reconnect
    Reconnecting { attempt: u32 },
    /// Terminal. `error` is set when the controller stopped on its own
    Stopped { error: Option<MonitorError> },
}

impl ControllerStatus {
    pub fn is_stopped(&self) -> bool {
        matches!(self, ControllerStatus::Stopped { .. })
    }
}

/// How a streaming connection ended
enum StreamEnd {
    /// Stop was requested or the buffer was sealed
    Stopped,
    /// The connection failed or closed
    Failed(MonitorError),
}

struct ControllerInner {
    fetch: Arc<dyn AuthorizedFetch>,
    endpoint: String,
    params: MonitorParams,
    options: ControllerOptions,
    buffer: LogBuffer,
    status: watch::Sender<ControllerStatus>,
    stop: watch::Sender<bool>,
}

/// Owns exactly one subscription to the monitor endpoint
///
/// # Lifecycle
///
/// - Created by [`LogStreamController::start`]. In streaming mode this spawns
///   the background task that opens the connection and appends to the buffer.
///   In paged mode nothing is fetched until [`fetch_page`] is called.
/// - [`stop`] is terminal. A controller is never restarted; build a new one
///   seeded with this one's text instead.
/// - Dropping the controller stops it.
///
/// [`fetch_page`]: LogStreamController::fetch_page
/// [`stop`]: LogStreamController::stop
pub struct LogStreamController {
    inner: Arc<ControllerInner>,
    task: Option<JoinHandle<()>>,
}

impl LogStreamController {
    /// Create a controller and, in streaming mode, start its transfer
    ///
    /// Streaming mode spawns a task, so this must run inside a tokio runtime.
    pub fn start(
        fetch: Arc<dyn AuthorizedFetch>,
        endpoint: impl Into<String>,
        params: MonitorParams,
        seed: String,
        options: ControllerOptions,
    ) -> Self {
        let initial = match options.mode {
            StreamMode::Streaming => ControllerStatus::Connecting,
            StreamMode::Paged => ControllerStatus::Idle,
        };
        let (status, _) = watch::channel(initial);
        let (stop, stop_rx) = watch::channel(false);

        let inner = Arc::new(ControllerInner {
            fetch,
            endpoint: endpoint.into(),
            params,
            options,
            buffer: LogBuffer::with_seed(seed),
            status,
            stop,
        });

        let task = match options.mode {
            StreamMode::Streaming => {
                debug!(
                    "Starting log stream for {} at level {}",
                    inner.params.target, inner.params.log_level
                );
                Some(tokio::spawn(Arc::clone(&inner).run_stream(stop_rx)))
            }
            StreamMode::Paged => None,
        };

        Self { inner, task }
    }

    pub fn params(&self) -> &MonitorParams {
        &self.inner.params
    }

    pub fn mode(&self) -> StreamMode {
        self.inner.options.mode
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.inner.buffer
    }

    /// Snapshot of everything accumulated so far, seed included
    pub fn current_buffer(&self) -> String {
        self.inner.buffer.text()
    }

    pub fn status(&self) -> ControllerStatus {
        self.inner.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ControllerStatus> {
        self.inner.status.subscribe()
    }

    /// Terminal error, if the controller stopped on its own
    pub fn error(&self) -> Option<MonitorError> {
        match &*self.inner.status.borrow() {
            ControllerStatus::Stopped { error } => error.clone(),
            _ => None,
        }
    }

    /// Whether a streaming transfer is in progress
    pub fn is_active(&self) -> bool {
        matches!(
            *self.inner.status.borrow(),
            ControllerStatus::Active | ControllerStatus::Reconnecting { .. }
        )
    }

    /// Stop the transfer, keeping the buffer readable
    ///
    /// Returns promptly; the background task drops its connection on its
    /// own. No append is visible after this returns. Calling it again, or
    /// after the controller stopped on an error, does nothing.
    pub fn stop(&self) {
        if !self.inner.buffer.seal() {
            return;
        }
        self.inner.status.send_modify(|status| {
            if !status.is_stopped() {
                *status = ControllerStatus::Stopped { error: None };
            }
        });
        self.inner.stop.send_replace(true);
        debug!("Stopped log stream for {}", self.inner.params.target);
    }

    /// Wait until the controller is stopped, returning its terminal error
    pub async fn wait_stopped(&self) -> Option<MonitorError> {
        let mut status = self.inner.status.subscribe();
        let result = match status.wait_for(ControllerStatus::is_stopped).await {
            Ok(current) => match &*current {
                ControllerStatus::Stopped { error } => error.clone(),
                _ => None,
            },
            Err(_) => None,
        };
        result
    }

    /// Fetch one bounded range and place it in the buffer
    ///
    /// Transient failures are retried with the page retry policy; when that
    /// runs out the error is `RetryExhausted` for this range only and the
    /// buffer is untouched. An authorization failure stops the controller.
    /// Returns the number of bytes added.
    #[instrument(skip(self), fields(target = %self.inner.params.target))]
    pub async fn fetch_page(&self, page: PageRequest) -> Result<usize> {
        if self.inner.options.mode != StreamMode::Paged {
            return Err(PreconditionError::NotPaged.into());
        }
        if self.inner.buffer.is_sealed() {
            return Err(MonitorError::Cancelled);
        }

        let mut query = self.inner.base_query();
        query.extend(page.to_query());

        let policy = self.inner.options.page_retry;
        let mut attempt = 0;
        let text = loop {
            match self.inner.fetch_once(&query).await {
                Ok(text) => break text,
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    let Some(delay) = policy.delay_for(attempt) else {
                        warn!("Page fetch failed after {} attempt(s): {}", attempt, err);
                        return Err(MonitorError::RetryExhausted {
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    };
                    warn!("Page fetch failed, retrying in {:?}: {}", delay, err);
                    tokio::time::sleep(delay).await;
                }
                Err(err @ MonitorError::Authorization { .. }) => {
                    self.inner.finish(Some(err.clone()));
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        };

        let written = match page.placement {
            Placement::Prepend => self.inner.buffer.prepend(&text),
            Placement::Append => self.inner.buffer.append(&text),
        };
        if !written {
            return Err(MonitorError::Cancelled);
        }
        debug!("Loaded {} byte(s) ({:?})", text.len(), page.placement);
        Ok(text.len())
    }
}

impl Drop for LogStreamController {
    fn drop(&mut self) {
        self.stop();
        // The task exits on the stop signal; detach rather than abort
        drop(self.task.take());
    }
}

impl std::fmt::Debug for LogStreamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamController")
            .field("endpoint", &self.inner.endpoint)
            .field("params", &self.inner.params)
            .field("mode", &self.inner.options.mode)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

impl ControllerInner {
    fn base_query(&self) -> Query {
        let mut query = self.params.to_query();
        query.extend(self.options.format.query());
        query
    }

    fn set_status(&self, next: ControllerStatus) {
        self.status.send_if_modified(|status| {
            if status.is_stopped() || *status == next {
                return false;
            }
            *status = next;
            true
        });
    }

    /// Stop from inside, recording why
    fn finish(&self, error: Option<MonitorError>) {
        if !self.buffer.seal() {
            return;
        }
        self.status.send_replace(ControllerStatus::Stopped { error });
        self.stop.send_replace(true);
    }

    /// Streaming loop: connect, pump chunks, reconnect with backoff
    async fn run_stream(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let query = self.base_query();
        let policy = self.options.reconnect;
        let mut attempt = 0;

        loop {
            let connected = tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => return,
                result = self.fetch.request(&self.endpoint, &query) => result,
            };

            let failure = match connected {
                Ok(stream) => {
                    self.set_status(ControllerStatus::Active);
                    match self.pump(stream, &mut stop_rx, &mut attempt).await {
                        StreamEnd::Stopped => return,
                        StreamEnd::Failed(err) => err,
                    }
                }
                Err(err) => err,
            };

            if !failure.is_transient() {
                error!("Log stream for {} failed: {}", self.params.target, failure);
                self.finish(Some(failure));
                return;
            }

            attempt += 1;
            let Some(delay) = policy.delay_for(attempt) else {
                error!(
                    "Log stream for {}: giving up after {} attempt(s): {}",
                    self.params.target, attempt, failure
                );
                self.finish(Some(MonitorError::RetryExhausted {
                    attempts: attempt,
                    last_error: failure.to_string(),
                }));
                return;
            };

            warn!(
                "Log stream for {} interrupted, retrying in {:?} (attempt {}/{}): {}",
                self.params.target, delay, attempt, policy.max_attempts, failure
            );
            self.set_status(ControllerStatus::Reconnecting { attempt });

            tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Append chunks from one connection until it ends or stop is signalled
    ///
    /// The retry budget is restored only once the connection delivers text.
    async fn pump(
        &self,
        mut stream: ChunkStream,
        stop_rx: &mut watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> StreamEnd {
        let mut decoder = ChunkDecoder::new(self.options.format);

        loop {
            let next = tokio::select! {
                biased;
                _ = stopped(stop_rx) => return StreamEnd::Stopped,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    let text = match decoder.feed(&bytes) {
                        Ok(text) => text,
                        Err(err) => return StreamEnd::Failed(err),
                    };
                    if text.is_empty() {
                        continue;
                    }
                    // Sealed: stop won the race against this chunk
                    if !self.buffer.append(&text) {
                        return StreamEnd::Stopped;
                    }
                    *attempt = 0;
                }
                Some(Err(err)) => return StreamEnd::Failed(err),
                None => {
                    return StreamEnd::Failed(MonitorError::Network(
                        "Monitor stream closed by the agent".to_string(),
                    ))
                }
            }
        }
    }

    /// One bounded request, read to the end and decoded
    async fn fetch_once(&self, query: &[(String, String)]) -> Result<String> {
        debug!("Fetching page from {}", self.endpoint);
        let mut stream = self.fetch.request(&self.endpoint, query).await?;
        let mut decoder = ChunkDecoder::new(self.options.format);
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&decoder.feed(&chunk?)?);
        }
        decoder.finish()?;
        Ok(text)
    }
}

/// Resolves once stop has been signalled
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}
