//! Test utilities for agent-monitor-client
//!
//! [`ScriptedFetch`] is an in-process [`AuthorizedFetch`] driven by a queue of
//! scripted responses. [`TestServer`] runs an axum router on a local port for
//! tests that go through [`HttpFetch`].

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{MonitorError, Result};
use crate::fetch::{AuthorizedFetch, ChunkStream, HttpFetch};

/// One step of a scripted response body
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver a chunk
    Chunk(Bytes),
    /// Pause before the next step
    Delay(Duration),
    /// Deliver a transport error
    Fail(MonitorError),
    /// Keep the connection open forever
    Hold,
}

impl Step {
    pub fn text(text: &str) -> Self {
        Step::Chunk(Bytes::copy_from_slice(text.as_bytes()))
    }
}

enum Script {
    Reject(MonitorError),
    Respond(Vec<Step>),
    Live(mpsc::UnboundedReceiver<Result<Bytes>>),
}

/// A request seen by [`ScriptedFetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl RecordedRequest {
    /// Value of a query parameter, if present
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted mock transport
///
/// Each request pops the next script. With the queue empty, requests fail
/// with a network error.
#[derive(Default)]
pub struct ScriptedFetch {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response whose body plays `steps`, then ends
    pub fn respond(&self, steps: Vec<Step>) -> &Self {
        self.scripts.lock().push_back(Script::Respond(steps));
        self
    }

    /// Queue a request failure
    pub fn reject(&self, error: MonitorError) -> &Self {
        self.scripts.lock().push_back(Script::Reject(error));
        self
    }

    /// Queue a response fed by hand through the returned handle
    pub fn live(&self) -> LiveConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().push_back(Script::Live(rx));
        LiveConnection { tx }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl AuthorizedFetch for ScriptedFetch {
    async fn request(&self, path: &str, query: &[(String, String)]) -> Result<ChunkStream> {
        self.requests.lock().push(RecordedRequest {
            path: path.to_string(),
            query: query.to_vec(),
        });

        let script = self.scripts.lock().pop_front();
        match script {
            None => Err(MonitorError::Network("no scripted response left".to_string())),
            Some(Script::Reject(error)) => Err(error),
            Some(Script::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(Script::Respond(steps)) => Ok(play(steps)),
        }
    }
}

fn play(steps: Vec<Step>) -> ChunkStream {
    stream::unfold(steps.into_iter(), |mut steps| async move {
        loop {
            match steps.next()? {
                Step::Chunk(bytes) => return Some((Ok(bytes), steps)),
                Step::Fail(error) => return Some((Err(error), steps)),
                Step::Delay(delay) => tokio::time::sleep(delay).await,
                Step::Hold => futures::future::pending::<()>().await,
            }
        }
    })
    .boxed()
}

/// Sending side of a [`ScriptedFetch::live`] connection
#[derive(Debug, Clone)]
pub struct LiveConnection {
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

impl LiveConnection {
    /// Deliver a chunk; returns false once the controller dropped the connection
    pub fn send(&self, text: &str) -> bool {
        self.tx
            .send(Ok(Bytes::copy_from_slice(text.as_bytes())))
            .is_ok()
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub fetch: HttpFetch,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Create a new test server from an axum Router
    ///
    /// # Example
    ///
    /// ```ignore
    /// let router = axum::Router::new().route("/v1/agent/monitor", get(monitor));
    /// let server = TestServer::start(router).await?;
    ///
    /// let body = server.fetch.request("/v1/agent/monitor", &query).await?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        Self::start_with(router, HttpFetch::new).await
    }

    /// Create a new test server with a custom fetcher (e.g., with a token)
    pub async fn start_with<S, F>(router: axum::Router<S>, make_fetch: F) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
        F: FnOnce(&str) -> Result<HttpFetch>,
    {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| MonitorError::Network(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| MonitorError::Network(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        // Spawn the server
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let fetch = make_fetch(&format!("http://{}", addr))?;

        Ok(Self {
            addr,
            fetch,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_fetch_plays_steps() {
        let fetch = ScriptedFetch::new();
        fetch.respond(vec![Step::text("a"), Step::text("b")]);

        let query = vec![("log_level".to_string(), "info".to_string())];
        let body: Vec<_> = fetch
            .request("/v1/agent/monitor", &query)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(body.len(), 2);
        assert_eq!(fetch.requests()[0].param("log_level"), Some("info"));
    }

    #[tokio::test]
    async fn test_scripted_fetch_empty_queue_fails() {
        let fetch = ScriptedFetch::new();
        assert!(matches!(
            fetch.request("/x", &[]).await,
            Err(MonitorError::Network(_))
        ));
        assert_eq!(fetch.request_count(), 1);
    }
}
