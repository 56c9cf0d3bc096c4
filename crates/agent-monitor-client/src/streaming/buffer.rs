//! Shared, order-preserving log buffer

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of the growth notification channel
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// A change to the buffer, as seen by subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferUpdate {
    /// Text added at the end
    Appended(String),
    /// Text added at the front (paged scrollback)
    Prepended(String),
    /// No further changes will happen
    Sealed,
}

#[derive(Debug, Default)]
struct BufferState {
    text: String,
    sealed: bool,
}

/// Accumulated output of one controller epoch
///
/// Cloning shares the same buffer. The owning controller is the only writer;
/// everyone else reads snapshots or subscribes to updates. Once sealed, all
/// writes are silently discarded, so a write racing with `seal` either lands
/// before it or not at all.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    state: Arc<Mutex<BufferState>>,
    updates: broadcast::Sender<BufferUpdate>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_seed(String::new())
    }

    /// Buffer that starts with text carried over from a previous epoch
    pub fn with_seed(seed: String) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(BufferState {
                text: seed,
                sealed: false,
            })),
            updates,
        }
    }

    /// Append text; returns false if the buffer is sealed
    pub fn append(&self, chunk: &str) -> bool {
        self.write(chunk, false)
    }

    /// Insert text in front; returns false if the buffer is sealed
    pub fn prepend(&self, chunk: &str) -> bool {
        self.write(chunk, true)
    }

    fn write(&self, chunk: &str, front: bool) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }
        if chunk.is_empty() {
            return true;
        }
        let update = if front {
            state.text.insert_str(0, chunk);
            BufferUpdate::Prepended(chunk.to_string())
        } else {
            state.text.push_str(chunk);
            BufferUpdate::Appended(chunk.to_string())
        };
        // Sent under the lock so subscribers see updates in buffer order
        let _ = self.updates.send(update);
        true
    }

    /// Refuse all further writes; returns true on the first call only
    pub fn seal(&self) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }
        state.sealed = true;
        let _ = self.updates.send(BufferUpdate::Sealed);
        true
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Snapshot of the full text
    pub fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().text.is_empty()
    }

    /// Receive every update made after this call
    pub fn subscribe(&self) -> broadcast::Receiver<BufferUpdate> {
        self.updates.subscribe()
    }

    /// Run `callback` for each appended chunk until the buffer is sealed
    ///
    /// Spawns a forwarding task; must be called inside a tokio runtime.
    pub fn on_append<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let mut updates = self.subscribe();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(BufferUpdate::Appended(chunk)) => callback(&chunk),
                    Ok(BufferUpdate::Prepended(_)) => {}
                    Ok(BufferUpdate::Sealed) | Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Append listener lagged, skipped {} update(s)", skipped);
                    }
                }
            }
        })
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}
