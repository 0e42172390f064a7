//! Routes a user's messages to the invocation that prompted for them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::transfer::IncomingMessage;

/// (chat_id, user_id)
pub type PromptKey = (i64, i64);

struct Route {
    id: u64,
    tx: mpsc::UnboundedSender<IncomingMessage>,
}

/// Open inboxes, at most one per chat and user.
///
/// An inbox stays registered until it is dropped, so messages sent while the
/// invocation is busy uploading queue up instead of falling through to
/// command handling. Opening a second inbox for the same key closes the first.
#[derive(Default)]
pub struct PromptRegistry {
    routes: Mutex<HashMap<PromptKey, Route>>,
    next_id: AtomicU64,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start routing `key`'s messages into a new inbox.
    pub fn open(self: &Arc<Self>, key: PromptKey) -> PromptInbox {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.lock().insert(key, Route { id, tx }).is_some() {
            debug!(chat = key.0, user = key.1, "replaced open prompt inbox");
        }
        PromptInbox {
            registry: Arc::clone(self),
            key,
            id,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Queue `message` for the open inbox. Gives it back if there is none.
    pub fn deliver(&self, key: PromptKey, message: IncomingMessage) -> Result<(), IncomingMessage> {
        let routes = self.lock();
        match routes.get(&key) {
            Some(route) => route.tx.send(message).map_err(|e| e.0),
            None => Err(message),
        }
    }

    #[cfg(test)]
    fn is_open(&self, key: PromptKey) -> bool {
        self.lock().contains_key(&key)
    }

    fn close(&self, key: PromptKey, id: u64) {
        let mut routes = self.lock();
        if routes.get(&key).is_some_and(|r| r.id == id) {
            routes.remove(&key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PromptKey, Route>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One invocation's view of its user's messages. Unregisters on drop.
pub struct PromptInbox {
    registry: Arc<PromptRegistry>,
    key: PromptKey,
    id: u64,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<IncomingMessage>>,
}

impl PromptInbox {
    /// Oldest queued message, or the next one to arrive. `None` on timeout or
    /// when a newer inbox took over the key.
    pub async fn next(&self, timeout: Duration) -> Option<IncomingMessage> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

impl Drop for PromptInbox {
    fn drop(&mut self) {
        self.registry.close(self.key, self.id);
    }
}
