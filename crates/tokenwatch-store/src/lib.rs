//! Persistent key-value storage for tokens and its change notifications.
//!
//! Change notifications mirror browser storage events: a subscriber only hears
//! about writes made through a *different* store context. Writes made through
//! the subscriber's own context are silent.

mod file;
mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

/// Default key under which the access token is stored.
pub const ACCESS_TOKEN_KEY: &str = "authToken";
/// Default key under which the refresh token is stored.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

pub(crate) const CHANGE_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse token store: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("token store must be a json object")]
    NotAnObject,
}

/// A single key mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Identifies the context a write was made through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u64);

#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    /// `None` for writes from outside the process.
    pub(crate) origin: Option<ContextId>,
    pub(crate) change: StorageChange,
}

/// Read access to the token store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Subscribe to writes made through other contexts.
    fn subscribe(&self) -> StorageEvents;
}

/// Stream of [`StorageChange`] notifications for one subscriber.
pub struct StorageEvents {
    context: Option<ContextId>,
    rx: broadcast::Receiver<Envelope>,
}

impl StorageEvents {
    pub(crate) fn new(context: Option<ContextId>, rx: broadcast::Receiver<Envelope>) -> Self {
        Self { context, rx }
    }

    /// Wait for the next foreign write; `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => {
                    if envelope.origin.is_some() && envelope.origin == self.context {
                        continue;
                    }
                    return Some(envelope.change);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "storage change subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
