use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    ContextId, Envelope, StorageChange, StorageEvents, StoreError, TokenStore, CHANGE_CAPACITY,
};

struct Shared {
    entries: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<Envelope>,
    next_context: AtomicU64,
}

/// In-process token store shared between contexts.
///
/// Every handle belongs to one context. Clones keep the context of the
/// original; call [`MemoryTokenStore::context`] to obtain a handle whose
/// writes are visible to subscribers of this one.
#[derive(Clone)]
pub struct MemoryTokenStore {
    shared: Arc<Shared>,
    context: ContextId,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
            changes,
            next_context: AtomicU64::new(1),
        });
        Self {
            shared,
            context: ContextId(0),
        }
    }

    /// A new handle on the same storage under a fresh context.
    pub fn context(&self) -> Self {
        let id = self.shared.next_context.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: self.shared.clone(),
            context: ContextId(id),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Live change subscriptions across all contexts.
    pub fn subscriber_count(&self) -> usize {
        self.shared.changes.receiver_count()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let old_value = self
            .shared
            .entries
            .write()
            .insert(key.clone(), value.clone());
        self.notify(key, old_value, Some(value));
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let old_value = self.shared.entries.write().remove(key);
        if old_value.is_some() {
            self.notify(key.to_string(), old_value.clone(), None);
        }
        old_value
    }

    fn notify(&self, key: String, old_value: Option<String>, new_value: Option<String>) {
        if old_value == new_value {
            return;
        }
        let envelope = Envelope {
            origin: Some(self.context),
            change: StorageChange {
                key,
                old_value,
                new_value,
            },
        };
        if self.shared.changes.send(envelope).is_err() {
            debug!("no storage subscribers");
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.shared.entries.read().get(key).cloned())
    }

    fn subscribe(&self) -> StorageEvents {
        StorageEvents::new(Some(self.context), self.shared.changes.subscribe())
    }
}
