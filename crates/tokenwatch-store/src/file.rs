use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::{Envelope, StorageChange, StorageEvents, StoreError, TokenStore, CHANGE_CAPACITY};

/// Token store backed by a JSON object file, e.g.
/// `{"authToken": "...", "refreshToken": "..."}`.
///
/// This process never writes the file, so every change the watcher detects is
/// reported as a write from another context.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    changes: broadcast::Sender<Envelope>,
}

impl FileTokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            path: path.as_ref().to_path_buf(),
            changes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every string entry. A missing file is an empty store.
    pub async fn entries(&self) -> Result<HashMap<String, String>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(HashMap::new());
        }

        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map
                .into_iter()
                .filter_map(|(key, value)| match value {
                    Value::String(token) => Some((key, token)),
                    _ => None,
                })
                .collect()),
            _ => Err(StoreError::NotAnObject),
        }
    }

    /// Poll the file every `interval` and publish one change per differing key.
    ///
    /// The first successful read sets the baseline and publishes nothing.
    pub fn spawn_watcher(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous: Option<HashMap<String, String>> = None;
            loop {
                ticker.tick().await;
                let current = match store.entries().await {
                    Ok(current) => current,
                    Err(error) => {
                        warn!(path = %store.path.display(), %error, "failed to poll token store");
                        continue;
                    }
                };
                if let Some(previous) = &previous {
                    store.publish_diff(previous, &current);
                }
                previous = Some(current);
            }
        })
    }

    fn publish_diff(&self, previous: &HashMap<String, String>, current: &HashMap<String, String>) {
        let keys: BTreeSet<&String> = previous.keys().chain(current.keys()).collect();
        for key in keys {
            let old_value = previous.get(key);
            let new_value = current.get(key);
            if old_value == new_value {
                continue;
            }
            debug!(%key, "token store entry changed on disk");
            let envelope = Envelope {
                origin: None,
                change: StorageChange {
                    key: key.clone(),
                    old_value: old_value.cloned(),
                    new_value: new_value.cloned(),
                },
            };
            // no subscribers is fine
            let _ = self.changes.send(envelope);
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().await?.remove(key))
    }

    fn subscribe(&self) -> StorageEvents {
        StorageEvents::new(None, self.changes.subscribe())
    }
}
