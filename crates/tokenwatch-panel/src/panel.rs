use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokenwatch_event::{Event, EventBus, RefreshStatus};
use tokenwatch_store::{StorageEvents, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::snapshot::{PanelSnapshot, TokenSnapshot};

#[derive(Debug, Clone)]
pub struct PanelOptions {
    /// Period of the clock tick that refreshes elapsed/remaining times.
    pub tick_interval: Duration,
    pub access_key: String,
    pub refresh_key: String,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            access_key: ACCESS_TOKEN_KEY.to_string(),
            refresh_key: REFRESH_TOKEN_KEY.to_string(),
        }
    }
}

struct Inner {
    store: Arc<dyn TokenStore>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    options: PanelOptions,
    snapshots: watch::Sender<PanelSnapshot>,
    renders: AtomicU64,
    store_reads: AtomicU64,
}

/// Read-only diagnostics view over the token store.
#[derive(Clone)]
pub struct TokenDiagnostics {
    inner: Arc<Inner>,
}

impl TokenDiagnostics {
    pub fn new(
        store: Arc<dyn TokenStore>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        options: PanelOptions,
    ) -> Self {
        let (snapshots, _) = watch::channel(PanelSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                store,
                bus,
                clock,
                options,
                snapshots,
                renders: AtomicU64::new(0),
                store_reads: AtomicU64::new(0),
            }),
        }
    }

    /// The most recent render.
    pub fn snapshot(&self) -> PanelSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Receiver that observes every subsequent render.
    pub fn subscribe(&self) -> watch::Receiver<PanelSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Read the store, render once, then start the clock tick and both
    /// listeners. Everything started here is released by the returned
    /// [`Activation`].
    pub async fn activate(&self) -> Activation {
        // Subscribe before the first read so a write racing activation is not lost.
        let storage = self.inner.store.subscribe();
        let events = self.inner.bus.subscribe();

        let mut view = ViewLoop {
            inner: self.inner.clone(),
            tokens: TokenSnapshot::default(),
            now_ms: self.inner.clock.now_ms(),
            refresh_status: None,
        };
        view.reload().await;
        view.render();
        info!(
            tick = ?self.inner.options.tick_interval,
            "token diagnostics activated"
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(view.run(storage, events, shutdown_rx));
        Activation {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Timer and listeners registered by one [`TokenDiagnostics::activate`] call.
///
/// [`Activation::deactivate`] stops them and waits until they are gone.
/// Dropping the activation aborts them without waiting.
#[must_use = "dropping an Activation deactivates the panel"]
pub struct Activation {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Activation {
    /// Cancel the tick and both listeners. No render happens after this returns.
    pub async fn deactivate(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "diagnostics loop ended abnormally");
                }
            }
        }
        info!("token diagnostics deactivated");
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// State owned by one activation. Every input is handled to completion before
/// the next one is taken.
struct ViewLoop {
    inner: Arc<Inner>,
    tokens: TokenSnapshot,
    now_ms: i64,
    refresh_status: Option<RefreshStatus>,
}

impl ViewLoop {
    async fn run(
        mut self,
        mut storage: StorageEvents,
        mut events: broadcast::Receiver<Event>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let period = self.inner.options.tick_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut storage_open = true;
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.now_ms = self.inner.clock.now_ms();
                    self.render();
                }
                change = storage.recv(), if storage_open => match change {
                    Some(change) => {
                        debug!(key = %change.key, "storage changed in another context");
                        self.reload().await;
                        self.render();
                    }
                    None => storage_open = false,
                },
                received = events.recv(), if events_open => match received {
                    Ok(event) => {
                        if let Some(status) = RefreshStatus::from_event(&event) {
                            debug!(ok = status.ok, at = status.at, "refresh status received");
                            self.refresh_status = Some(status);
                            self.reload().await;
                            self.render();
                        } else {
                            debug!(topic = %event.topic, "ignoring event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "refresh status listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
            }
        }
    }

    async fn reload(&mut self) {
        let access = self.read(&self.inner.options.access_key).await;
        let refresh = self.read(&self.inner.options.refresh_key).await;
        self.tokens = TokenSnapshot { access, refresh };
        self.inner.store_reads.fetch_add(1, Ordering::SeqCst);
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.inner.store.get(key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(%key, %error, "failed to read token store");
                None
            }
        }
    }

    fn render(&self) {
        let renders = self.inner.renders.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = PanelSnapshot::derive(
            &self.tokens,
            self.now_ms,
            self.refresh_status.clone(),
            renders,
            self.inner.store_reads.load(Ordering::SeqCst),
        );
        debug!(
            renders,
            seconds_remaining = ?snapshot.seconds_remaining,
            access_present = snapshot.access.present,
            refresh_present = snapshot.refresh.present,
            "panel rendered"
        );
        self.inner.snapshots.send_replace(snapshot);
    }
}
