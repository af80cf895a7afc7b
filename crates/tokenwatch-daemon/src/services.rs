use async_trait::async_trait;
use parking_lot::Mutex;
use tokenwatch_core::{Service, ServiceContext, ServiceError, ServiceStatus};
use tokenwatch_event::EventBus;
use tokenwatch_panel::{Activation, PanelSnapshot, TokenDiagnostics};
use tokenwatch_store::FileTokenStore;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::feed::pump_statuses;
use crate::render::render_to;

/// Polls the token file and turns on-disk edits into storage notifications.
pub struct StoreWatchService {
    store: FileTokenStore,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    status: Mutex<ServiceStatus>,
}

impl StoreWatchService {
    pub fn new(store: FileTokenStore) -> Self {
        Self {
            store,
            handle: AsyncMutex::new(None),
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }
}

#[async_trait]
impl Service for StoreWatchService {
    fn name(&self) -> &'static str {
        "store-watch-service"
    }

    async fn start(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Starting;

        let interval = ctx.config().store.poll_interval();
        info!(
            path = %self.store.path().display(),
            poll = ?interval,
            "watching token store"
        );
        let handle = self.store.spawn_watcher(interval);
        *self.handle.lock().await = Some(handle);

        *self.status.lock() = ServiceStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Stopping;
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
        *self.status.lock() = ServiceStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }
}

/// Keeps the diagnostics panel activated while the service runs.
pub struct PanelService {
    panel: TokenDiagnostics,
    activation: AsyncMutex<Option<Activation>>,
    status: Mutex<ServiceStatus>,
}

impl PanelService {
    pub fn new(panel: TokenDiagnostics) -> Self {
        Self {
            panel,
            activation: AsyncMutex::new(None),
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }
}

#[async_trait]
impl Service for PanelService {
    fn name(&self) -> &'static str {
        "panel-service"
    }

    async fn start(&self, _ctx: ServiceContext) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Starting;

        let mut slot = self.activation.lock().await;
        if slot.is_some() {
            *self.status.lock() = ServiceStatus::Failed;
            return Err(ServiceError::Initialization("panel already active".into()));
        }
        *slot = Some(self.panel.activate().await);

        *self.status.lock() = ServiceStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Stopping;
        if let Some(activation) = self.activation.lock().await.take() {
            activation.deactivate().await;
        }
        *self.status.lock() = ServiceStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }
}

/// Publishes refresh-status lines read from `reader` on the event bus.
///
/// The reader is consumed by the first start.
pub struct RefreshFeedService<R> {
    reader: Mutex<Option<R>>,
    bus: EventBus,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    status: Mutex<ServiceStatus>,
}

impl<R> RefreshFeedService<R> {
    pub fn new(reader: R, bus: EventBus) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            bus,
            handle: AsyncMutex::new(None),
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }
}

#[async_trait]
impl<R> Service for RefreshFeedService<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "refresh-feed-service"
    }

    async fn start(&self, _ctx: ServiceContext) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Starting;

        let reader = self.reader.lock().take().ok_or_else(|| {
            *self.status.lock() = ServiceStatus::Failed;
            ServiceError::Initialization("refresh feed input already consumed".into())
        })?;
        let bus = self.bus.clone();
        let handle = tokio::spawn(async move {
            if let Err(error) = pump_statuses(reader, bus).await {
                warn!(%error, "refresh status feed failed");
            }
        });
        *self.handle.lock().await = Some(handle);

        *self.status.lock() = ServiceStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Stopping;
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
        *self.status.lock() = ServiceStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }
}

/// Writes each panel render to `out`.
pub struct RendererService<W> {
    renders: watch::Receiver<PanelSnapshot>,
    out: Mutex<Option<W>>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    status: Mutex<ServiceStatus>,
}

impl<W> RendererService<W> {
    pub fn new(renders: watch::Receiver<PanelSnapshot>, out: W) -> Self {
        Self {
            renders,
            out: Mutex::new(Some(out)),
            handle: AsyncMutex::new(None),
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }
}

#[async_trait]
impl<W> Service for RendererService<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "renderer-service"
    }

    async fn start(&self, _ctx: ServiceContext) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Starting;

        let out = self.out.lock().take().ok_or_else(|| {
            *self.status.lock() = ServiceStatus::Failed;
            ServiceError::Initialization("renderer output already consumed".into())
        })?;
        let renders = self.renders.clone();
        let handle = tokio::spawn(async move {
            if let Err(error) = render_to(renders, out).await {
                warn!(%error, "renderer stopped");
            }
        });
        *self.handle.lock().await = Some(handle);

        *self.status.lock() = ServiceStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        *self.status.lock() = ServiceStatus::Stopping;
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
        *self.status.lock() = ServiceStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }
}
