use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use common_obs::ObsInit;
use tokenwatch_core::{ServiceManager, TokenwatchConfig};
use tokenwatch_daemon::{
    panel_options,
    services::{PanelService, RefreshFeedService, RendererService, StoreWatchService},
    CONFIG_ENV, SERVICE_NAME,
};
use tokenwatch_event::EventBus;
use tokenwatch_panel::{SystemClock, TokenDiagnostics};
use tokenwatch_store::FileTokenStore;
use tokio::{io::BufReader, signal};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run());
    // A pending stdin read would otherwise hold shutdown open.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = TokenwatchConfig::load(config_path.as_deref())
        .with_context(|| format!("failed to load configuration from {config_path:?}"))?;
    ObsInit::init(
        SERVICE_NAME,
        config.telemetry.log_format,
        config.telemetry.log_filter.as_deref(),
    )?;

    let store = FileTokenStore::new(&config.store.path);
    let bus = EventBus::new(config.panel.event_capacity);
    let panel = TokenDiagnostics::new(
        Arc::new(store.clone()),
        bus.clone(),
        Arc::new(SystemClock),
        panel_options(&config.panel),
    );

    let mut manager = ServiceManager::new(config);
    manager.register_service(Arc::new(StoreWatchService::new(store)));
    // Registered ahead of the panel so the initial render is written too.
    manager.register_service(Arc::new(RendererService::new(
        panel.subscribe(),
        tokio::io::stdout(),
    )));
    manager.register_service(Arc::new(PanelService::new(panel)));
    manager.register_service(Arc::new(RefreshFeedService::new(
        BufReader::new(tokio::io::stdin()),
        bus,
    )));

    manager.start_all().await?;
    info!("tokenwatch running");

    signal::ctrl_c().await?;
    info!("shutdown requested");
    manager.stop_all().await;
    Ok(())
}
