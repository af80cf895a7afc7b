//! Hosts the token diagnostics panel against a file-backed token store.

pub mod feed;
pub mod render;
pub mod services;

use tokenwatch_core::PanelConfig;
use tokenwatch_panel::PanelOptions;

pub const SERVICE_NAME: &str = "tokenwatch";
/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "TOKENWATCH_CONFIG";

pub fn panel_options(config: &PanelConfig) -> PanelOptions {
    PanelOptions {
        tick_interval: config.tick_interval(),
        access_key: config.access_key.clone(),
        refresh_key: config.refresh_key.clone(),
    }
}
