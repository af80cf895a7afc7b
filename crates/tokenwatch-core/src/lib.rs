pub mod config;
pub mod runtime;
pub mod service;

pub use config::{ConfigError, PanelConfig, StoreConfig, TelemetryConfig, TokenwatchConfig};
pub use runtime::ServiceManager;
pub use service::{Service, ServiceContext, ServiceError, ServiceStatus};
