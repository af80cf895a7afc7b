use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::TokenwatchConfig;

/// Immutable metadata shared with services when they are started.
#[derive(Clone, Default)]
pub struct ServiceContext {
    config: Arc<TokenwatchConfig>,
}

impl ServiceContext {
    pub fn new(config: Arc<TokenwatchConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenwatchConfig {
        &self.config
    }
}

/// Runtime state of an individual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Error type returned by services at runtime.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed during initialization: {0}")]
    Initialization(String),
}

/// Trait implemented by every long-running piece of the tokenwatch runtime.
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique identifier for the service.
    fn name(&self) -> &'static str;

    /// Start the service and return once it has finished initializing.
    async fn start(&self, ctx: ServiceContext) -> Result<(), ServiceError>;

    /// Request a graceful shutdown of the service.
    async fn stop(&self) -> Result<(), ServiceError>;

    /// Current status of the service.
    fn status(&self) -> ServiceStatus;
}
