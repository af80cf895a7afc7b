use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{service::ServiceContext, Service, ServiceError, TokenwatchConfig};

/// Starts registered services in order and stops them in reverse.
pub struct ServiceManager {
    config: Arc<TokenwatchConfig>,
    services: Vec<Arc<dyn Service>>,
    started: Arc<RwLock<bool>>,
}

impl ServiceManager {
    pub fn new(config: TokenwatchConfig) -> Self {
        Self {
            config: Arc::new(config),
            services: Vec::new(),
            started: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a service instance with the runtime.
    pub fn register_service(&mut self, service: Arc<dyn Service>) {
        self.services.push(service);
    }

    /// Start all registered services sequentially.
    ///
    /// A second call while running is a no-op. If a service fails to start,
    /// the ones already started are stopped again before the error is returned.
    pub async fn start_all(&self) -> Result<(), ServiceError> {
        {
            let mut started = self.started.write().await;
            if *started {
                return Ok(());
            }
            *started = true;
        }

        let ctx = ServiceContext::new(self.config.clone());
        for (index, service) in self.services.iter().enumerate() {
            info!(service = service.name(), "starting service");
            if let Err(err) = service.start(ctx.clone()).await {
                warn!(service = service.name(), error = %err, "service failed to start");
                self.stop_services(&self.services[..index]).await;
                *self.started.write().await = false;
                return Err(err);
            }
        }

        Ok(())
    }

    /// Stop all services in reverse order.
    pub async fn stop_all(&self) {
        self.stop_services(&self.services).await;
        let mut started = self.started.write().await;
        *started = false;
    }

    async fn stop_services(&self, services: &[Arc<dyn Service>]) {
        for service in services.iter().rev() {
            info!(service = service.name(), "stopping service");
            if let Err(err) = service.stop().await {
                warn!(service = service.name(), error = %err, "service failed to stop cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::ServiceStatus;

    struct Recorder {
        name: &'static str,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Service for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn start(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
            assert_eq!(ctx.config().panel.tick_interval_ms, 1000);
            if self.fail_start {
                return Err(ServiceError::Initialization("boom".into()));
            }
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<(), ServiceError> {
            self.log.lock().unwrap().push(format!("stop:{}", self.name));
            Ok(())
        }

        fn status(&self) -> ServiceStatus {
            ServiceStatus::Running
        }
    }

    fn recorder(
        name: &'static str,
        fail_start: bool,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Service> {
        Arc::new(Recorder {
            name,
            fail_start,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn starts_in_order_and_stops_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(TokenwatchConfig::default());
        manager.register_service(recorder("store", false, &log));
        manager.register_service(recorder("panel", false, &log));

        manager.start_all().await.expect("start");
        manager.start_all().await.expect("idempotent start");
        manager.stop_all().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:store", "start:panel", "stop:panel", "stop:store"]
        );
    }

    #[tokio::test]
    async fn failed_start_unwinds_started_services() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(TokenwatchConfig::default());
        manager.register_service(recorder("store", false, &log));
        manager.register_service(recorder("panel", true, &log));
        manager.register_service(recorder("renderer", false, &log));

        let result = manager.start_all().await;
        assert!(matches!(result, Err(ServiceError::Initialization(_))));
        assert_eq!(*log.lock().unwrap(), vec!["start:store", "stop:store"]);
    }
}
