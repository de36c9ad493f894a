//! Builder for configuring a reconnection supervisor
//!
//! The `SupervisorBuilder` configures, before any subscription is opened:
//! - the reconnection strategy (flat 5 second delay unless set)
//! - the lifecycle source the supervisor listens to
//! - OpenTelemetry observability and feed metrics
//!
//! # Examples
//!
//! ```rust,no_run
//! use livefeed_client::{ExponentialBackoff, LifecycleSource, MemoryTransport, SupervisorBuilder};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example() -> livefeed_core::Result<()> {
//! let lifecycle = LifecycleSource::default();
//! let supervisor = SupervisorBuilder::new(Arc::new(MemoryTransport::new()))
//!     .with_lifecycle(lifecycle.clone())
//!     .with_reconnect(ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30)))
//!     .with_default_observability()
//!     .service_name("coach-app")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::connection::FeedClient;
use crate::lifecycle::LifecycleSource;
use crate::metrics::FeedMetrics;
use crate::reconnect::{FixedDelay, NoReconnect, ReconnectionStrategy};
use crate::supervisor::{ReconnectionSupervisor, StrategyFactory};
use crate::transport::ChangeFeedTransport;
use livefeed_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;

/// Builder for configuring and creating a [`ReconnectionSupervisor`]
pub struct SupervisorBuilder {
    transport: Arc<dyn ChangeFeedTransport>,
    lifecycle: Option<LifecycleSource>,
    strategy: Option<StrategyFactory>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    metrics: bool,
}

impl SupervisorBuilder {
    pub fn new(transport: Arc<dyn ChangeFeedTransport>) -> Self {
        Self {
            transport,
            lifecycle: None,
            strategy: None,
            observability_config: None,
            service_name: None,
            metrics: false,
        }
    }

    /// Lifecycle source to follow; a fresh `Active` source otherwise
    pub fn with_lifecycle(mut self, lifecycle: LifecycleSource) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Reconnect with `strategy`; every supervised handle gets its own copy
    pub fn with_reconnect<S>(mut self, strategy: S) -> Self
    where
        S: ReconnectionStrategy + Clone + 'static,
    {
        self.strategy = Some(Arc::new(move || {
            Box::new(strategy.clone()) as Box<dyn ReconnectionStrategy>
        }));
        self
    }

    /// Reconnect with the default flat 5 second delay
    pub fn with_default_reconnect(self) -> Self {
        self.with_reconnect(FixedDelay::default())
    }

    /// Never reconnect; degraded handles stay degraded until reconnected
    /// by hand
    pub fn without_reconnect(self) -> Self {
        self.with_reconnect(NoReconnect)
    }

    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Record feed metrics on the global meter provider without
    /// initialising observability here
    pub fn with_metrics(mut self) -> Self {
        self.metrics = true;
        self
    }

    /// Service name for telemetry
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the supervisor
    ///
    /// # Errors
    ///
    /// `Configuration` if observability was requested and fails to
    /// initialise.
    pub fn build(self) -> Result<ReconnectionSupervisor> {
        let mut metrics_name = self.metrics.then(|| {
            self.service_name
                .clone()
                .unwrap_or_else(|| "livefeed".to_string())
        });

        if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }
            livefeed_core::init_observability(config.clone())
                .map_err(|e| Error::Configuration(format!("Failed to initialize observability: {}", e)))?;
            if config.enable_metrics {
                metrics_name = Some(config.service_name);
            }
        }

        let metrics = metrics_name.map(|name| Arc::new(FeedMetrics::new(name)));
        let mut client = FeedClient::new(self.transport);
        if let Some(metrics) = &metrics {
            client = client.with_metrics(metrics.clone());
        }

        let strategy = self.strategy.unwrap_or_else(|| {
            Arc::new(|| Box::new(FixedDelay::default()) as Box<dyn ReconnectionStrategy>)
        });

        Ok(ReconnectionSupervisor::from_parts(
            client,
            self.lifecycle.unwrap_or_default(),
            strategy,
            metrics,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use livefeed_core::AppLifecycle;
    use std::time::Duration;

    fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new(Arc::new(MemoryTransport::new()))
    }

    #[test]
    fn test_builder_defaults() {
        let builder = builder();
        assert!(builder.lifecycle.is_none());
        assert!(builder.strategy.is_none());
        assert!(builder.observability_config.is_none());
        assert!(!builder.metrics);
    }

    #[test]
    fn test_with_reconnect_hands_out_fresh_strategies() {
        let builder = builder().with_reconnect(FixedDelay::new(Duration::from_secs(2)).with_max_attempts(1));
        let factory = builder.strategy.unwrap();

        let mut first = factory();
        assert_eq!(first.next_delay(0), Some(Duration::from_secs(2)));
        assert!(first.next_delay(1).is_none());

        let mut second = factory();
        assert_eq!(second.next_delay(0), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_without_reconnect() {
        let factory = builder().with_default_reconnect().without_reconnect().strategy.unwrap();
        assert!(factory().next_delay(0).is_none());
    }

    #[test]
    fn test_observability_config_kept() {
        let config = ObservabilityConfig::new("coach-app").with_log_level("debug");
        let builder = builder().with_observability(config).service_name("other");
        assert_eq!(builder.observability_config.as_ref().unwrap().log_level, "debug");
        assert_eq!(builder.service_name.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_build_uses_given_lifecycle() {
        let lifecycle = LifecycleSource::new(AppLifecycle::Background);
        let supervisor = builder().with_lifecycle(lifecycle.clone()).with_metrics().build().unwrap();

        assert_eq!(supervisor.lifecycle().current(), AppLifecycle::Background);
        lifecycle.set(AppLifecycle::Active);
        assert_eq!(supervisor.lifecycle().current(), AppLifecycle::Active);
        assert_eq!(supervisor.supervised_count(), 0);
    }
}
