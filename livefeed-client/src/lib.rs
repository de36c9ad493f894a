//! Supervised, lifecycle-aware change-feed connections
//!
//! This crate turns a remote change feed into per-screen view state that
//! stays current across network failures and app backgrounding.
//!
//! # Core Features
//!
//! - **Connections**: [`FeedClient`] opens one connection per subscription
//!   descriptor and dispatches typed insert/update/delete events in order
//! - **Supervision**: [`ReconnectionSupervisor`] replaces degraded
//!   connections after a backoff delay, defers reconnects while the app is
//!   in the background and reconnects promptly on return to the foreground
//! - **View state**: [`SharedView`] folds events into a screen's
//!   `ViewCollection`
//! - **Transport boundary**: [`ChangeFeedTransport`] with an in-process
//!   [`MemoryTransport`]
//! - **Observability**: `tracing` spans and logs plus OpenTelemetry
//!   [`FeedMetrics`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use livefeed_client::{LifecycleSource, MemoryTransport, ReconnectionSupervisor, SharedView};
//! use livefeed_core::{FeedRecord, RecordId, SubscriptionDescriptor, ViewCollection};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, serde::Deserialize)]
//! struct Task { id: i64, date: String }
//!
//! impl FeedRecord for Task {
//!     fn record_id(&self) -> RecordId { self.id.into() }
//! }
//!
//! #[tokio::main]
//! async fn main() -> livefeed_core::Result<()> {
//!     let supervisor = ReconnectionSupervisor::new(
//!         Arc::new(MemoryTransport::new()),
//!         LifecycleSource::default(),
//!     );
//!
//!     let today = SharedView::new(ViewCollection::new(|t: &Task| t.date == "2024-05-01"));
//!     let name = SubscriptionDescriptor::bucketed_name("daily", "u1", "2024-05-01");
//!     let descriptor = SubscriptionDescriptor::new(name, "tasks", "u1")
//!         .with_filter("owner_id=eq.u1");
//!
//!     let handle = supervisor.supervise(descriptor, today.handlers()).await?;
//!     println!("live: {}, tasks: {}", handle.is_connected(), today.len());
//!
//!     supervisor.unsupervise(&handle).await;
//!     Ok(())
//! }
//! ```

mod connection;
mod handlers;
mod lifecycle;
mod memory;
mod metrics;
mod reconnect;
mod supervision_state;
mod supervisor;
mod supervisor_builder;
mod transport;
mod view;

pub use connection::{ConnectionHandle, FeedClient, StatusListener};
pub use handlers::{ChangeHandlers, FnHandlers};
pub use lifecycle::{LifecycleListener, LifecycleSource};
pub use memory::MemoryTransport;
pub use metrics::{FeedMetrics, ReconnectTrigger};
pub use reconnect::{ExponentialBackoff, FixedDelay, NoReconnect, ReconnectionStrategy, DEFAULT_RECONNECT_DELAY};
pub use supervision_state::SupervisionPhase;
pub use supervisor::{HandleStatus, ReconnectionSupervisor, StrategyFactory, SupervisedHandle};
pub use supervisor_builder::SupervisorBuilder;
pub use transport::{ChangeFeedTransport, FeedSink, TransportHandle, TransportSignal};
pub use view::SharedView;
