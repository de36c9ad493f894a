//! Livefeed - reconnecting change-feed subscriptions
//!
//! This is the main convenience crate that re-exports the livefeed
//! sub-crates. Use it if you want a single dependency for both the data
//! types and the supervised client.
//!
//! # Architecture
//!
//! - **livefeed-core**: Subscription descriptors, change events, the view
//!   reducer, focus context, errors and observability setup
//! - **livefeed-client**: Transport boundary, connections, reconnection
//!   supervisor, lifecycle source and shared views
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use livefeed::{LifecycleSource, MemoryTransport, ReconnectionSupervisor};
//! use livefeed::client::FnHandlers;
//! use livefeed::core::{AppLifecycle, SubscriptionDescriptor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lifecycle = LifecycleSource::default();
//!     let supervisor = ReconnectionSupervisor::new(Arc::new(MemoryTransport::new()), lifecycle.clone());
//!
//!     let handlers = FnHandlers::<serde_json::Value>::new()
//!         .on_insert(|row| println!("inserted: {}", row))
//!         .into_shared();
//!     let descriptor = SubscriptionDescriptor::new("chat-u1", "messages", "u1");
//!     let handle = supervisor.supervise(descriptor, handlers).await?;
//!
//!     lifecycle.set(AppLifecycle::Background);
//!     lifecycle.set(AppLifecycle::Active);
//!
//!     supervisor.unsupervise(&handle).await;
//!     Ok(())
//! }
//! ```

pub use livefeed_client as client;
pub use livefeed_core as core;

// Convenience re-exports of the most commonly used types
pub use livefeed_client::{
    FeedClient, LifecycleSource, MemoryTransport, ReconnectionSupervisor, SharedView, SupervisedHandle,
};
pub use livefeed_core::{SubscriptionDescriptor, ViewCollection};
