//! Core types, event codec and view-state reducer for livefeed
//!
//! This crate holds the parts of the change-feed layer that do no I/O:
//!
//! - **Types**: subscription descriptors, connection states, transport
//!   statuses, typed change events, record identity, app lifecycle
//! - **Codec**: turning raw transport payloads into typed change events
//! - **Reducer**: folding change events into a screen's record collection
//! - **Focus**: the injected focused-screen value used to suppress in-app
//!   notifications
//! - **Error handling**: the shared `Error` / `Result` types
//! - **Observability**: OpenTelemetry and `tracing` bootstrap
//!
//! The `livefeed-client` crate builds connections and the reconnection
//! supervisor on top of these.
//!
//! # Example
//!
//! ```rust
//! use livefeed_core::{codec, ChangeEvent, FeedRecord, RawChangeEvent, RecordId, ViewCollection};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Clone, Deserialize)]
//! struct Task { id: i64, scheduled_date: String }
//!
//! impl FeedRecord for Task {
//!     fn record_id(&self) -> RecordId { self.id.into() }
//! }
//!
//! let mut today = ViewCollection::new(|t: &Task| t.scheduled_date == "2024-05-01");
//!
//! let raw = RawChangeEvent::insert("tasks", serde_json::json!({"id": 1, "scheduled_date": "2024-05-02"}));
//! let event: ChangeEvent<Task> = codec::decode_event(raw).unwrap();
//! today.apply(event);
//! assert!(today.is_empty()); // scheduled for tomorrow
//! ```

pub mod codec;
pub mod error;
pub mod focus;
pub mod observability;
pub mod reducer;
pub mod types;

pub use codec::RawChangeEvent;
pub use error::{Error, Result};
pub use focus::{FocusContext, FocusedScreen, NotificationGate};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use reducer::{SortOrder, ViewCollection};
pub use types::{
    AppLifecycle, ChangeEvent, ChangeKind, ConnectionState, ConnectionStatusChange, FeedRecord,
    RecordId, SubscriptionDescriptor, TransportStatus,
};
