//! Change-feed connections
//!
//! [`FeedClient`] opens one connection per subscription descriptor. Each
//! connection runs a small pump task that drains the transport's signal
//! channel in order:
//!
//! - change events are decoded for the record type and handed to the
//!   connection's [`ChangeHandlers`], or logged and dropped when they are
//!   malformed, of an unknown kind, or for another resource
//! - statuses move the connection between states and are reported to the
//!   optional status listener
//!
//! # Connection States
//!
//! ```text
//! Idle → Connecting → Live ⇄ Degraded
//!            │          │        │
//!            └──────────┴────────┴──→ Closed
//! ```
//!
//! `Closed` is terminal for a connection. Reconnecting means opening a new
//! connection with the same descriptor, which is what
//! [`ReconnectionSupervisor`](crate::ReconnectionSupervisor) does.
//!
//! # Cloning
//!
//! `FeedClient` and `ConnectionHandle` are cheap to clone; clones share the
//! same registry and connection.

use crate::handlers::ChangeHandlers;
use crate::metrics::FeedMetrics;
use crate::transport::{ChangeFeedTransport, FeedSink, TransportHandle, TransportSignal};
use livefeed_core::{
    codec, ConnectionState, ConnectionStatusChange, Error, RawChangeEvent, Result,
    SubscriptionDescriptor,
};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Callback receiving every state change of a connection
pub type StatusListener = Arc<dyn Fn(ConnectionStatusChange) + Send + Sync>;

type NameRegistry = Arc<std::sync::Mutex<HashSet<String>>>;

struct Running {
    transport_handle: Option<TransportHandle>,
    pump: Option<JoinHandle<()>>,
}

struct ConnectionShared {
    descriptor: SubscriptionDescriptor,
    state: watch::Sender<ConnectionState>,
    on_status: Option<StatusListener>,
    running: Mutex<Option<Running>>,
    registry: NameRegistry,
    metrics: Option<Arc<FeedMetrics>>,
}

impl ConnectionShared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move to `next` unless already there or closed; reports real changes
    fn transition(&self, next: ConnectionState, error: Option<String>) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if current.is_closed() || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if !changed {
            return false;
        }

        let name = self.descriptor.name();
        match (&next, &error) {
            (ConnectionState::Degraded, Some(reason)) => {
                tracing::warn!(subscription = %name, error = %reason, "Connection degraded")
            }
            _ => tracing::debug!(subscription = %name, state = %next, "Connection state changed"),
        }
        if let Some(metrics) = &self.metrics {
            metrics.update_connection_state(name, next);
        }
        if let Some(listener) = &self.on_status {
            listener(ConnectionStatusChange {
                name: name.to_string(),
                state: next,
                error,
            });
        }
        true
    }

    fn deliver<R: DeserializeOwned>(&self, raw: RawChangeEvent, handlers: &dyn ChangeHandlers<R>) {
        let name = self.descriptor.name();
        if !resource_matches(self.descriptor.resource(), &raw.resource) {
            tracing::debug!(subscription = %name, resource = %raw.resource, "Ignoring change for another resource");
            self.record_dropped("foreign_resource");
            return;
        }

        match codec::decode_event::<R>(raw) {
            Ok(event) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_event(self.descriptor.resource(), event.kind());
                }
                handlers.dispatch(event);
            }
            Err(e) => {
                tracing::warn!(subscription = %name, error = %e, "Dropping change event");
                self.record_dropped(match e {
                    Error::UnknownChangeKind(_) => "unknown_kind",
                    _ => "malformed",
                });
            }
        }
    }

    fn record_dropped(&self, reason: &'static str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dropped(reason);
        }
    }
}

/// `public.tasks` and `tasks` name the same resource; `a.tasks` and
/// `b.tasks` do not
fn resource_matches(expected: &str, actual: &str) -> bool {
    fn table(resource: &str) -> &str {
        resource.rsplit_once('.').map_or(resource, |(_, t)| t)
    }
    expected == actual
        || (expected.contains('.') != actual.contains('.') && table(expected) == table(actual))
}

async fn run_pump<R>(
    shared: Arc<ConnectionShared>,
    mut signals: mpsc::UnboundedReceiver<TransportSignal>,
    handlers: Arc<dyn ChangeHandlers<R>>,
) where
    R: DeserializeOwned + Send + 'static,
{
    while let Some(signal) = signals.recv().await {
        if shared.state().is_closed() {
            break;
        }
        match signal {
            TransportSignal::Event(raw) => shared.deliver(raw, handlers.as_ref()),
            TransportSignal::Status(status) => {
                shared.transition(status.target_state(), status.error_message());
            }
        }
    }

    if !shared.state().is_closed() {
        shared.transition(ConnectionState::Degraded, Some("change feed ended".to_string()));
    }
}

/// Handle to one open connection
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<ConnectionShared>,
}

impl ConnectionHandle {
    pub fn name(&self) -> &str {
        self.shared.descriptor.name()
    }

    pub fn descriptor(&self) -> &SubscriptionDescriptor {
        &self.shared.descriptor
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Observe state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Opens and closes change-feed connections over a transport
#[derive(Clone)]
pub struct FeedClient {
    transport: Arc<dyn ChangeFeedTransport>,
    open_names: NameRegistry,
    metrics: Option<Arc<FeedMetrics>>,
}

impl FeedClient {
    pub fn new(transport: Arc<dyn ChangeFeedTransport>) -> Self {
        Self {
            transport,
            open_names: Arc::new(std::sync::Mutex::new(HashSet::new())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<FeedMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn transport(&self) -> &Arc<dyn ChangeFeedTransport> {
        &self.transport
    }

    /// Returns true if a connection with this name is open and not yet closed
    pub fn is_open(&self, name: &str) -> bool {
        self.open_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn open_count(&self) -> usize {
        self.open_names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn reserve(&self, name: &str) -> Result<()> {
        let mut names = self.open_names.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(name.to_string()) {
            return Err(Error::DuplicateSubscription(name.to_string()));
        }
        Ok(())
    }

    /// Open a connection for `descriptor`
    ///
    /// The connection starts in `Connecting` and becomes `Live` once the
    /// transport acknowledges it. If the subscribe request cannot even be
    /// issued the connection is returned `Degraded` with the error reported
    /// to `on_status`, so callers handle every transport failure the same
    /// way.
    ///
    /// # Errors
    ///
    /// - `InvalidDescriptor` if the descriptor fails validation
    /// - `DuplicateSubscription` if a connection with the same name is open
    #[tracing::instrument(
        skip(self, descriptor, handlers, on_status),
        fields(subscription = %descriptor.name(), resource = %descriptor.resource())
    )]
    pub async fn open<R>(
        &self,
        descriptor: SubscriptionDescriptor,
        handlers: Arc<dyn ChangeHandlers<R>>,
        on_status: Option<StatusListener>,
    ) -> Result<ConnectionHandle>
    where
        R: DeserializeOwned + Send + 'static,
    {
        descriptor.validate()?;
        self.reserve(descriptor.name())?;

        let (state, _) = watch::channel(ConnectionState::Idle);
        let shared = Arc::new(ConnectionShared {
            descriptor,
            state,
            on_status,
            running: Mutex::new(None),
            registry: self.open_names.clone(),
            metrics: self.metrics.clone(),
        });

        shared.transition(ConnectionState::Connecting, None);
        let (sink, signals) = FeedSink::channel();

        let transport_handle = match self.transport.subscribe(&shared.descriptor, sink).await {
            Ok(handle) => {
                tracing::debug!(handle = %handle, "Subscribe issued");
                Some(handle)
            }
            Err(e) => {
                shared.transition(ConnectionState::Degraded, Some(e.to_string()));
                None
            }
        };

        let pump = transport_handle
            .map(|_| tokio::spawn(run_pump(shared.clone(), signals, handlers).in_current_span()));
        *shared.running.lock().await = Some(Running {
            transport_handle,
            pump,
        });

        Ok(ConnectionHandle { shared })
    }

    /// Close a connection
    ///
    /// Moves it to `Closed`, stops event delivery, releases the transport
    /// subscription and frees the name. Once this returns no handler of the
    /// connection runs again. Closing twice is a no-op.
    #[tracing::instrument(skip(self, handle), fields(subscription = %handle.name()))]
    pub async fn close(&self, handle: &ConnectionHandle) {
        let shared = &handle.shared;
        let Some(running) = shared.running.lock().await.take() else {
            tracing::debug!("Connection already closed");
            return;
        };

        shared.transition(ConnectionState::Closed, None);

        if let Some(pump) = running.pump {
            pump.abort();
            let _ = pump.await;
        }
        if let Some(transport_handle) = running.transport_handle {
            if let Err(e) = self.transport.unsubscribe(transport_handle).await {
                tracing::warn!(error = %e, "Failed to unsubscribe");
            }
        }

        shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(shared.descriptor.name());
        tracing::debug!("Connection closed");
    }

    /// Current state of a connection
    pub fn state(&self, handle: &ConnectionHandle) -> ConnectionState {
        handle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::FnHandlers;
    use crate::memory::MemoryTransport;

    #[derive(Debug, Clone, serde::Deserialize)]
    struct Row {
        #[allow(dead_code)]
        id: i64,
    }

    fn client(transport: &MemoryTransport) -> FeedClient {
        FeedClient::new(Arc::new(transport.clone()))
    }

    #[test]
    fn test_resource_matches() {
        assert!(resource_matches("tasks", "tasks"));
        assert!(resource_matches("tasks", "public.tasks"));
        assert!(resource_matches("public.tasks", "tasks"));
        assert!(!resource_matches("tasks", "messages"));
        assert!(!resource_matches("a.tasks", "b.tasks"));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_descriptor() {
        let transport = MemoryTransport::new();
        let client = client(&transport);
        let err = client
            .open(
                SubscriptionDescriptor::new("", "tasks", "u1"),
                FnHandlers::<Row>::new().into_shared(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
        assert_eq!(transport.subscribe_count(), 0);
    }

    #[tokio::test]
    async fn test_close_frees_name() {
        let transport = MemoryTransport::manual_ack();
        let client = client(&transport);
        let descriptor = SubscriptionDescriptor::new("daily-u1-2024-05-01", "tasks", "u1");

        let handle = client
            .open(descriptor.clone(), FnHandlers::<Row>::new().into_shared(), None)
            .await
            .unwrap();
        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert!(client.is_open("daily-u1-2024-05-01"));

        client.close(&handle).await;
        assert_eq!(client.state(&handle), ConnectionState::Closed);
        assert!(!client.is_open("daily-u1-2024-05-01"));
        assert_eq!(client.open_count(), 0);

        // The name can be used again
        let again = client
            .open(descriptor, FnHandlers::<Row>::new().into_shared(), None)
            .await
            .unwrap();
        assert_eq!(again.state(), ConnectionState::Connecting);
    }
}
