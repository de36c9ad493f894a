//! Reconnection supervisor
//!
//! [`ReconnectionSupervisor::supervise`] opens a connection for a
//! descriptor and keeps it alive for as long as the returned
//! [`SupervisedHandle`] lives:
//!
//! - when the connection degrades it waits out the reconnection strategy's
//!   delay (5 seconds by default) and then replaces the connection with a
//!   fresh one under the same descriptor and handlers
//! - if the delay runs out while the app is in the background, the
//!   reconnect is held back until the app returns to the foreground
//! - returning to the foreground reconnects every handle whose connection
//!   is not live right away, without waiting for its timer
//! - a connection closed on purpose by the transport is never reconnected
//!
//! Each handle is driven by its own task, which owns the handle's single
//! backoff timer. Status reports from a connection carry the generation of
//! that connection, so reports from a connection that was already replaced
//! are ignored.
//!
//! # Examples
//!
//! ```rust,no_run
//! use livefeed_client::{FnHandlers, LifecycleSource, MemoryTransport, ReconnectionSupervisor};
//! use livefeed_core::{AppLifecycle, SubscriptionDescriptor};
//! use std::sync::Arc;
//!
//! # async fn example() -> livefeed_core::Result<()> {
//! let lifecycle = LifecycleSource::default();
//! let supervisor = ReconnectionSupervisor::new(Arc::new(MemoryTransport::new()), lifecycle.clone());
//!
//! let handlers = FnHandlers::<serde_json::Value>::new().into_shared();
//! let descriptor = SubscriptionDescriptor::new("chat-u1", "messages", "u1");
//! let handle = supervisor.supervise(descriptor, handlers).await?;
//!
//! lifecycle.set(AppLifecycle::Background);
//! // ... later
//! lifecycle.set(AppLifecycle::Active);
//!
//! supervisor.unsupervise(&handle).await;
//! # Ok(())
//! # }
//! ```

use crate::connection::{ConnectionHandle, FeedClient, StatusListener};
use crate::handlers::ChangeHandlers;
use crate::lifecycle::{LifecycleListener, LifecycleSource};
use crate::metrics::{FeedMetrics, ReconnectTrigger};
use crate::reconnect::{FixedDelay, ReconnectionStrategy};
use crate::supervision_state::{Decision, SupervisionPhase, SupervisionState};
use crate::supervisor_builder::SupervisorBuilder;
use crate::transport::ChangeFeedTransport;
use livefeed_core::{
    AppLifecycle, ConnectionState, ConnectionStatusChange, Error, Result, SubscriptionDescriptor,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::Instrument;

/// Produces a fresh strategy for each supervised handle
pub type StrategyFactory = Arc<dyn Fn() -> Box<dyn ReconnectionStrategy> + Send + Sync>;

type NameSet = Arc<std::sync::Mutex<HashSet<String>>>;

/// Snapshot of a supervised handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandleStatus {
    /// The current connection is live
    pub connected: bool,
    /// Most recent failure; cleared once a connection is live again
    pub last_error: Option<String>,
    pub phase: SupervisionPhase,
    /// Degraded episodes since the handle was last live
    pub attempts: u32,
    /// Number of connections opened for this handle so far
    pub generation: u64,
}

impl HandleStatus {
    fn initial() -> Self {
        Self {
            connected: false,
            last_error: None,
            phase: SupervisionPhase::Active,
            attempts: 0,
            generation: 0,
        }
    }
}

enum Command {
    Reconnect,
    Stop(oneshot::Sender<()>),
}

/// A subscription kept alive by a [`ReconnectionSupervisor`]
///
/// Dropping the handle stops supervision and closes its connection, the
/// same as [`ReconnectionSupervisor::unsupervise`] without waiting for it.
#[derive(Debug)]
pub struct SupervisedHandle {
    name: String,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<HandleStatus>,
}

impl SupervisedHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    pub fn status(&self) -> HandleStatus {
        self.status.borrow().clone()
    }

    /// Returns true once supervision has stopped
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    /// Observe status changes
    pub fn watch_status(&self) -> watch::Receiver<HandleStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`
    ///
    /// # Errors
    ///
    /// `SupervisorStopped` if supervision ends first.
    pub async fn wait_until<F>(&self, predicate: F) -> Result<HandleStatus>
    where
        F: FnMut(&HandleStatus) -> bool,
    {
        let mut rx = self.status.clone();
        let status = match rx.wait_for(predicate).await {
            Ok(status) => status.clone(),
            Err(_) => return Err(Error::SupervisorStopped),
        };
        Ok(status)
    }

    /// Replace the connection now, whatever state it is in
    ///
    /// Also restarts a handle the transport closed or the strategy gave up
    /// on.
    pub fn reconnect(&self) {
        if self.commands.send(Command::Reconnect).is_err() {
            tracing::debug!(subscription = %self.name, "Reconnect requested after supervision stopped");
        }
    }
}

struct SupervisorInner {
    client: FeedClient,
    lifecycle: LifecycleSource,
    strategy: StrategyFactory,
    names: NameSet,
    metrics: Option<Arc<FeedMetrics>>,
}

/// Keeps supervised subscriptions connected across failures and app
/// lifecycle changes
#[derive(Clone)]
pub struct ReconnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ReconnectionSupervisor {
    /// Supervisor with the default flat 5 second backoff
    pub fn new(transport: Arc<dyn ChangeFeedTransport>, lifecycle: LifecycleSource) -> Self {
        Self::from_parts(
            FeedClient::new(transport),
            lifecycle,
            Arc::new(|| Box::new(FixedDelay::default()) as Box<dyn ReconnectionStrategy>),
            None,
        )
    }

    pub fn builder(transport: Arc<dyn ChangeFeedTransport>) -> SupervisorBuilder {
        SupervisorBuilder::new(transport)
    }

    pub(crate) fn from_parts(
        client: FeedClient,
        lifecycle: LifecycleSource,
        strategy: StrategyFactory,
        metrics: Option<Arc<FeedMetrics>>,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                client,
                lifecycle,
                strategy,
                names: Arc::new(std::sync::Mutex::new(HashSet::new())),
                metrics,
            }),
        }
    }

    pub fn client(&self) -> &FeedClient {
        &self.inner.client
    }

    pub fn lifecycle(&self) -> &LifecycleSource {
        &self.inner.lifecycle
    }

    pub fn is_supervised(&self, name: &str) -> bool {
        self.inner
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn supervised_count(&self) -> usize {
        self.inner.names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn reserve(&self, name: &str) -> Result<()> {
        let mut names = self.inner.names.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(name.to_string()) {
            return Err(Error::DuplicateSubscription(name.to_string()));
        }
        Ok(())
    }

    fn release(&self, name: &str) {
        self.inner
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Open a connection for `descriptor` and keep it alive
    ///
    /// Transport failures, including a failed first subscribe, never surface
    /// here; they show up as `last_error` on the handle and are retried.
    ///
    /// # Errors
    ///
    /// - `InvalidDescriptor` if the descriptor fails validation
    /// - `DuplicateSubscription` if the name is already supervised or open
    #[tracing::instrument(
        skip(self, descriptor, handlers),
        fields(subscription = %descriptor.name(), resource = %descriptor.resource())
    )]
    pub async fn supervise<R>(
        &self,
        descriptor: SubscriptionDescriptor,
        handlers: Arc<dyn ChangeHandlers<R>>,
    ) -> Result<SupervisedHandle>
    where
        R: DeserializeOwned + Send + 'static,
    {
        descriptor.validate()?;
        let name = descriptor.name().to_string();
        self.reserve(&name)?;

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (report, report_rx) = watch::channel(HandleStatus::initial());
        let lifecycle = self.inner.lifecycle.listen();

        let mut task = HandleTask {
            foreground: lifecycle.current().is_foreground(),
            descriptor,
            handlers,
            client: self.inner.client.clone(),
            connection: None,
            generation: 0,
            recovering: false,
            status_tx,
            state: SupervisionState::new((self.inner.strategy)()),
            lifecycle,
            report,
            names: self.inner.names.clone(),
            metrics: self.inner.metrics.clone(),
        };

        if let Err(e) = task.open_next().await {
            self.release(&name);
            return Err(e);
        }

        if let Some(metrics) = &self.inner.metrics {
            metrics.handle_started();
        }
        tokio::spawn(task.run(command_rx, status_rx).in_current_span());
        tracing::info!("Supervising subscription");

        Ok(SupervisedHandle {
            name,
            commands: command_tx,
            status: report_rx,
        })
    }

    /// Stop supervising and close the handle's connection
    ///
    /// Cancels any pending reconnect. Returns once the connection is closed;
    /// calling it again is a no-op.
    pub async fn unsupervise(&self, handle: &SupervisedHandle) {
        let (done_tx, done_rx) = oneshot::channel();
        if handle.commands.send(Command::Stop(done_tx)).is_err() {
            tracing::debug!(subscription = %handle.name(), "Already unsupervised");
            return;
        }
        let _ = done_rx.await;
    }
}

/// Task state for one supervised handle
struct HandleTask<R> {
    descriptor: SubscriptionDescriptor,
    handlers: Arc<dyn ChangeHandlers<R>>,
    client: FeedClient,
    connection: Option<ConnectionHandle>,
    generation: u64,
    /// A reconnect was started and has not reached live yet
    recovering: bool,
    status_tx: mpsc::UnboundedSender<(u64, ConnectionStatusChange)>,
    state: SupervisionState,
    lifecycle: LifecycleListener,
    foreground: bool,
    report: watch::Sender<HandleStatus>,
    names: NameSet,
    metrics: Option<Arc<FeedMetrics>>,
}

impl<R> HandleTask<R>
where
    R: DeserializeOwned + Send + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut statuses: mpsc::UnboundedReceiver<(u64, ConnectionStatusChange)>,
    ) {
        let mut lifecycle_open = true;

        loop {
            let deadline = self.state.deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Reconnect) => self.on_manual_reconnect().await,
                    Some(Command::Stop(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some((generation, change)) = statuses.recv() => self.on_status(generation, change).await,
                changed = self.lifecycle.changed(), if lifecycle_open => match changed {
                    Some(lifecycle) => self.on_lifecycle(lifecycle).await,
                    None => lifecycle_open = false,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timer().await
                }
            }
        }
    }

    /// Open the next generation of the connection
    async fn open_next(&mut self) -> Result<()> {
        self.generation += 1;
        let generation = self.generation;
        let tx = self.status_tx.clone();
        let listener: StatusListener = Arc::new(move |change| {
            let _ = tx.send((generation, change));
        });

        let connection = self
            .client
            .open(self.descriptor.clone(), self.handlers.clone(), Some(listener))
            .await?;
        self.connection = Some(connection);
        self.publish(|_| {});
        Ok(())
    }

    async fn reconnect(&mut self, trigger: ReconnectTrigger) {
        if let Some(metrics) = &self.metrics {
            metrics.record_reconnection_attempt(trigger);
        }
        self.recovering = true;

        if let Some(stale) = self.connection.take() {
            self.client.close(&stale).await;
        }

        tracing::info!(
            subscription = %self.descriptor.name(),
            trigger = trigger.as_str(),
            generation = self.generation + 1,
            "Reconnecting"
        );
        if let Err(e) = self.open_next().await {
            self.on_degraded(Some(e.to_string()));
        }
    }

    async fn on_status(&mut self, generation: u64, change: ConnectionStatusChange) {
        if generation != self.generation {
            tracing::trace!(generation, current = self.generation, state = %change.state, "Ignoring stale status");
            return;
        }

        match change.state {
            ConnectionState::Live => {
                self.state.on_live();
                if std::mem::take(&mut self.recovering) {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_reconnection_success();
                    }
                    tracing::info!(subscription = %self.descriptor.name(), "Reconnected");
                }
                self.publish(|status| {
                    status.connected = true;
                    status.last_error = None;
                });
            }
            ConnectionState::Degraded => self.on_degraded(change.error),
            ConnectionState::Closed => {
                self.state.on_closed();
                tracing::info!(
                    subscription = %self.descriptor.name(),
                    "Connection closed by transport, not reconnecting"
                );
                self.publish(|status| status.connected = false);
            }
            ConnectionState::Idle | ConnectionState::Connecting => {
                self.publish(|status| status.connected = false);
            }
        }
    }

    fn on_degraded(&mut self, error: Option<String>) {
        let error = error.unwrap_or_else(|| "connection degraded".to_string());

        let last_error = match self.state.on_degraded(Instant::now()) {
            Decision::Scheduled(delay) => {
                tracing::info!(
                    subscription = %self.descriptor.name(),
                    delay_ms = delay.as_millis() as u64,
                    attempt = self.state.attempts(),
                    error = %error,
                    "Reconnect scheduled"
                );
                error
            }
            Decision::GaveUp => {
                tracing::warn!(
                    subscription = %self.descriptor.name(),
                    attempts = self.state.attempts(),
                    error = %error,
                    "Giving up on reconnection"
                );
                format!("reconnection abandoned: {}", error)
            }
            _ => {
                tracing::debug!(subscription = %self.descriptor.name(), error = %error, "Reconnect already pending");
                error
            }
        };

        self.publish(|status| {
            status.connected = false;
            status.last_error = Some(last_error);
        });
    }

    async fn on_timer(&mut self) {
        // A transition may be queued behind the timer; trust the source
        self.foreground = self.lifecycle.current().is_foreground();
        match self.state.on_timer(self.foreground) {
            Decision::ReconnectNow => self.reconnect(ReconnectTrigger::Backoff).await,
            Decision::Deferred => {
                tracing::info!(
                    subscription = %self.descriptor.name(),
                    "App not active, deferring reconnect until foreground"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_deferred_reconnect();
                }
            }
            _ => {}
        }
        self.publish(|_| {});
    }

    async fn on_lifecycle(&mut self, lifecycle: AppLifecycle) {
        let was_foreground = self.foreground;
        self.foreground = lifecycle.is_foreground();

        if !was_foreground && self.foreground {
            let live = self.connection.as_ref().is_some_and(ConnectionHandle::is_live);
            if self.state.on_foreground(live) == Decision::ReconnectNow {
                self.reconnect(ReconnectTrigger::Foreground).await;
            }
        }
        self.publish(|_| {});
    }

    async fn on_manual_reconnect(&mut self) {
        if self.state.on_manual() == Decision::ReconnectNow {
            self.reconnect(ReconnectTrigger::Manual).await;
        }
        self.publish(|_| {});
    }

    async fn shutdown(&mut self) {
        self.state.stop();
        if let Some(connection) = self.connection.take() {
            self.client.close(&connection).await;
        }
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.descriptor.name());
        if let Some(metrics) = &self.metrics {
            metrics.handle_stopped();
        }
        self.publish(|status| status.connected = false);
        tracing::info!(subscription = %self.descriptor.name(), "Supervision stopped");
    }

    /// Apply `update` and refresh the phase fields of the handle's status
    fn publish(&self, update: impl FnOnce(&mut HandleStatus)) {
        let (phase, attempts, generation) = (self.state.phase(), self.state.attempts(), self.generation);
        self.report.send_modify(|status| {
            update(status);
            status.phase = phase;
            status.attempts = attempts;
            status.generation = generation;
        });
    }
}
