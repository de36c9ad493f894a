//! In-process change feed
//!
//! `MemoryTransport` behaves like a realtime backend living in the same
//! process: subscriptions are acknowledged (immediately, or when the test
//! says so), published rows fan out to every subscription on the same
//! resource, and statuses can be injected per subscription name to simulate
//! errors, timeouts and server-side closes.

use crate::transport::{ChangeFeedTransport, FeedSink, TransportHandle};
use async_trait::async_trait;
use livefeed_core::{Error, RawChangeEvent, Result, SubscriptionDescriptor, TransportStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct MemorySubscription {
    descriptor: SubscriptionDescriptor,
    sink: FeedSink,
}

struct MemoryState {
    next_id: u64,
    auto_ack: bool,
    fail_next: u32,
    subscriptions: BTreeMap<u64, MemorySubscription>,
    subscribe_log: Vec<String>,
    unsubscribe_calls: usize,
}

/// Cloneable in-memory [`ChangeFeedTransport`]; clones share one feed
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// A transport that acknowledges every subscription right away
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                next_id: 1,
                auto_ack: true,
                fail_next: 0,
                subscriptions: BTreeMap::new(),
                subscribe_log: Vec::new(),
                unsubscribe_calls: 0,
            })),
        }
    }

    /// A transport that leaves subscriptions unacknowledged until
    /// [`acknowledge`](Self::acknowledge) is called
    pub fn manual_ack() -> Self {
        let transport = Self::new();
        transport.lock().auto_ack = false;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` subscribe calls fail outright
    pub fn fail_next_subscribes(&self, count: u32) {
        self.lock().fail_next = count;
    }

    /// Push a change to every subscription on `event.resource`
    ///
    /// Returns how many subscriptions it was delivered to.
    pub fn publish(&self, event: RawChangeEvent) -> usize {
        let state = self.lock();
        state
            .subscriptions
            .values()
            .filter(|sub| sub.descriptor.resource() == event.resource)
            .filter(|sub| sub.sink.event(event.clone()))
            .count()
    }

    /// Push an event to one named subscription regardless of its resource
    pub fn deliver(&self, name: &str, event: RawChangeEvent) -> bool {
        self.with_latest(name, |sink| sink.event(event))
    }

    /// Push a status to the most recent subscription called `name`
    pub fn send_status(&self, name: &str, status: TransportStatus) -> bool {
        self.with_latest(name, |sink| sink.status(status))
    }

    pub fn acknowledge(&self, name: &str) -> bool {
        self.send_status(name, TransportStatus::Subscribed)
    }

    pub fn fail(&self, name: &str, reason: impl Into<String>) -> bool {
        self.send_status(name, TransportStatus::Error(reason.into()))
    }

    /// Fail every active subscription at once, as a dropped socket would
    pub fn fail_all(&self, reason: &str) -> usize {
        let state = self.lock();
        state
            .subscriptions
            .values()
            .filter(|sub| sub.sink.status(TransportStatus::Error(reason.to_string())))
            .count()
    }

    fn with_latest(&self, name: &str, send: impl FnOnce(&FeedSink) -> bool) -> bool {
        let state = self.lock();
        state
            .subscriptions
            .values()
            .rev()
            .find(|sub| sub.descriptor.name() == name)
            .map(|sub| send(&sub.sink))
            .unwrap_or(false)
    }

    /// Total subscribe calls, including failed ones
    pub fn subscribe_count(&self) -> usize {
        self.lock().subscribe_log.len()
    }

    /// Subscribe calls made for `name`, including failed ones
    pub fn subscribe_count_for(&self, name: &str) -> usize {
        self.lock().subscribe_log.iter().filter(|n| n.as_str() == name).count()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.lock().unsubscribe_calls
    }

    /// Names of the subscriptions currently held, oldest first
    pub fn active_subscriptions(&self) -> Vec<String> {
        self.lock()
            .subscriptions
            .values()
            .map(|sub| sub.descriptor.name().to_string())
            .collect()
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.lock()
            .subscriptions
            .values()
            .any(|sub| sub.descriptor.name() == name)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeedTransport for MemoryTransport {
    async fn subscribe(&self, descriptor: &SubscriptionDescriptor, sink: FeedSink) -> Result<TransportHandle> {
        let mut state = self.lock();
        state.subscribe_log.push(descriptor.name().to_string());

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(Error::Transport(format!(
                "subscribe refused for {}",
                descriptor.name()
            )));
        }

        let id = state.next_id;
        state.next_id += 1;

        if state.auto_ack {
            sink.status(TransportStatus::Subscribed);
        }
        state.subscriptions.insert(
            id,
            MemorySubscription {
                descriptor: descriptor.clone(),
                sink,
            },
        );

        tracing::trace!(subscription = %descriptor.name(), handle = id, "memory subscription added");
        Ok(TransportHandle(id))
    }

    async fn unsubscribe(&self, handle: TransportHandle) -> Result<()> {
        let mut state = self.lock();
        state.unsubscribe_calls += 1;
        state.subscriptions.remove(&handle.0);
        Ok(())
    }
}
