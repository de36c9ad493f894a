//! Boundary to the remote change-feed service
//!
//! A [`ChangeFeedTransport`] turns a subscription descriptor into a stream of
//! [`TransportSignal`]s pushed into a [`FeedSink`]. Events and statuses for
//! one subscription share a single channel, so the order the transport
//! produced them in is the order the connection sees them in.
//!
//! The crate ships [`MemoryTransport`](crate::MemoryTransport) for tests and
//! demos; production apps wrap their realtime backend's client in this trait.

use async_trait::async_trait;
use livefeed_core::{RawChangeEvent, Result, SubscriptionDescriptor, TransportStatus};
use std::fmt;
use tokio::sync::mpsc;

/// Opaque id a transport hands back for one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportHandle(pub u64);

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Something the transport pushes for a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Event(RawChangeEvent),
    Status(TransportStatus),
}

/// Sending half handed to the transport for one subscription
///
/// Sends never block. They return `false` once the connection that owns the
/// receiving half is gone, which a transport may use to drop the
/// subscription on its side.
#[derive(Debug, Clone)]
pub struct FeedSink {
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl FeedSink {
    /// Create a sink together with its receiving half
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn event(&self, event: RawChangeEvent) -> bool {
        self.tx.send(TransportSignal::Event(event)).is_ok()
    }

    pub fn status(&self, status: TransportStatus) -> bool {
        self.tx.send(TransportSignal::Status(status)).is_ok()
    }

    /// Returns true if the receiving connection has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A remote change feed
///
/// `subscribe` only issues the request. Acknowledgement arrives later as
/// `TransportStatus::Subscribed` on the sink, and failures after that point
/// arrive as `Error`, `Timeout` or `Closed` statuses. An `Err` from
/// `subscribe` itself means the request could not be issued at all.
#[async_trait]
pub trait ChangeFeedTransport: Send + Sync {
    async fn subscribe(&self, descriptor: &SubscriptionDescriptor, sink: FeedSink) -> Result<TransportHandle>;

    /// Release a subscription; unknown handles are ignored
    async fn unsubscribe(&self, handle: TransportHandle) -> Result<()>;
}
