//! Data model shared by connections, the supervisor and screen views
//!
//! # Subscriptions
//!
//! A [`SubscriptionDescriptor`] names one logical feed: which resource
//! (table) to follow, an optional server-side filter, and the owner identity
//! used to key the connection. It is immutable; a screen whose filter
//! changes (a new visible date, say) tears down its subscription and creates
//! a new descriptor under a new name.
//!
//! # Connection lifecycle
//!
//! ```text
//! Idle → Connecting → Live
//!            ↓         ↓
//!         Degraded ←───┘      (error / timeout, recoverable)
//!
//! any state → Closed          (explicit close or transport "closed")
//! ```
//!
//! # Records
//!
//! Domain records implement [`FeedRecord`] so the reducer and the codec can
//! find their identity. Identities are strings or integers, mirroring what a
//! relational backend hands out.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Identity of a domain record
///
/// Serializes as the bare inner value so it round-trips with whatever the
/// backend uses for primary keys.
///
/// ```rust
/// use livefeed_core::RecordId;
///
/// let a: RecordId = "9b2c".into();
/// let b: RecordId = 42i64.into();
/// assert_eq!(a.to_string(), "9b2c");
/// assert_eq!(b.to_string(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric primary key
    Number(i64),
    /// String primary key (uuid, slug...)
    String(String),
}

impl RecordId {
    /// Extract an identity from a JSON value, if it holds one
    ///
    /// Accepts strings and integers. Empty strings, floats, booleans, null
    /// and containers are not identities.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(RecordId::String(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(RecordId::Number),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::String(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::String(s.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Number(n)
    }
}

impl From<i32> for RecordId {
    fn from(n: i32) -> Self {
        RecordId::Number(n.into())
    }
}

/// A domain record that can live in a view collection
pub trait FeedRecord {
    /// The record's identity; unique within a view collection
    fn record_id(&self) -> RecordId;
}

/// Immutable identity + filter tuple naming one logical subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    name: String,
    resource: String,
    filter: Option<String>,
    owner_id: String,
}

impl SubscriptionDescriptor {
    /// Create a descriptor without a filter predicate
    pub fn new(
        name: impl Into<String>,
        resource: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            filter: None,
            owner_id: owner_id.into(),
        }
    }

    /// Set the server-side filter predicate, e.g. `assigned_to=eq.42`
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Build the conventional subscription name for a screen
    ///
    /// Screens derive names from their type, the owner and the time bucket
    /// they display, so that changing the visible range yields a new name.
    ///
    /// ```rust
    /// use livefeed_core::SubscriptionDescriptor;
    ///
    /// let name = SubscriptionDescriptor::bucketed_name("daily", "u-17", "2024-05-01");
    /// assert_eq!(name, "daily-u-17-2024-05-01");
    /// ```
    pub fn bucketed_name(screen: &str, owner_id: &str, bucket: &str) -> String {
        format!("{}-{}-{}", screen, owner_id, bucket)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Check that every identifying field is present
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDescriptor("name must not be empty".into()));
        }
        if self.resource.trim().is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "resource must not be empty (subscription {})",
                self.name
            )));
        }
        if self.owner_id.trim().is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "owner id must not be empty (subscription {})",
                self.name
            )));
        }
        if matches!(self.filter.as_deref(), Some(f) if f.trim().is_empty()) {
            return Err(Error::InvalidDescriptor(format!(
                "filter must be omitted rather than empty (subscription {})",
                self.name
            )));
        }
        Ok(())
    }
}

/// State of one change-feed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not yet requested
    Idle,
    /// Subscribe call issued, no acknowledgement yet
    Connecting,
    /// Subscription acknowledged by the remote feed
    Live,
    /// An error or timeout occurred; eligible for reconnection
    Degraded,
    /// Explicitly torn down; never reconnected automatically
    Closed,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Live)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    /// Numeric encoding used by the connection-state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Live => 2,
            ConnectionState::Degraded => 3,
            ConnectionState::Closed => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Live => "live",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Status values surfaced by the remote change-feed transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TransportStatus {
    /// The subscription was acknowledged
    Subscribed,
    /// The transport failed; the string describes why
    Error(String),
    /// The subscription was not acknowledged in time, or the channel timed out
    Timeout,
    /// The transport closed the channel on purpose
    Closed,
}

impl TransportStatus {
    /// Parse a transport status tag as emitted by realtime backends
    ///
    /// Accepts both bare (`subscribed`) and channel-prefixed spellings
    /// (`CHANNEL_ERROR`, `TIMED_OUT`), case-insensitively.
    pub fn parse(tag: &str, reason: Option<&str>) -> Result<Self> {
        let normalized = tag.trim().to_ascii_lowercase();
        let normalized = normalized.strip_prefix("channel_").unwrap_or(&normalized);
        match normalized {
            "subscribed" => Ok(TransportStatus::Subscribed),
            "error" => Ok(TransportStatus::Error(
                reason.unwrap_or("transport error").to_string(),
            )),
            "timeout" | "timed_out" => Ok(TransportStatus::Timeout),
            "closed" => Ok(TransportStatus::Closed),
            other => Err(Error::Transport(format!("unknown transport status: {}", other))),
        }
    }

    /// The connection state this status moves a connection into
    pub fn target_state(&self) -> ConnectionState {
        match self {
            TransportStatus::Subscribed => ConnectionState::Live,
            TransportStatus::Error(_) | TransportStatus::Timeout => ConnectionState::Degraded,
            TransportStatus::Closed => ConnectionState::Closed,
        }
    }

    /// Human-readable error text for degraded statuses
    pub fn error_message(&self) -> Option<String> {
        match self {
            TransportStatus::Error(reason) => Some(reason.clone()),
            TransportStatus::Timeout => Some("subscription timed out".to_string()),
            _ => None,
        }
    }
}

/// Kind tag of a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parse a kind tag, ignoring case (`INSERT`, `insert`, `Insert`)
    pub fn parse(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            _ => Err(Error::UnknownChangeKind(tag.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// A typed change event for one record
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<R> {
    Insert(R),
    Update(R),
    Delete(RecordId),
}

impl<R> ChangeEvent<R> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert(_) => ChangeKind::Insert,
            ChangeEvent::Update(_) => ChangeKind::Update,
            ChangeEvent::Delete(_) => ChangeKind::Delete,
        }
    }
}

impl<R: FeedRecord> ChangeEvent<R> {
    /// Identity of the record this event concerns
    pub fn record_id(&self) -> RecordId {
        match self {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => r.record_id(),
            ChangeEvent::Delete(id) => id.clone(),
        }
    }
}

/// Application lifecycle as reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLifecycle {
    Active,
    Background,
    Inactive,
}

impl AppLifecycle {
    /// Only `Active` counts as foreground; `Inactive` suppresses reconnection
    /// the same way `Background` does.
    pub fn is_foreground(&self) -> bool {
        matches!(self, AppLifecycle::Active)
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "active" => Some(AppLifecycle::Active),
            "background" => Some(AppLifecycle::Background),
            "inactive" => Some(AppLifecycle::Inactive),
            _ => None,
        }
    }
}

/// Report of a connection changing state, handed to status listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatusChange {
    /// Name of the subscription whose connection changed
    pub name: String,
    /// The state the connection moved into
    pub state: ConnectionState,
    /// Error text for degraded transitions
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_from_json() {
        assert_eq!(RecordId::from_json(&json!(7)), Some(RecordId::Number(7)));
        assert_eq!(RecordId::from_json(&json!("a1")), Some(RecordId::String("a1".into())));
        assert_eq!(RecordId::from_json(&json!("")), None);
        assert_eq!(RecordId::from_json(&json!(1.5)), None);
        assert_eq!(RecordId::from_json(&json!(null)), None);
        assert_eq!(RecordId::from_json(&json!({"id": 1})), None);
    }

    #[test]
    fn test_record_id_serialization() {
        let id: RecordId = 12i64.into();
        assert_eq!(serde_json::to_string(&id).unwrap(), "12");
        let id: RecordId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id, RecordId::String("abc".into()));
    }

    #[test]
    fn test_descriptor_validation() {
        let ok = SubscriptionDescriptor::new("daily-1", "tasks", "1").with_filter("assigned_to=eq.1");
        assert!(ok.validate().is_ok());
        assert_eq!(ok.filter(), Some("assigned_to=eq.1"));

        let no_name = SubscriptionDescriptor::new(" ", "tasks", "1");
        assert!(matches!(no_name.validate(), Err(Error::InvalidDescriptor(_))));

        let no_resource = SubscriptionDescriptor::new("n", "", "1");
        assert!(matches!(no_resource.validate(), Err(Error::InvalidDescriptor(_))));

        let no_owner = SubscriptionDescriptor::new("n", "tasks", "");
        assert!(matches!(no_owner.validate(), Err(Error::InvalidDescriptor(_))));

        let empty_filter = SubscriptionDescriptor::new("n", "tasks", "1").with_filter("");
        assert!(matches!(empty_filter.validate(), Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn test_transport_status_parse() {
        assert_eq!(TransportStatus::parse("SUBSCRIBED", None).unwrap(), TransportStatus::Subscribed);
        assert_eq!(TransportStatus::parse("TIMED_OUT", None).unwrap(), TransportStatus::Timeout);
        assert_eq!(TransportStatus::parse("timeout", None).unwrap(), TransportStatus::Timeout);
        assert_eq!(TransportStatus::parse("closed", None).unwrap(), TransportStatus::Closed);
        assert_eq!(
            TransportStatus::parse("CHANNEL_ERROR", Some("jwt expired")).unwrap(),
            TransportStatus::Error("jwt expired".into())
        );
        assert!(TransportStatus::parse("joining", None).is_err());
    }

    #[test]
    fn test_transport_status_targets() {
        assert_eq!(TransportStatus::Subscribed.target_state(), ConnectionState::Live);
        assert_eq!(TransportStatus::Timeout.target_state(), ConnectionState::Degraded);
        assert_eq!(TransportStatus::Error("x".into()).target_state(), ConnectionState::Degraded);
        assert_eq!(TransportStatus::Closed.target_state(), ConnectionState::Closed);
        assert_eq!(TransportStatus::Closed.error_message(), None);
        assert_eq!(
            TransportStatus::Timeout.error_message().as_deref(),
            Some("subscription timed out")
        );
    }

    #[test]
    fn test_change_kind_parse() {
        assert_eq!(ChangeKind::parse("INSERT").unwrap(), ChangeKind::Insert);
        assert_eq!(ChangeKind::parse("update").unwrap(), ChangeKind::Update);
        assert_eq!(ChangeKind::parse(" Delete ").unwrap(), ChangeKind::Delete);
        assert_eq!(
            ChangeKind::parse("truncate").unwrap_err(),
            Error::UnknownChangeKind("truncate".into())
        );
    }

    #[test]
    fn test_lifecycle() {
        assert!(AppLifecycle::Active.is_foreground());
        assert!(!AppLifecycle::Background.is_foreground());
        assert!(!AppLifecycle::Inactive.is_foreground());
        assert_eq!(AppLifecycle::parse("Background"), Some(AppLifecycle::Background));
        assert_eq!(AppLifecycle::parse("suspended"), None);
    }
}
