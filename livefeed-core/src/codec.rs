//! Decoding of raw change-feed payloads into typed change events
//!
//! The transport hands over a [`RawChangeEvent`]: a resource name, a kind
//! tag and the affected record as loose JSON. This module turns it into a
//! [`ChangeEvent<R>`] for the screen's record type, or an error describing
//! why the payload cannot be applied.
//!
//! # Identity rules
//!
//! - Insert and update payloads carry the new row in `record`; it must
//!   deserialize into `R`.
//! - Delete payloads usually carry only the old row's key. The identity is
//!   read from `old_record.id`, falling back to `record.id`, and finally to
//!   an `old_record` that is itself a bare id.
//!
//! # Examples
//!
//! ```rust
//! use livefeed_core::{codec, ChangeEvent, FeedRecord, RecordId};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Task { id: i64, title: String }
//!
//! impl FeedRecord for Task {
//!     fn record_id(&self) -> RecordId { self.id.into() }
//! }
//!
//! let raw = codec::decode_raw(r#"{"resource":"tasks","kind":"DELETE","old_record":{"id":3}}"#).unwrap();
//! let event: ChangeEvent<Task> = codec::decode_event(raw).unwrap();
//! assert_eq!(event.record_id(), RecordId::Number(3));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ChangeEvent, ChangeKind, RecordId};

/// Field name holding a record's identity in raw payloads
pub const ID_FIELD: &str = "id";

/// A change event as delivered by the transport, before typing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChangeEvent {
    /// Table / collection the change happened in
    pub resource: String,
    /// Kind tag; expected to be insert, update or delete in any case
    #[serde(alias = "eventType", alias = "type")]
    pub kind: String,
    /// New row for inserts and updates
    #[serde(default, alias = "new", skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
    /// Previous row (or just its key) for updates and deletes
    #[serde(default, alias = "old", skip_serializing_if = "Option::is_none")]
    pub old_record: Option<serde_json::Value>,
}

impl RawChangeEvent {
    pub fn insert(resource: impl Into<String>, record: serde_json::Value) -> Self {
        Self {
            resource: resource.into(),
            kind: ChangeKind::Insert.as_str().to_string(),
            record: Some(record),
            old_record: None,
        }
    }

    pub fn update(resource: impl Into<String>, record: serde_json::Value) -> Self {
        Self {
            resource: resource.into(),
            kind: ChangeKind::Update.as_str().to_string(),
            record: Some(record),
            old_record: None,
        }
    }

    pub fn delete(resource: impl Into<String>, id: impl Into<RecordId>) -> Self {
        let id: RecordId = id.into();
        Self {
            resource: resource.into(),
            kind: ChangeKind::Delete.as_str().to_string(),
            record: None,
            old_record: Some(serde_json::json!({ "id": id })),
        }
    }

    /// Parsed kind tag
    pub fn change_kind(&self) -> Result<ChangeKind> {
        ChangeKind::parse(&self.kind)
    }

    /// Identity of the affected row, wherever the payload put it
    pub fn record_id(&self) -> Option<RecordId> {
        let from_field = |value: &Option<serde_json::Value>| {
            value
                .as_ref()
                .and_then(|v| v.get(ID_FIELD))
                .and_then(RecordId::from_json)
        };
        from_field(&self.old_record)
            .or_else(|| from_field(&self.record))
            .or_else(|| self.old_record.as_ref().and_then(RecordId::from_json))
    }
}

/// Decode raw payload text into a [`RawChangeEvent`]
pub fn decode_raw(text: &str) -> Result<RawChangeEvent> {
    serde_json::from_str(text).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a raw event to JSON text
pub fn encode_raw(event: &RawChangeEvent) -> Result<String> {
    serde_json::to_string(event).map_err(|e| Error::Serialization(e.to_string()))
}

/// Type a raw event for record type `R`
///
/// # Errors
///
/// - `UnknownChangeKind` if the kind tag is not insert/update/delete
/// - `MalformedEvent` if the record or identity needed for the kind is
///   missing, or the record does not deserialize into `R`
pub fn decode_event<R: DeserializeOwned>(raw: RawChangeEvent) -> Result<ChangeEvent<R>> {
    let kind = raw.change_kind()?;
    match kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let record = raw.record.ok_or_else(|| {
                Error::MalformedEvent(format!("{} on {} without record", kind.as_str(), raw.resource))
            })?;
            if record.get(ID_FIELD).and_then(RecordId::from_json).is_none() {
                return Err(Error::MalformedEvent(format!(
                    "{} on {} without identity field",
                    kind.as_str(),
                    raw.resource
                )));
            }
            let typed: R = serde_json::from_value(record).map_err(|e| {
                Error::MalformedEvent(format!("{} on {}: {}", kind.as_str(), raw.resource, e))
            })?;
            Ok(match kind {
                ChangeKind::Insert => ChangeEvent::Insert(typed),
                _ => ChangeEvent::Update(typed),
            })
        }
        ChangeKind::Delete => {
            let id = raw.record_id().ok_or_else(|| {
                Error::MalformedEvent(format!("delete on {} without identity field", raw.resource))
            })?;
            Ok(ChangeEvent::Delete(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeedRecord;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Task {
        id: i64,
        title: String,
    }

    impl FeedRecord for Task {
        fn record_id(&self) -> RecordId {
            self.id.into()
        }
    }

    #[test]
    fn test_decode_insert() {
        let raw = RawChangeEvent::insert("tasks", json!({"id": 1, "title": "Algebra"}));
        let event: ChangeEvent<Task> = decode_event(raw).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Insert(Task {
                id: 1,
                title: "Algebra".into()
            })
        );
    }

    #[test]
    fn test_decode_update_with_uppercase_kind() {
        let raw = decode_raw(
            r#"{"resource":"tasks","eventType":"UPDATE","new":{"id":2,"title":"Physics"},"old":{"id":2}}"#,
        )
        .unwrap();
        let event: ChangeEvent<Task> = decode_event(raw).unwrap();
        assert_eq!(event.kind(), ChangeKind::Update);
        assert_eq!(event.record_id(), RecordId::Number(2));
    }

    #[test]
    fn test_decode_delete_identity_sources() {
        let raw = RawChangeEvent::delete("tasks", 5i64);
        let event: ChangeEvent<Task> = decode_event(raw).unwrap();
        assert_eq!(event, ChangeEvent::Delete(RecordId::Number(5)));

        let raw = RawChangeEvent {
            resource: "tasks".into(),
            kind: "delete".into(),
            record: Some(json!({"id": "x-1"})),
            old_record: None,
        };
        assert_eq!(raw.record_id(), Some(RecordId::String("x-1".into())));

        let raw = RawChangeEvent {
            resource: "tasks".into(),
            kind: "delete".into(),
            record: None,
            old_record: Some(json!(9)),
        };
        assert_eq!(raw.record_id(), Some(RecordId::Number(9)));
    }

    #[test]
    fn test_decode_delete_without_identity() {
        let raw = RawChangeEvent {
            resource: "tasks".into(),
            kind: "delete".into(),
            record: None,
            old_record: Some(json!({})),
        };
        let err = decode_event::<Task>(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let raw = RawChangeEvent {
            resource: "tasks".into(),
            kind: "TRUNCATE".into(),
            record: None,
            old_record: None,
        };
        let err = decode_event::<Task>(raw).unwrap_err();
        assert_eq!(err, Error::UnknownChangeKind("TRUNCATE".into()));
    }

    #[test]
    fn test_decode_insert_missing_identity() {
        let raw = RawChangeEvent::insert("tasks", json!({"title": "No id"}));
        let err = decode_event::<Task>(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedEvent(msg) if msg.contains("identity")));
    }

    #[test]
    fn test_decode_insert_wrong_shape() {
        let raw = RawChangeEvent::insert("tasks", json!({"id": 3, "title": 12}));
        let err = decode_event::<Task>(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_raw_rejects_garbage() {
        assert!(matches!(decode_raw("not json"), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_encode_raw_skips_empty_fields() {
        let raw = RawChangeEvent::delete("tasks", "t-1");
        let text = encode_raw(&raw).unwrap();
        assert!(text.contains("\"old_record\""));
        assert!(!text.contains("\"record\""));
        assert_eq!(decode_raw(&text).unwrap(), raw);
    }
}
