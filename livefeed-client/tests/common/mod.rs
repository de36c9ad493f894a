//! Common test utilities for livefeed-client integration tests
//!
//! Tests run on a paused tokio clock: sleeping advances virtual time once
//! every task is idle, so backoff timers fire without real waiting.

#![allow(dead_code)]

use livefeed_client::{ChangeHandlers, MemoryTransport, ReconnectionSupervisor, LifecycleSource};
use livefeed_core::{ChangeEvent, FeedRecord, RawChangeEvent, RecordId, SubscriptionDescriptor};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay of the default reconnection strategy
pub const BACKOFF: Duration = Duration::from_secs(5);

/// A scheduled task row as the feed delivers it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub scheduled_date: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

impl FeedRecord for Task {
    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}

pub fn task_json(id: i64, title: &str, date: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "scheduled_date": date,
        "assigned_to": "coach-1"
    })
}

pub fn insert(id: i64, title: &str, date: &str) -> RawChangeEvent {
    RawChangeEvent::insert("tasks", task_json(id, title, date))
}

pub fn update(id: i64, title: &str, date: &str) -> RawChangeEvent {
    RawChangeEvent::update("tasks", task_json(id, title, date))
}

pub fn delete(id: i64) -> RawChangeEvent {
    RawChangeEvent::delete("tasks", id)
}

/// Descriptor for a daily view of `tasks`
pub fn daily(date: &str) -> SubscriptionDescriptor {
    let name = SubscriptionDescriptor::bucketed_name("daily", "coach-1", date);
    SubscriptionDescriptor::new(name, "tasks", "coach-1").with_filter("assigned_to=eq.coach-1")
}

/// Handlers that forward every event to a channel
pub fn channel_handlers() -> (Arc<dyn ChangeHandlers<Task>>, mpsc::UnboundedReceiver<ChangeEvent<Task>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

/// Drain whatever events have arrived so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ChangeEvent<Task>>) -> Vec<ChangeEvent<Task>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Let spawned tasks process everything queued
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Advance virtual time by `duration` and let tasks settle
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

pub fn supervisor(transport: &MemoryTransport, lifecycle: &LifecycleSource) -> ReconnectionSupervisor {
    ReconnectionSupervisor::new(Arc::new(transport.clone()), lifecycle.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_json_decodes() {
        let task: Task = serde_json::from_value(task_json(3, "Warm-up", "2024-05-01")).unwrap();
        assert_eq!(task.record_id(), RecordId::from(3));
        assert_eq!(task.assigned_to.as_deref(), Some("coach-1"));
    }

    #[test]
    fn test_daily_descriptor_name() {
        let descriptor = daily("2024-05-01");
        assert_eq!(descriptor.name(), "daily-coach-1-2024-05-01");
        assert!(descriptor.validate().is_ok());
    }
}
