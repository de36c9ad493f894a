//! Daily schedule example
//!
//! A coach's "today" screen kept current by a supervised change feed, plus a
//! chat feed whose notifications respect the focused screen. The in-memory
//! transport stands in for the real socket so failures can be injected.
//!
//! Run with: cargo run --example daily_schedule

use livefeed::client::{FixedDelay, FnHandlers, SupervisorBuilder};
use livefeed::core::focus::{FocusContext, FocusedScreen, IncomingNotification, NotificationGate};
use livefeed::core::{AppLifecycle, FeedRecord, RawChangeEvent, RecordId};
use livefeed::{LifecycleSource, MemoryTransport, SharedView, SubscriptionDescriptor, ViewCollection};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
struct Task {
    id: i64,
    title: String,
    scheduled_date: String,
}

impl FeedRecord for Task {
    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Message {
    conversation_id: String,
    body: String,
}

const TODAY: &str = "2024-05-01";

fn task(id: i64, title: &str, date: &str) -> RawChangeEvent {
    RawChangeEvent::insert(
        "tasks",
        serde_json::json!({ "id": id, "title": title, "scheduled_date": date }),
    )
}

fn print_schedule(view: &SharedView<Task>) {
    let titles: Vec<_> = view.snapshot().into_iter().map(|t| t.title).collect();
    println!("  today ({} items): {:?}", titles.len(), titles);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let transport = MemoryTransport::new();
    let lifecycle = LifecycleSource::default();
    let supervisor = SupervisorBuilder::new(Arc::new(transport.clone()))
        .with_lifecycle(lifecycle.clone())
        .with_reconnect(FixedDelay::new(Duration::from_millis(500)))
        .build()?;

    // Today's schedule, sorted by title
    let today = SharedView::new(
        ViewCollection::new(|t: &Task| t.scheduled_date == TODAY)
            .with_sort_by(|a: &Task, b: &Task| a.title.cmp(&b.title)),
    );
    let schedule_name = SubscriptionDescriptor::bucketed_name("daily", "coach-1", TODAY);
    let schedule = supervisor
        .supervise(
            SubscriptionDescriptor::new(schedule_name, "tasks", "coach-1").with_filter("assigned_to=eq.coach-1"),
            today.handlers(),
        )
        .await?;

    // Chat messages, presented unless their conversation is on screen
    let focus = FocusContext::new();
    let gate = NotificationGate::new().with_chat_list_tab("chats");
    let chat_focus = focus.clone();
    let chat_handlers = FnHandlers::<Message>::new()
        .on_insert(move |msg| {
            let notification = IncomingNotification::chat_message(msg.conversation_id, msg.body);
            if gate.should_present(&chat_focus.current(), &notification) {
                println!("  notify: {}", notification.title);
            } else {
                println!("  (suppressed: {})", notification.title);
            }
        })
        .into_shared();
    let chat = supervisor
        .supervise(SubscriptionDescriptor::new("chat-coach-1", "messages", "coach-1"), chat_handlers)
        .await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("Connected: schedule={} chat={}", schedule.is_connected(), chat.is_connected());

    println!("\nInitial events:");
    transport.publish(task(1, "Sprints", TODAY));
    transport.publish(task(2, "Long run", "2024-05-02"));
    transport.publish(task(3, "Mobility", TODAY));
    tokio::time::sleep(Duration::from_millis(50)).await;
    print_schedule(&today);

    println!("\nChat while the conversation is open:");
    focus.focus(FocusedScreen::Conversation("conv-7".into()));
    transport.publish(RawChangeEvent::insert(
        "messages",
        serde_json::json!({ "id": 10, "conversation_id": "conv-7", "body": "See you at 7" }),
    ));
    transport.publish(RawChangeEvent::insert(
        "messages",
        serde_json::json!({ "id": 11, "conversation_id": "conv-9", "body": "Running late" }),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("\nSocket drops while active:");
    transport.fail_all("socket reset");
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("  schedule connected={} error={:?}", schedule.is_connected(), schedule.last_error());
    schedule.wait_until(|s| s.connected).await?;
    println!("  reconnected after backoff (generation {})", schedule.status().generation);

    println!("\nSocket drops while backgrounded:");
    lifecycle.set(AppLifecycle::Background);
    transport.fail_all("network lost");
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("  schedule phase={:?} connected={}", schedule.status().phase, schedule.is_connected());

    lifecycle.set(AppLifecycle::Active);
    schedule.wait_until(|s| s.connected).await?;
    chat.wait_until(|s| s.connected).await?;
    println!("  back in foreground, reconnected (generation {})", schedule.status().generation);

    transport.publish(task(4, "Cool-down", TODAY));
    transport.publish(RawChangeEvent::delete("tasks", 1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    print_schedule(&today);

    supervisor.unsupervise(&chat).await;
    supervisor.unsupervise(&schedule).await;
    println!("\nStopped; active subscriptions: {:?}", transport.active_subscriptions());

    Ok(())
}
