//! Focused-screen context for in-app notification suppression
//!
//! The screen that currently has focus is an injected value rather than a
//! global: whoever needs it (the notification presenter, a chat screen)
//! gets a [`FocusContext`] handle. Cloning the handle shares the same value.
//!
//! [`NotificationGate`] reads it to decide whether an incoming notification
//! should be shown. A chat message is not shown while its conversation is on
//! screen, or while the chat list tab is focused; everything else is.
//!
//! ```rust
//! use livefeed_core::focus::{FocusContext, FocusedScreen, IncomingNotification, NotificationGate};
//!
//! let focus = FocusContext::new();
//! let gate = NotificationGate::new().with_chat_list_tab("chats");
//! let msg = IncomingNotification::chat_message("conv-7", "New message");
//!
//! assert!(gate.should_present(&focus.current(), &msg));
//! focus.focus(FocusedScreen::Conversation("conv-7".into()));
//! assert!(!gate.should_present(&focus.current(), &msg));
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// What the user is looking at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FocusedScreen {
    /// Nothing in particular (app starting, modal, unknown)
    #[default]
    Unfocused,
    /// A top-level tab, by name
    Tab(String),
    /// An open conversation, by conversation id
    Conversation(String),
}

/// Shared, observable focused-screen value
#[derive(Debug, Clone)]
pub struct FocusContext {
    tx: Arc<watch::Sender<FocusedScreen>>,
}

impl FocusContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(FocusedScreen::Unfocused);
        Self { tx: Arc::new(tx) }
    }

    /// Record that `screen` now has focus
    pub fn focus(&self, screen: FocusedScreen) {
        self.tx.send_if_modified(|current| {
            if *current == screen {
                false
            } else {
                *current = screen;
                true
            }
        });
    }

    /// Clear focus, e.g. when the focused screen unmounts
    pub fn blur(&self) {
        self.focus(FocusedScreen::Unfocused);
    }

    pub fn current(&self) -> FocusedScreen {
        self.tx.borrow().clone()
    }

    /// Observe focus changes
    pub fn subscribe(&self) -> watch::Receiver<FocusedScreen> {
        self.tx.subscribe()
    }
}

impl Default for FocusContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Category of an in-app notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ChatMessage,
    IncomingCall,
    TaskReminder,
    ExamResult,
    Other,
}

/// A notification about to be presented to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingNotification {
    pub kind: NotificationKind,
    /// Conversation the notification belongs to, for chat messages
    pub conversation_id: Option<String>,
    pub title: String,
}

impl IncomingNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            conversation_id: None,
            title: title.into(),
        }
    }

    pub fn chat_message(conversation_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::ChatMessage,
            conversation_id: Some(conversation_id.into()),
            title: title.into(),
        }
    }
}

/// Decides whether a notification should be shown given the focused screen
#[derive(Debug, Clone, Default)]
pub struct NotificationGate {
    chat_list_tab: Option<String>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the tab listing conversations; chat messages are not shown
    /// while it is focused
    pub fn with_chat_list_tab(mut self, tab: impl Into<String>) -> Self {
        self.chat_list_tab = Some(tab.into());
        self
    }

    pub fn should_present(&self, focus: &FocusedScreen, notification: &IncomingNotification) -> bool {
        if notification.kind != NotificationKind::ChatMessage {
            return true;
        }
        match focus {
            FocusedScreen::Conversation(open) => notification.conversation_id.as_deref() != Some(open.as_str()),
            FocusedScreen::Tab(tab) => self.chat_list_tab.as_deref() != Some(tab.as_str()),
            FocusedScreen::Unfocused => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_conversation_is_presented() {
        let gate = NotificationGate::new();
        let focus = FocusedScreen::Conversation("a".into());
        assert!(gate.should_present(&focus, &IncomingNotification::chat_message("b", "hi")));
        assert!(!gate.should_present(&focus, &IncomingNotification::chat_message("a", "hi")));
    }

    #[test]
    fn test_chat_list_tab_suppresses_messages_only() {
        let gate = NotificationGate::new().with_chat_list_tab("chats");
        let on_list = FocusedScreen::Tab("chats".into());
        let on_home = FocusedScreen::Tab("home".into());

        assert!(!gate.should_present(&on_list, &IncomingNotification::chat_message("a", "hi")));
        assert!(gate.should_present(&on_home, &IncomingNotification::chat_message("a", "hi")));
        assert!(gate.should_present(
            &on_list,
            &IncomingNotification::new(NotificationKind::IncomingCall, "Call from coach")
        ));
    }

    #[test]
    fn test_calls_always_presented() {
        let gate = NotificationGate::new();
        let focus = FocusedScreen::Conversation("a".into());
        let mut call = IncomingNotification::new(NotificationKind::IncomingCall, "Video call");
        call.conversation_id = Some("a".into());
        assert!(gate.should_present(&focus, &call));
    }

    #[test]
    fn test_focus_context_shared_between_clones() {
        let focus = FocusContext::new();
        let other = focus.clone();
        let mut rx = focus.subscribe();

        other.focus(FocusedScreen::Tab("schedule".into()));
        assert_eq!(focus.current(), FocusedScreen::Tab("schedule".into()));
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        // Re-focusing the same screen is not a change
        other.focus(FocusedScreen::Tab("schedule".into()));
        assert!(!rx.has_changed().unwrap());

        focus.blur();
        assert_eq!(other.current(), FocusedScreen::Unfocused);
    }
}
