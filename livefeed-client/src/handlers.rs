//! Change handlers
//!
//! A connection hands every decoded change to a [`ChangeHandlers`]
//! implementation, one call per event, in transport order. Three
//! implementations come with the crate:
//!
//! - [`FnHandlers`]: a record of closures, one per change kind
//! - `mpsc::UnboundedSender<ChangeEvent<R>>`: forwards tagged events to a
//!   channel, for callers that prefer to consume a stream
//! - [`SharedView`](crate::SharedView): folds events straight into a view
//!   collection
//!
//! # Examples
//!
//! ```rust
//! use livefeed_client::FnHandlers;
//! use livefeed_core::{FeedRecord, RecordId};
//!
//! #[derive(Clone, serde::Deserialize)]
//! struct Message { id: String, body: String }
//!
//! impl FeedRecord for Message {
//!     fn record_id(&self) -> RecordId { self.id.as_str().into() }
//! }
//!
//! let handlers = FnHandlers::<Message>::new()
//!     .on_insert(|m| println!("new message: {}", m.body))
//!     .on_delete(|id| println!("message {} removed", id));
//! ```

use livefeed_core::{ChangeEvent, RecordId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiver of typed change events for one subscription
///
/// Calls are sequential for a given connection; an implementation never sees
/// two events of the same feed at once.
pub trait ChangeHandlers<R>: Send + Sync {
    fn on_insert(&self, record: R);
    fn on_update(&self, record: R);
    fn on_delete(&self, id: RecordId);

    /// Route an event to the matching callback
    fn dispatch(&self, event: ChangeEvent<R>) {
        match event {
            ChangeEvent::Insert(record) => self.on_insert(record),
            ChangeEvent::Update(record) => self.on_update(record),
            ChangeEvent::Delete(id) => self.on_delete(id),
        }
    }
}

type RecordFn<R> = Arc<dyn Fn(R) + Send + Sync>;
type DeleteFn = Arc<dyn Fn(RecordId) + Send + Sync>;

/// Handlers built from closures; kinds without a closure are ignored
pub struct FnHandlers<R> {
    insert: Option<RecordFn<R>>,
    update: Option<RecordFn<R>>,
    delete: Option<DeleteFn>,
}

impl<R> FnHandlers<R> {
    pub fn new() -> Self {
        Self {
            insert: None,
            update: None,
            delete: None,
        }
    }

    pub fn on_insert<F>(mut self, f: F) -> Self
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        self.insert = Some(Arc::new(f));
        self
    }

    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(f));
        self
    }

    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(RecordId) + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(f));
        self
    }

    /// Wrap into the shared form `open` and `supervise` take
    pub fn into_shared(self) -> Arc<dyn ChangeHandlers<R>>
    where
        R: 'static,
    {
        Arc::new(self)
    }
}

impl<R> Default for FnHandlers<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for FnHandlers<R> {
    fn clone(&self) -> Self {
        Self {
            insert: self.insert.clone(),
            update: self.update.clone(),
            delete: self.delete.clone(),
        }
    }
}

impl<R> ChangeHandlers<R> for FnHandlers<R> {
    fn on_insert(&self, record: R) {
        if let Some(f) = &self.insert {
            f(record);
        }
    }

    fn on_update(&self, record: R) {
        if let Some(f) = &self.update {
            f(record);
        }
    }

    fn on_delete(&self, id: RecordId) {
        if let Some(f) = &self.delete {
            f(id);
        }
    }
}

impl<R: Send> ChangeHandlers<R> for mpsc::UnboundedSender<ChangeEvent<R>> {
    fn on_insert(&self, record: R) {
        self.dispatch(ChangeEvent::Insert(record));
    }

    fn on_update(&self, record: R) {
        self.dispatch(ChangeEvent::Update(record));
    }

    fn on_delete(&self, id: RecordId) {
        self.dispatch(ChangeEvent::Delete(id));
    }

    fn dispatch(&self, event: ChangeEvent<R>) {
        if self.send(event).is_err() {
            tracing::trace!("change receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fn_handlers_route_by_kind() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (s1, s2, s3) = (seen.clone(), seen.clone(), seen.clone());

        let handlers = FnHandlers::<i64>::new()
            .on_insert(move |r| s1.lock().unwrap().push(format!("insert {}", r)))
            .on_update(move |r| s2.lock().unwrap().push(format!("update {}", r)))
            .on_delete(move |id| s3.lock().unwrap().push(format!("delete {}", id)));

        handlers.dispatch(ChangeEvent::Insert(1));
        handlers.dispatch(ChangeEvent::Update(1));
        handlers.dispatch(ChangeEvent::Delete(RecordId::from(1)));

        assert_eq!(*seen.lock().unwrap(), vec!["insert 1", "update 1", "delete 1"]);
    }

    #[test]
    fn test_missing_closure_is_ignored() {
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let handlers = FnHandlers::<i64>::new().on_insert(move |_| *c.lock().unwrap() += 1);

        handlers.dispatch(ChangeEvent::Update(5));
        handlers.dispatch(ChangeEvent::Delete(RecordId::from(5)));
        handlers.dispatch(ChangeEvent::Insert(5));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_channel_handlers_forward_events() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent<i64>>();
        tx.on_insert(7);
        tx.on_delete(RecordId::from(7));

        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::Insert(7));
        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::Delete(RecordId::from(7)));
    }

    #[test]
    fn test_channel_handlers_tolerate_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<ChangeEvent<i64>>();
        drop(rx);
        tx.on_update(1);
    }
}
