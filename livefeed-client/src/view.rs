//! Shared view state fed by a connection
//!
//! `SharedView` wraps a screen's [`ViewCollection`] so a connection can fold
//! change events into it directly while the screen reads snapshots. Every
//! event that changes the collection bumps a version counter the screen can
//! watch to know when to re-render; events the view ignores do not.

use crate::handlers::ChangeHandlers;
use livefeed_core::{FeedRecord, RecordId, ViewCollection};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// A view collection shared between a connection and a screen
pub struct SharedView<R> {
    collection: Arc<Mutex<ViewCollection<R>>>,
    version: Arc<watch::Sender<u64>>,
}

impl<R: FeedRecord> SharedView<R> {
    pub fn new(collection: ViewCollection<R>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            collection: Arc::new(Mutex::new(collection)),
            version: Arc::new(version),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewCollection<R>> {
        self.collection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` and bump the version if it reports a change
    fn mutate(&self, f: impl FnOnce(&mut ViewCollection<R>) -> bool) {
        let changed = f(&mut self.lock());
        if changed {
            self.version.send_modify(|v| *v += 1);
        }
    }

    /// Run `f` against the current collection
    pub fn with<T>(&self, f: impl FnOnce(&ViewCollection<R>) -> T) -> T {
        f(&self.lock())
    }

    /// Copy of the records in display order
    pub fn snapshot(&self) -> Vec<R>
    where
        R: Clone,
    {
        self.lock().records().to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.lock().contains(id)
    }

    /// Replace the contents after a full fetch
    pub fn replace_all<I>(&self, records: I)
    where
        I: IntoIterator<Item = R>,
    {
        self.mutate(|c| {
            c.replace_all(records);
            true
        });
    }

    /// Number of changes to the collection so far
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Observe the change counter
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Shared handler form for `open` and `supervise`
    pub fn handlers(&self) -> Arc<dyn ChangeHandlers<R>>
    where
        R: Send + 'static,
    {
        Arc::new(self.clone())
    }
}

impl<R> Clone for SharedView<R> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            version: self.version.clone(),
        }
    }
}

impl<R: FeedRecord + Send> ChangeHandlers<R> for SharedView<R> {
    fn on_insert(&self, record: R) {
        self.mutate(|c| c.insert(record));
    }

    fn on_update(&self, record: R) {
        self.mutate(|c| c.update(record));
    }

    fn on_delete(&self, id: RecordId) {
        self.mutate(|c| c.delete(&id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefeed_core::ChangeEvent;

    #[derive(Debug, Clone, PartialEq)]
    struct Slot {
        id: i64,
        day: u8,
    }

    impl FeedRecord for Slot {
        fn record_id(&self) -> RecordId {
            self.id.into()
        }
    }

    #[test]
    fn test_handlers_fold_into_collection() {
        let view = SharedView::new(ViewCollection::new(|s: &Slot| s.day == 1));
        let handlers = view.handlers();

        handlers.dispatch(ChangeEvent::Insert(Slot { id: 1, day: 1 }));
        handlers.dispatch(ChangeEvent::Insert(Slot { id: 2, day: 2 }));
        handlers.dispatch(ChangeEvent::Update(Slot { id: 1, day: 1 }));

        assert_eq!(view.snapshot(), vec![Slot { id: 1, day: 1 }]);
        assert_eq!(view.version(), 2);

        handlers.dispatch(ChangeEvent::Delete(RecordId::from(1)));
        assert!(view.is_empty());
    }

    #[test]
    fn test_ignored_events_do_not_bump_version() {
        let view = SharedView::new(ViewCollection::new(|s: &Slot| s.day == 1));
        let handlers = view.handlers();
        let rx = view.watch();

        handlers.dispatch(ChangeEvent::Insert(Slot { id: 2, day: 4 }));
        handlers.dispatch(ChangeEvent::Update(Slot { id: 3, day: 1 }));
        handlers.dispatch(ChangeEvent::Delete(RecordId::from(9)));

        assert_eq!(view.version(), 0);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let view = SharedView::new(ViewCollection::<Slot>::unfiltered());
        let other = view.clone();
        let rx = view.watch();

        other.replace_all(vec![Slot { id: 5, day: 3 }, Slot { id: 6, day: 3 }]);
        assert_eq!(view.len(), 2);
        assert!(view.contains(&RecordId::from(6)));
        assert!(rx.has_changed().unwrap());
        assert_eq!(view.with(|c| c.records().len()), 2);
    }
}
