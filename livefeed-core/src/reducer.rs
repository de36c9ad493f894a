//! In-memory view state for one screen
//!
//! A screen keeps the records it displays in a collection and folds change
//! events into it. The fold functions here are pure: they take the
//! collection by value and hand back the next one, so replaying an event is
//! always safe.
//!
//! # Rules
//!
//! - **Insert**: dropped when the relevance predicate rejects the record (it
//!   belongs to another day, week or owner). A duplicate identity is treated
//!   as an update instead of a second copy.
//! - **Update**: replaces the record with the same identity, keeping its
//!   position. An update for a record the screen does not hold is ignored;
//!   updates never insert.
//! - **Delete**: removes the record with the given identity, if present.
//!
//! After any sequence of these operations no two records share an identity.
//!
//! # Sorted views
//!
//! [`ViewCollection`] can carry a comparator. Inserts then land at their
//! sorted position and updated records are re-placed, which is the only case
//! where an update moves a record.
//!
//! # Examples
//!
//! ```rust
//! use livefeed_core::reducer::{apply_delete, apply_insert, apply_update};
//! use livefeed_core::{FeedRecord, RecordId};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Slot { id: i64, day: u32 }
//!
//! impl FeedRecord for Slot {
//!     fn record_id(&self) -> RecordId { self.id.into() }
//! }
//!
//! let today = |s: &Slot| s.day == 1;
//! let view = apply_insert(Vec::new(), Slot { id: 1, day: 1 }, today);
//! let view = apply_insert(view, Slot { id: 2, day: 2 }, today); // other day
//! assert_eq!(view.len(), 1);
//!
//! let view = apply_update(view, Slot { id: 9, day: 1 }); // not held
//! assert_eq!(view.len(), 1);
//!
//! let view = apply_delete(view, &RecordId::Number(1));
//! assert!(view.is_empty());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::types::{ChangeEvent, FeedRecord, RecordId};

/// Relevance predicate deciding whether a record belongs to a view
pub type RelevanceFn<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Comparator giving a view its display order
pub type CompareFn<R> = Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

fn position_of<R: FeedRecord>(collection: &[R], id: &RecordId) -> Option<usize> {
    collection.iter().position(|r| &r.record_id() == id)
}

/// Add a record to an insertion-ordered collection
pub fn apply_insert<R, P>(mut collection: Vec<R>, record: R, relevant: P) -> Vec<R>
where
    R: FeedRecord,
    P: Fn(&R) -> bool,
{
    if !relevant(&record) {
        return collection;
    }
    match position_of(&collection, &record.record_id()) {
        Some(idx) => collection[idx] = record,
        None => collection.push(record),
    }
    collection
}

/// Add a record to a collection kept sorted by `compare`
///
/// Records comparing equal keep their arrival order.
pub fn apply_insert_sorted<R, P, C>(collection: Vec<R>, record: R, relevant: P, compare: C) -> Vec<R>
where
    R: FeedRecord,
    P: Fn(&R) -> bool,
    C: Fn(&R, &R) -> Ordering,
{
    if !relevant(&record) {
        return collection;
    }
    if position_of(&collection, &record.record_id()).is_some() {
        return apply_update_sorted(collection, record, compare);
    }
    insert_at_sorted_position(collection, record, &compare)
}

/// Replace the record with the same identity, if the collection holds it
pub fn apply_update<R: FeedRecord>(mut collection: Vec<R>, record: R) -> Vec<R> {
    if let Some(idx) = position_of(&collection, &record.record_id()) {
        collection[idx] = record;
    }
    collection
}

/// Replace a held record and move it to its sorted position
pub fn apply_update_sorted<R, C>(mut collection: Vec<R>, record: R, compare: C) -> Vec<R>
where
    R: FeedRecord,
    C: Fn(&R, &R) -> Ordering,
{
    match position_of(&collection, &record.record_id()) {
        Some(idx) => {
            collection.remove(idx);
            insert_at_sorted_position(collection, record, &compare)
        }
        None => collection,
    }
}

/// Remove the record with `id`, if present
pub fn apply_delete<R: FeedRecord>(mut collection: Vec<R>, id: &RecordId) -> Vec<R> {
    collection.retain(|r| &r.record_id() != id);
    collection
}

fn insert_at_sorted_position<R, C>(mut collection: Vec<R>, record: R, compare: &C) -> Vec<R>
where
    C: Fn(&R, &R) -> Ordering + ?Sized,
{
    let idx = collection.partition_point(|existing| compare(existing, &record) != Ordering::Greater);
    collection.insert(idx, record);
    collection
}

/// Display order of a view collection
pub enum SortOrder<R> {
    /// Records stay in the order they were inserted
    Insertion,
    /// Records are kept sorted by the comparator
    By(CompareFn<R>),
}

impl<R> Clone for SortOrder<R> {
    fn clone(&self) -> Self {
        match self {
            SortOrder::Insertion => SortOrder::Insertion,
            SortOrder::By(cmp) => SortOrder::By(Arc::clone(cmp)),
        }
    }
}

/// A screen's record collection together with its relevance and sort rules
pub struct ViewCollection<R> {
    records: Vec<R>,
    relevance: RelevanceFn<R>,
    order: SortOrder<R>,
}

impl<R: FeedRecord> ViewCollection<R> {
    /// Create an empty, insertion-ordered view with a relevance predicate
    pub fn new<P>(relevance: P) -> Self
    where
        P: Fn(&R) -> bool + Send + Sync + 'static,
    {
        Self {
            records: Vec::new(),
            relevance: Arc::new(relevance),
            order: SortOrder::Insertion,
        }
    }

    /// A view that accepts every record
    pub fn unfiltered() -> Self {
        Self::new(|_| true)
    }

    /// Keep the view sorted by `compare`
    pub fn with_sort_by<C>(mut self, compare: C) -> Self
    where
        C: Fn(&R, &R) -> Ordering + Send + Sync + 'static,
    {
        let compare: CompareFn<R> = Arc::new(compare);
        let records = std::mem::take(&mut self.records);
        self.records = records
            .into_iter()
            .fold(Vec::new(), |acc, r| insert_at_sorted_position(acc, r, &*compare));
        self.order = SortOrder::By(compare);
        self
    }

    /// Whether `record` belongs in this view
    pub fn is_relevant(&self, record: &R) -> bool {
        (self.relevance)(record)
    }

    /// Fold one change event into the view
    ///
    /// Returns true if the view changed; irrelevant inserts and updates or
    /// deletes of records the view does not hold leave it untouched.
    pub fn apply(&mut self, event: ChangeEvent<R>) -> bool {
        match event {
            ChangeEvent::Insert(record) => self.insert(record),
            ChangeEvent::Update(record) => self.update(record),
            ChangeEvent::Delete(id) => self.delete(&id),
        }
    }

    pub fn insert(&mut self, record: R) -> bool {
        if !self.is_relevant(&record) {
            return false;
        }
        let records = std::mem::take(&mut self.records);
        let relevance = Arc::clone(&self.relevance);
        self.records = match &self.order {
            SortOrder::Insertion => apply_insert(records, record, |r| relevance(r)),
            SortOrder::By(cmp) => apply_insert_sorted(records, record, |r| relevance(r), |a, b| cmp(a, b)),
        };
        true
    }

    pub fn update(&mut self, record: R) -> bool {
        if !self.contains(&record.record_id()) {
            return false;
        }
        let records = std::mem::take(&mut self.records);
        self.records = match &self.order {
            SortOrder::Insertion => apply_update(records, record),
            SortOrder::By(cmp) => apply_update_sorted(records, record, |a, b| cmp(a, b)),
        };
        true
    }

    pub fn delete(&mut self, id: &RecordId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let records = std::mem::take(&mut self.records);
        self.records = apply_delete(records, id);
        true
    }

    /// Replace the whole view with a freshly loaded set of records
    ///
    /// Irrelevant records are skipped and later duplicates replace earlier
    /// ones, so the identity invariant holds for any input.
    pub fn replace_all<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = R>,
    {
        self.records.clear();
        for record in records {
            self.insert(record);
        }
    }

    pub fn get(&self, id: &RecordId) -> Option<&R> {
        self.records.iter().find(|r| &r.record_id() == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn into_records(self) -> Vec<R> {
        self.records
    }
}

impl<R: Clone> Clone for ViewCollection<R> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            relevance: Arc::clone(&self.relevance),
            order: self.order.clone(),
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for ViewCollection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewCollection")
            .field("records", &self.records)
            .field("sorted", &matches!(self.order, SortOrder::By(_)))
            .finish()
    }
}
