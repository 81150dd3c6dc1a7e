//! Durable-storage collaborator interface.
//!
//! The core never does I/O itself. When a [`GraphStore`](crate::GraphStore)
//! is given a backend it mirrors every effective mutation into it, and on
//! construction it replays [`PersistentBackend::load_all`].

use std::io;

use crate::identity::ItemId;

/// Net persisted state, replayed when a store is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<V> {
    /// Live items in ID order
    pub items: Vec<(ItemId, V)>,
    /// Live triples in insertion order
    pub relations: Vec<(ItemId, String, ItemId)>,
    /// Predicates keyed from each item, in first-use order, including ones
    /// whose triples have all been deleted
    pub outgoing_keys: Vec<(ItemId, Vec<String>)>,
    /// Predicates keyed towards each item, same rules as `outgoing_keys`
    pub incoming_keys: Vec<(ItemId, Vec<String>)>,
}

impl<V> Snapshot<V> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.relations.is_empty()
    }
}

impl<V> Default for Snapshot<V> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            relations: Vec::new(),
            outgoing_keys: Vec::new(),
            incoming_keys: Vec::new(),
        }
    }
}

/// Where a store writes its items and relations.
///
/// Writes may be buffered; the store calls [`flush`](Self::flush) after each
/// mutation when `autocommit` is on, and from `commit`/`close` otherwise.
pub trait PersistentBackend<V>: Send + Sync {
    /// Record `value` under `id`, replacing any value stored for `id` before.
    fn persist_item(&self, id: ItemId, value: &V) -> io::Result<()>;

    /// Drop item `id` together with every relation that mentions it.
    fn retract_item(&self, id: ItemId) -> io::Result<()>;

    fn persist_relation(&self, subject: ItemId, predicate: &str, object: ItemId)
        -> io::Result<()>;

    fn retract_relation(&self, subject: ItemId, predicate: &str, object: ItemId)
        -> io::Result<()>;

    /// Undo a `persist_relation` the store rolled back: the triple was never
    /// stored, so any predicate keys it introduced go too. Called straight
    /// after the failed write.
    fn revert_relation(&self, subject: ItemId, predicate: &str, object: ItemId) -> io::Result<()> {
        self.retract_relation(subject, predicate, object)
    }

    /// Everything persisted so far, net of retractions.
    fn load_all(&self) -> io::Result<Snapshot<V>>;

    fn flush(&self) -> io::Result<()>;

    fn close(&self) -> io::Result<()>;
}
