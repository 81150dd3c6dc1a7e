//! The public graph store facade.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::io;

use crate::backend::PersistentBackend;
use crate::error::{GraphError, Result};
use crate::identity::{IdentityStore, ItemId};
use crate::query::QueryChain;
use crate::relation_index::RelationIndex;
use crate::value::Value;

/// Write behaviour of a [`GraphStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Intern unseen values when a relation mentions them. When off, values
    /// must be registered with [`GraphStore::store_item`] first.
    pub autostore: bool,
    /// Flush the backend after every mutation instead of on `commit`.
    pub autocommit: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            autostore: true,
            autocommit: true,
        }
    }
}

/// Interned items plus their relation indexes, optionally mirrored to a
/// persistent backend.
pub struct GraphStore<V = Value> {
    identities: IdentityStore<V>,
    index: RelationIndex,
    options: StoreOptions,
    backend: Option<Box<dyn PersistentBackend<V>>>,
}

impl<V> GraphStore<V> {
    pub fn identities(&self) -> &IdentityStore<V> {
        &self.identities
    }

    pub fn index(&self) -> &RelationIndex {
        &self.index
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_some()
    }

    /// Flush buffered backend writes. A no-op for in-memory stores.
    pub fn commit(&self) -> Result<()> {
        if let Some(backend) = self.backend.as_deref() {
            backend.flush()?;
        }
        Ok(())
    }

    /// Flush and release the backend.
    pub fn close(mut self) -> Result<()> {
        if let Some(backend) = self.backend.take() {
            backend.flush()?;
            backend.close()?;
        }
        Ok(())
    }

    /// Run `write` against the backend (if any), flushing afterwards when
    /// `autocommit` is on.
    ///
    /// On failure `undo` is run to retract whatever part of `write` may have
    /// reached the backend. `undo` must be harmless for records that were
    /// never written.
    fn mirror(
        &self,
        write: impl FnOnce(&dyn PersistentBackend<V>) -> io::Result<()>,
        undo: impl FnOnce(&dyn PersistentBackend<V>) -> io::Result<()>,
    ) -> io::Result<()> {
        let Some(backend) = self.backend.as_deref() else {
            return Ok(());
        };
        let result = write(backend).and_then(|()| {
            if self.options.autocommit {
                backend.flush()
            } else {
                Ok(())
            }
        });

        if let Err(err) = &result {
            let undone = undo(backend).and_then(|()| {
                if self.options.autocommit {
                    backend.flush()
                } else {
                    Ok(())
                }
            });
            if let Err(undo_err) = undone {
                tracing::warn!(
                    error = %err,
                    undo_error = %undo_err,
                    "failed to retract partial backend write"
                );
            }
        }
        result
    }
}

impl<V: Clone + Eq + Hash + Debug> GraphStore<V> {
    /// In-memory store with default options.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            identities: IdentityStore::new(),
            index: RelationIndex::new(),
            options,
            backend: None,
        }
    }

    /// Open a store over `backend`, replaying everything it holds.
    pub fn with_backend(backend: Box<dyn PersistentBackend<V>>, options: StoreOptions) -> Result<Self> {
        let snapshot = backend.load_all()?;
        let mut store = Self::with_options(options);

        for (id, value) in snapshot.items {
            store.identities.restore(id, value);
        }

        let mut skipped = 0usize;
        for (item, outgoing) in &snapshot.outgoing_keys {
            if store.identities.contains_id(*item) {
                store.index.restore_keys(*item, outgoing, &[]);
            } else {
                skipped += 1;
            }
        }
        for (item, incoming) in &snapshot.incoming_keys {
            if store.identities.contains_id(*item) {
                store.index.restore_keys(*item, &[], incoming);
            } else {
                skipped += 1;
            }
        }
        for (subject, predicate, object) in &snapshot.relations {
            if store.identities.contains_id(*subject) && store.identities.contains_id(*object) {
                store.index.add(*subject, predicate, *object);
            } else {
                skipped += 1;
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "dropped persisted relations or keys with unknown items");
        }

        tracing::info!(
            items = store.identities.len(),
            relations = store.index.len(),
            "replayed persisted graph"
        );
        store.backend = Some(backend);
        Ok(store)
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Register a value as an item, returning its ID.
    pub fn store_item(&mut self, value: V) -> Result<ItemId> {
        if let Some(id) = self.identities.id_of(&value) {
            return Ok(id);
        }

        let id = self.identities.intern(value.clone());
        if let Err(err) = self.mirror(|b| b.persist_item(id, &value), |b| b.retract_item(id)) {
            self.identities.forget(id);
            return Err(err.into());
        }
        tracing::debug!(item = %id, ?value, "item stored");
        Ok(id)
    }

    /// Store `(subject, predicate, object)`. Storing an existing triple is a
    /// no-op.
    pub fn store_relation(&mut self, subject: V, predicate: &str, object: V) -> Result<()> {
        if predicate.trim().is_empty() {
            return Err(GraphError::InvalidOperation("empty predicate name".to_string()));
        }

        let mut fresh: Vec<(ItemId, V)> = Vec::new();
        let (s, o) = if self.options.autostore {
            let s = self.intern_tracked(subject, &mut fresh);
            let o = self.intern_tracked(object, &mut fresh);
            (s, o)
        } else {
            let s = self.require(&subject)?;
            let o = self.require(&object)?;
            (s, o)
        };

        // Fresh items never appear in a stored triple.
        if self.index.contains(s, predicate, o) {
            return Ok(());
        }

        // Index only after the backend has accepted the triple.
        let persisted = self.mirror(
            |b| {
                for (id, value) in &fresh {
                    b.persist_item(*id, value)?;
                }
                b.persist_relation(s, predicate, o)
            },
            |b| {
                b.revert_relation(s, predicate, o)?;
                for (id, _) in fresh.iter().rev() {
                    b.retract_item(*id)?;
                }
                Ok(())
            },
        );
        if let Err(err) = persisted {
            for (id, _) in fresh {
                self.identities.forget(id);
            }
            return Err(err.into());
        }
        self.index.add(s, predicate, o);
        Ok(())
    }

    /// Remove `(subject, predicate, object)`. Unknown values or an absent
    /// triple make this a no-op.
    pub fn delete_relation(&mut self, subject: &V, predicate: &str, object: &V) -> Result<()> {
        let (Some(s), Some(o)) = (self.identities.id_of(subject), self.identities.id_of(object))
        else {
            return Ok(());
        };
        if !self.index.remove(s, predicate, o) {
            return Ok(());
        }

        if let Err(err) = self.mirror(
            |b| b.retract_relation(s, predicate, o),
            |b| b.persist_relation(s, predicate, o),
        ) {
            self.index.add(s, predicate, o);
            return Err(err.into());
        }
        Ok(())
    }

    /// Rename an item: its ID, and therefore every relation, now belongs to
    /// `new`. Unknown `old` is a no-op; `new` must not already be a distinct
    /// item.
    pub fn replace_item(&mut self, old: &V, new: V) -> Result<()> {
        let Some(id) = self.identities.id_of(old) else {
            return Ok(());
        };
        if *old == new {
            return Ok(());
        }
        if self.identities.contains(&new) {
            return Err(GraphError::InvalidOperation(format!(
                "cannot replace {old:?} with {new:?}: it is already a separate item"
            )));
        }

        let Some(previous) = self.identities.rebind(id, new.clone()) else {
            return Err(GraphError::Consistency(format!("{id} vanished during replace")));
        };
        if let Err(err) = self.mirror(|b| b.persist_item(id, &new), |b| b.persist_item(id, &previous)) {
            self.identities.rebind(id, previous);
            return Err(err.into());
        }
        tracing::debug!(item = %id, ?new, "item replaced");
        Ok(())
    }

    /// Delete an item and every relation that mentions it.
    pub fn delete_item(&mut self, value: &V) -> Result<()> {
        let Some(id) = self.identities.id_of(value) else {
            return Ok(());
        };

        let removed = self.index.remove_item_cascade(id);
        let forgotten = self.identities.forget(id);

        let restore = |b: &dyn PersistentBackend<V>| -> io::Result<()> {
            if let Some(value) = &forgotten {
                b.persist_item(id, value)?;
            }
            for (s, p, o) in &removed {
                b.persist_relation(*s, p, *o)?;
            }
            Ok(())
        };
        if let Err(err) = self.mirror(|b| b.retract_item(id), restore) {
            if let Some(value) = forgotten {
                self.identities.restore(id, value);
            }
            for (s, p, o) in &removed {
                self.index.add(*s, p, *o);
            }
            return Err(err.into());
        }
        tracing::debug!(item = %id, relations = removed.len(), "item deleted");
        Ok(())
    }

    fn intern_tracked(&mut self, value: V, fresh: &mut Vec<(ItemId, V)>) -> ItemId {
        if let Some(id) = self.identities.id_of(&value) {
            return id;
        }
        let id = self.identities.intern(value.clone());
        fresh.push((id, value));
        id
    }

    fn require(&self, value: &V) -> Result<ItemId> {
        self.identities
            .id_of(value)
            .ok_or_else(|| GraphError::UnknownItem(format!("{value:?}")))
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    pub fn contains(&self, value: &V) -> bool {
        self.identities.contains(value)
    }

    pub fn id_of(&self, value: &V) -> Option<ItemId> {
        self.identities.id_of(value)
    }

    pub fn value_of(&self, id: ItemId) -> Option<&V> {
        self.identities.value_of(id)
    }

    /// Predicates leaving `subject`; see [`RelationIndex::predicates_from`].
    pub fn relations_of(&self, subject: &V, include_empty: bool) -> impl Iterator<Item = &str> + '_ {
        self.identities
            .id_of(subject)
            .into_iter()
            .flat_map(move |id| self.index.predicates_from(id, include_empty))
    }

    /// Predicates arriving at `object`.
    pub fn relations_to(&self, object: &V, include_empty: bool) -> impl Iterator<Item = &str> + '_ {
        self.identities
            .id_of(object)
            .into_iter()
            .flat_map(move |id| self.index.predicates_to(id, include_empty))
    }

    /// Values related to `subject` through `predicate`, in insertion order.
    pub fn find(&self, subject: &V, predicate: &str) -> impl Iterator<Item = &V> + '_ {
        let objects = self
            .identities
            .id_of(subject)
            .map(|id| self.index.objects_of(id, predicate));
        objects
            .into_iter()
            .flatten()
            .filter_map(move |id| self.identities.value_of(id))
    }

    /// A chain rooted at `root`. Unknown roots give an empty chain.
    pub fn chain(&self, root: &V) -> QueryChain<V> {
        QueryChain::from_ids(self.identities.id_of(root))
    }

    /// A chain rooted at several items.
    pub fn chain_many<'v>(&self, roots: impl IntoIterator<Item = &'v V>) -> QueryChain<V>
    where
        V: 'v,
    {
        QueryChain::from_ids(roots.into_iter().filter_map(|v| self.identities.id_of(v)))
    }

    /// All items, in first-insertion order.
    pub fn items(&self) -> impl Iterator<Item = &V> + '_ {
        self.identities.iter().map(|(_, value)| value)
    }

    /// All relations as `(subject, predicate, object)` values.
    pub fn relations(&self) -> impl Iterator<Item = (&V, &str, &V)> + '_ {
        self.index.triples().filter_map(move |(s, p, o)| {
            Some((self.identities.value_of(s)?, p, self.identities.value_of(o)?))
        })
    }

    pub fn item_count(&self) -> usize {
        self.identities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.index.len()
    }
}

impl<V: Clone + Eq + Hash + Debug> Default for GraphStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for GraphStore<V> {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take() {
            if let Err(err) = backend.flush() {
                tracing::warn!(error = %err, "failed to flush graph backend on drop");
            }
        }
    }
}
