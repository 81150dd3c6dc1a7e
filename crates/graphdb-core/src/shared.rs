//! Thread-shareable store handle.
//!
//! One coarse `RwLock` guards the whole store. Mutations hold the write lock
//! for the full call (including cascades and backend mirroring); queries hold
//! the read lock for the full materialization, so a multi-hop chain never sees
//! a mutation land between two of its hops.

use parking_lot::RwLock;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::Result;
use crate::query::QueryChain;
use crate::store::GraphStore;
use crate::value::Value;

pub struct SharedGraphStore<V = Value> {
    inner: Arc<RwLock<GraphStore<V>>>,
}

impl<V> Clone for SharedGraphStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Eq + Hash + Debug> SharedGraphStore<V> {
    pub fn new(store: GraphStore<V>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&GraphStore<V>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut GraphStore<V>) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn store_relation(&self, subject: V, predicate: &str, object: V) -> Result<()> {
        self.write(|g| g.store_relation(subject, predicate, object))
    }

    pub fn delete_relation(&self, subject: &V, predicate: &str, object: &V) -> Result<()> {
        self.write(|g| g.delete_relation(subject, predicate, object))
    }

    pub fn delete_item(&self, value: &V) -> Result<()> {
        self.write(|g| g.delete_item(value))
    }

    pub fn contains(&self, value: &V) -> bool {
        self.read(|g| g.contains(value))
    }

    /// Build a chain rooted at `root` (resolved under the read lock).
    pub fn chain(&self, root: &V) -> QueryChain<V> {
        self.read(|g| g.chain(root))
    }

    /// Materialize `chain` into owned values while holding the read lock.
    pub fn query<C: FromIterator<V>>(&self, chain: &QueryChain<V>) -> Result<C> {
        self.read(|g| chain.collect_into(g))
    }

    /// Unwrap the store if this is the last handle.
    pub fn try_into_inner(self) -> std::result::Result<GraphStore<V>, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }
}
