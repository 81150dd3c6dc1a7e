//! Lazy attribute-chain queries.
//!
//! A [`QueryChain`] is an immutable value: a set of root items plus an ordered
//! list of [`Step`]s. Building one never touches the index. Work happens only
//! when the chain is materialized with [`QueryChain::collect`] (a lazy
//! iterator of resolved values) or [`QueryChain::collect_into`] (any
//! `FromIterator` container). Materializing re-reads the live store every
//! time, so a chain can be kept around and re-run after mutations.
//!
//! Evaluation is strictly left to right:
//!
//! ```text
//!   roots ──Expand(p)──► objects_of(·, p) ──Filter(f)──► retain f(value) ──► values
//! ```
//!
//! Each expansion is fully resolved (deduplicated, first-seen order) before the
//! next step starts; ids are turned back into values only at the very end.

use roaring::RoaringBitmap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::vec;

use crate::error::{GraphError, Result};
use crate::identity::{IdentityStore, ItemId};
use crate::relation_index::RelationIndex;
use crate::store::GraphStore;

/// Predicate over a resolved item value.
pub type ValuePredicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// One step of a chain.
#[derive(Clone)]
pub enum Step<V> {
    /// Replace the current set with everything it reaches through `predicate`.
    Expand(String),
    /// Narrow the current set.
    ///
    /// Without a `field`, the predicate tests each item's own value. With a
    /// `field`, an item survives when at least one object it reaches through
    /// `field` satisfies the predicate; the current set is not advanced.
    Filter {
        field: Option<String>,
        predicate: ValuePredicate<V>,
    },
}

impl<V> fmt::Debug for Step<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Expand(name) => f.debug_tuple("Expand").field(name).finish(),
            Step::Filter { field, .. } => f
                .debug_struct("Filter")
                .field("field", field)
                .finish_non_exhaustive(),
        }
    }
}

/// A deferred traversal rooted at one or more items.
#[derive(Clone)]
pub struct QueryChain<V> {
    sources: Vec<ItemId>,
    steps: Vec<Step<V>>,
}

impl<V> fmt::Debug for QueryChain<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryChain")
            .field("sources", &self.sources)
            .field("steps", &self.steps)
            .finish()
    }
}

impl<V: Clone + Eq + Hash> QueryChain<V> {
    /// Root a chain at the given ids (duplicates dropped, order kept).
    pub fn from_ids(ids: impl IntoIterator<Item = ItemId>) -> Self {
        let mut seen = RoaringBitmap::new();
        let sources = ids.into_iter().filter(|id| seen.insert(id.raw())).collect();
        Self {
            sources,
            steps: Vec::new(),
        }
    }

    /// A chain with no roots; always materializes to nothing.
    pub fn empty() -> Self {
        Self::from_ids(std::iter::empty())
    }

    pub fn sources(&self) -> &[ItemId] {
        &self.sources
    }

    pub fn steps(&self) -> &[Step<V>] {
        &self.steps
    }

    /// Follow `predicate` one hop.
    pub fn expand(mut self, predicate: impl Into<String>) -> Self {
        self.steps.push(Step::Expand(predicate.into()));
        self
    }

    /// Follow a dotted predicate path, one hop per segment
    /// (`"precedes.precedes.even"`).
    pub fn expand_path(mut self, path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            return Err(GraphError::InvalidOperation("empty predicate path".to_string()));
        }
        for segment in path.split('.') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(GraphError::InvalidOperation(format!(
                    "empty segment in predicate path {path:?}"
                )));
            }
            self.steps.push(Step::Expand(segment.to_string()));
        }
        Ok(self)
    }

    /// Keep items whose own value satisfies `predicate`.
    pub fn filter(mut self, predicate: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        self.steps.push(Step::Filter {
            field: None,
            predicate: Arc::new(predicate),
        });
        self
    }

    /// Keep items that reach, through `field`, some value satisfying `predicate`.
    pub fn filter_related(
        mut self,
        field: impl Into<String>,
        predicate: impl Fn(&V) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(Step::Filter {
            field: Some(field.into()),
            predicate: Arc::new(predicate),
        });
        self
    }

    /// Reject chains naming an empty predicate or filter field.
    pub fn validate(&self) -> Result<()> {
        for (position, step) in self.steps.iter().enumerate() {
            let name = match step {
                Step::Expand(name) => Some(name),
                Step::Filter { field, .. } => field.as_ref(),
            };
            if name.is_some_and(|n| n.trim().is_empty()) {
                return Err(GraphError::InvalidOperation(format!(
                    "step {position} names an empty predicate: {step:?}"
                )));
            }
        }
        Ok(())
    }

    /// Materialize as a lazy iterator of values.
    ///
    /// The pipeline runs on the first call to `next`, against whatever the
    /// store holds at that moment.
    pub fn collect<'a>(&self, store: &'a GraphStore<V>) -> Result<Values<'a, V>> {
        self.validate()?;
        Ok(Values {
            identities: store.identities(),
            index: store.index(),
            state: ValuesState::Pending(self.clone()),
        })
    }

    /// Materialize into any container of owned values.
    pub fn collect_into<C: FromIterator<V>>(&self, store: &GraphStore<V>) -> Result<C> {
        Ok(self.collect(store)?.cloned().collect())
    }

    /// Materialize the surviving item ids without resolving values.
    pub fn ids(&self, store: &GraphStore<V>) -> Result<Vec<ItemId>> {
        self.validate()?;
        Ok(self.evaluate(store.identities(), store.index()))
    }

    /// Relate every item the chain produces to `value` through `predicate`.
    ///
    /// The chain is materialized first, then the relations are stored, so
    /// the new edges never feed back into the traversal. Returns how many
    /// items were linked.
    pub fn assign(&self, store: &mut GraphStore<V>, predicate: &str, value: V) -> Result<usize>
    where
        V: fmt::Debug,
    {
        let subjects: Vec<V> = self.collect_into(store)?;
        for subject in &subjects {
            store.store_relation(subject.clone(), predicate, value.clone())?;
        }
        Ok(subjects.len())
    }

    fn evaluate(&self, identities: &IdentityStore<V>, index: &RelationIndex) -> Vec<ItemId> {
        let mut current: Vec<ItemId> = self
            .sources
            .iter()
            .copied()
            .filter(|&id| identities.contains_id(id))
            .collect();

        for step in &self.steps {
            if current.is_empty() {
                break;
            }
            match step {
                Step::Expand(predicate) => {
                    let mut seen = RoaringBitmap::new();
                    let mut next = Vec::new();
                    for &id in &current {
                        for object in index.objects_of(id, predicate) {
                            if seen.insert(object.raw()) {
                                next.push(object);
                            }
                        }
                    }
                    current = next;
                }
                Step::Filter {
                    field: None,
                    predicate,
                } => {
                    current.retain(|&id| identities.value_of(id).is_some_and(|v| predicate(v)));
                }
                Step::Filter {
                    field: Some(field),
                    predicate,
                } => {
                    current.retain(|&id| {
                        index
                            .objects_of(id, field)
                            .any(|o| identities.value_of(o).is_some_and(|v| predicate(v)))
                    });
                }
            }
            tracing::trace!(?step, remaining = current.len(), "chain step evaluated");
        }

        current
    }
}

enum ValuesState<V> {
    Pending(QueryChain<V>),
    Ready(vec::IntoIter<ItemId>),
}

/// Lazy result of [`QueryChain::collect`].
pub struct Values<'a, V> {
    identities: &'a IdentityStore<V>,
    index: &'a RelationIndex,
    state: ValuesState<V>,
}

impl<'a, V: Clone + Eq + Hash> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        if let ValuesState::Pending(chain) = &self.state {
            let ids = chain.evaluate(self.identities, self.index);
            self.state = ValuesState::Ready(ids.into_iter());
        }
        let ValuesState::Ready(ids) = &mut self.state else {
            return None;
        };
        let identities = self.identities;
        ids.find_map(|id| identities.value_of(id))
    }
}
