//! Relation storage: a set of `(subject, predicate, object)` triples with a
//! forward and a reverse index kept in lock-step.
//!
//! Buckets are `Vec`s so iteration follows first insertion. A bucket that has
//! been emptied by deletion keeps its key, which is what lets
//! `predicates_from(.., include_empty = true)` tell "had this relation once"
//! apart from "never had it".

use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::identity::ItemId;

// ============================================================================
// Predicate Interning
// ============================================================================

/// Interned predicate name ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub(crate) struct PredId(u32);

/// Predicate names, stored once. Names are never released.
#[derive(Debug, Clone, Default)]
struct PredicateTable {
    by_name: AHashMap<String, PredId>,
    names: Vec<String>,
}

impl PredicateTable {
    fn intern(&mut self, name: &str) -> PredId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = PredId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    fn id_of(&self, name: &str) -> Option<PredId> {
        self.by_name.get(name).copied()
    }

    fn name(&self, id: PredId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }
}

// ============================================================================
// Relation Index
// ============================================================================

type Triple = (ItemId, PredId, ItemId);

/// Indexed triple storage
#[derive(Debug, Clone, Default)]
pub struct RelationIndex {
    predicates: PredicateTable,
    /// Every stored triple (set membership)
    triples: AHashSet<Triple>,
    /// Forward index: (subject, predicate) -> objects
    forward: AHashMap<(ItemId, PredId), Vec<ItemId>>,
    /// Reverse index: (object, predicate) -> subjects
    reverse: AHashMap<(ItemId, PredId), Vec<ItemId>>,
    /// Predicates ever keyed from a subject, in first-insertion order
    outgoing_keys: BTreeMap<ItemId, Vec<PredId>>,
    /// Predicates ever keyed towards an object, in first-insertion order
    incoming_keys: BTreeMap<ItemId, Vec<PredId>>,
}

impl RelationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triples stored.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn contains(&self, subject: ItemId, predicate: &str, object: ItemId) -> bool {
        self.predicates
            .id_of(predicate)
            .is_some_and(|p| self.triples.contains(&(subject, p, object)))
    }

    /// Add a triple. Returns `false` if it was already present.
    pub fn add(&mut self, subject: ItemId, predicate: &str, object: ItemId) -> bool {
        let p = self.predicates.intern(predicate);
        if !self.triples.insert((subject, p, object)) {
            return false;
        }

        push_key(&mut self.outgoing_keys, subject, p);
        push_key(&mut self.incoming_keys, object, p);
        self.forward.entry((subject, p)).or_default().push(object);
        self.reverse.entry((object, p)).or_default().push(subject);

        tracing::debug!(%subject, predicate, %object, "relation added");
        true
    }

    /// Remove a triple. Returns `false` if it was not present.
    pub fn remove(&mut self, subject: ItemId, predicate: &str, object: ItemId) -> bool {
        let Some(p) = self.predicates.id_of(predicate) else {
            return false;
        };
        if !self.triples.remove(&(subject, p, object)) {
            return false;
        }

        let forward_hit = remove_from_bucket(&mut self.forward, (subject, p), object);
        let reverse_hit = remove_from_bucket(&mut self.reverse, (object, p), subject);
        debug_assert!(
            forward_hit && reverse_hit,
            "index divergence removing ({subject}, {predicate}, {object})"
        );

        tracing::debug!(%subject, predicate, %object, "relation removed");
        true
    }

    /// Re-key predicates on `item` without storing any triple, so that
    /// `include_empty` listings survive a reload. Already keyed predicates
    /// keep their position.
    pub fn restore_keys(&mut self, item: ItemId, outgoing: &[String], incoming: &[String]) {
        for name in outgoing {
            let p = self.predicates.intern(name);
            push_key(&mut self.outgoing_keys, item, p);
        }
        for name in incoming {
            let p = self.predicates.intern(name);
            push_key(&mut self.incoming_keys, item, p);
        }
    }

    /// Objects related to `subject` by `predicate`, in insertion order.
    pub fn objects_of<'a>(
        &'a self,
        subject: ItemId,
        predicate: &str,
    ) -> impl Iterator<Item = ItemId> + 'a {
        self.bucket(&self.forward, subject, predicate)
    }

    /// Subjects related to `object` by `predicate`, in insertion order.
    pub fn subjects_of<'a>(
        &'a self,
        object: ItemId,
        predicate: &str,
    ) -> impl Iterator<Item = ItemId> + 'a {
        self.bucket(&self.reverse, object, predicate)
    }

    /// Predicates leaving `subject`.
    ///
    /// With `include_empty = false` a predicate is listed only while at least
    /// one triple uses it; with `true`, predicates whose triples were all
    /// deleted are listed too.
    pub fn predicates_from(
        &self,
        subject: ItemId,
        include_empty: bool,
    ) -> impl Iterator<Item = &str> + '_ {
        self.keyed_predicates(&self.outgoing_keys, &self.forward, subject, include_empty)
    }

    /// Predicates arriving at `object`; see [`RelationIndex::predicates_from`].
    pub fn predicates_to(
        &self,
        object: ItemId,
        include_empty: bool,
    ) -> impl Iterator<Item = &str> + '_ {
        self.keyed_predicates(&self.incoming_keys, &self.reverse, object, include_empty)
    }

    /// Remove every triple where `id` is the subject or the object.
    ///
    /// Keys owned by `id` disappear entirely; the counterpart items keep their
    /// (possibly now empty) buckets, exactly as an explicit delete would.
    pub fn remove_item_cascade(&mut self, id: ItemId) -> Vec<(ItemId, String, ItemId)> {
        let mut removed: Vec<Triple> = Vec::new();

        for p in self.outgoing_keys.remove(&id).unwrap_or_default() {
            for object in self.forward.remove(&(id, p)).unwrap_or_default() {
                self.triples.remove(&(id, p, object));
                let hit = remove_from_bucket(&mut self.reverse, (object, p), id);
                debug_assert!(hit, "reverse index missing ({id}, {p:?}, {object})");
                removed.push((id, p, object));
            }
        }

        for p in self.incoming_keys.remove(&id).unwrap_or_default() {
            for subject in self.reverse.remove(&(id, p)).unwrap_or_default() {
                self.triples.remove(&(subject, p, id));
                let hit = remove_from_bucket(&mut self.forward, (subject, p), id);
                debug_assert!(hit, "forward index missing ({subject}, {p:?}, {id})");
                removed.push((subject, p, id));
            }
        }

        tracing::debug!(item = %id, removed = removed.len(), "cascaded item removal");
        removed
            .into_iter()
            .map(|(s, p, o)| (s, self.predicates.name(p).unwrap_or_default().to_string(), o))
            .collect()
    }

    /// All triples, grouped by subject (ID order), then predicate and object
    /// in first-insertion order.
    pub fn triples(&self) -> impl Iterator<Item = (ItemId, &str, ItemId)> + '_ {
        self.outgoing_keys.iter().flat_map(move |(&subject, preds)| {
            preds.iter().flat_map(move |&p| {
                let name = self.predicates.name(p).unwrap_or_default();
                self.forward
                    .get(&(subject, p))
                    .into_iter()
                    .flatten()
                    .map(move |&object| (subject, name, object))
            })
        })
    }

    /// Check the bidirectional invariant: every forward entry is mirrored by
    /// exactly one reverse entry, both agree with the triple set, and no
    /// bucket holds a duplicate.
    pub fn verify(&self) -> Result<()> {
        let violation = |msg: String| Err(GraphError::Consistency(msg));

        let mut forward_count = 0usize;
        for (&(subject, p), objects) in &self.forward {
            let mut seen = AHashSet::new();
            for &object in objects {
                forward_count += 1;
                if !seen.insert(object) {
                    return violation(format!("duplicate {object} in forward ({subject}, {p:?})"));
                }
                if !self.triples.contains(&(subject, p, object)) {
                    return violation(format!("forward ({subject}, {p:?}, {object}) not a triple"));
                }
                let mirrored = self
                    .reverse
                    .get(&(object, p))
                    .is_some_and(|subjects| subjects.contains(&subject));
                if !mirrored {
                    return violation(format!("forward ({subject}, {p:?}, {object}) not mirrored"));
                }
            }
        }

        let mut reverse_count = 0usize;
        for (&(object, p), subjects) in &self.reverse {
            let mut seen = AHashSet::new();
            for &subject in subjects {
                reverse_count += 1;
                if !seen.insert(subject) {
                    return violation(format!("duplicate {subject} in reverse ({object}, {p:?})"));
                }
                if !self.triples.contains(&(subject, p, object)) {
                    return violation(format!("reverse ({subject}, {p:?}, {object}) not a triple"));
                }
            }
        }

        if forward_count != self.triples.len() || reverse_count != self.triples.len() {
            return violation(format!(
                "{} triples but {forward_count} forward / {reverse_count} reverse entries",
                self.triples.len()
            ));
        }
        Ok(())
    }

    fn bucket<'a>(
        &'a self,
        index: &'a AHashMap<(ItemId, PredId), Vec<ItemId>>,
        key: ItemId,
        predicate: &str,
    ) -> impl Iterator<Item = ItemId> + 'a {
        self.predicates
            .id_of(predicate)
            .and_then(|p| index.get(&(key, p)))
            .into_iter()
            .flatten()
            .copied()
    }

    fn keyed_predicates<'a>(
        &'a self,
        keys: &'a BTreeMap<ItemId, Vec<PredId>>,
        index: &'a AHashMap<(ItemId, PredId), Vec<ItemId>>,
        item: ItemId,
        include_empty: bool,
    ) -> impl Iterator<Item = &'a str> + 'a {
        keys.get(&item)
            .into_iter()
            .flatten()
            .filter(move |&&p| {
                include_empty || index.get(&(item, p)).is_some_and(|bucket| !bucket.is_empty())
            })
            .filter_map(move |&p| self.predicates.name(p))
    }
}

fn push_key(keys: &mut BTreeMap<ItemId, Vec<PredId>>, item: ItemId, p: PredId) {
    let preds = keys.entry(item).or_default();
    if !preds.contains(&p) {
        preds.push(p);
    }
}

fn remove_from_bucket(
    index: &mut AHashMap<(ItemId, PredId), Vec<ItemId>>,
    key: (ItemId, PredId),
    member: ItemId,
) -> bool {
    let Some(bucket) = index.get_mut(&key) else {
        return false;
    };
    match bucket.iter().position(|&m| m == member) {
        Some(pos) => {
            bucket.remove(pos);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ItemId {
        ItemId::new(n)
    }

    #[test]
    fn test_add_is_idempotent_and_ordered() {
        let mut index = RelationIndex::new();
        assert!(index.add(id(5), "greater_than", id(1)));
        assert!(index.add(id(5), "greater_than", id(2)));
        assert!(!index.add(id(5), "greater_than", id(1)));

        let objects: Vec<_> = index.objects_of(id(5), "greater_than").collect();
        assert_eq!(objects, vec![id(1), id(2)]);
        assert_eq!(index.len(), 2);
        index.verify().unwrap();
    }

    #[test]
    fn test_reverse_lookup_mirrors_forward() {
        let mut index = RelationIndex::new();
        index.add(id(0), "precedes", id(1));
        index.add(id(2), "precedes", id(1));

        let subjects: Vec<_> = index.subjects_of(id(1), "precedes").collect();
        assert_eq!(subjects, vec![id(0), id(2)]);
        assert_eq!(index.predicates_to(id(1), false).collect::<Vec<_>>(), vec!["precedes"]);
    }

    #[test]
    fn test_emptied_predicates_are_hidden_by_default() {
        let mut index = RelationIndex::new();
        index.add(id(5), "greater_than", id(2));
        index.add(id(5), "odd", id(9));

        assert!(index.remove(id(5), "greater_than", id(2)));
        assert!(!index.remove(id(5), "greater_than", id(2)));

        assert_eq!(index.predicates_from(id(5), false).collect::<Vec<_>>(), vec!["odd"]);
        assert_eq!(
            index.predicates_from(id(5), true).collect::<Vec<_>>(),
            vec!["greater_than", "odd"]
        );
        assert_eq!(index.predicates_to(id(2), true).collect::<Vec<_>>(), vec!["greater_than"]);
        assert_eq!(index.predicates_to(id(2), false).count(), 0);
        index.verify().unwrap();
    }

    #[test]
    fn test_remove_unknown_predicate_is_noop() {
        let mut index = RelationIndex::new();
        assert!(!index.remove(id(1), "never", id(2)));
        assert_eq!(index.objects_of(id(1), "never").count(), 0);
    }

    #[test]
    fn test_cascade_removes_both_directions() {
        let mut index = RelationIndex::new();
        index.add(id(5), "precedes", id(6));
        index.add(id(6), "precedes", id(7));
        index.add(id(6), "even", id(6));
        index.add(id(1), "knows", id(2));

        let removed = index.remove_item_cascade(id(6));
        assert_eq!(removed.len(), 3);
        assert_eq!(index.len(), 1);
        assert_eq!(index.objects_of(id(5), "precedes").count(), 0);
        assert_eq!(index.subjects_of(id(7), "precedes").count(), 0);
        assert_eq!(index.predicates_from(id(6), true).count(), 0);
        assert_eq!(index.predicates_from(id(5), true).collect::<Vec<_>>(), vec!["precedes"]);
        index.verify().unwrap();
    }

    #[test]
    fn test_restored_keys_list_only_with_include_empty() {
        let mut index = RelationIndex::new();
        index.restore_keys(id(5), &["greater_than".to_string()], &[]);
        index.restore_keys(id(1), &[], &["greater_than".to_string()]);
        index.add(id(5), "odd", id(9));
        index.add(id(5), "greater_than", id(4));

        assert_eq!(
            index.predicates_from(id(5), true).collect::<Vec<_>>(),
            vec!["greater_than", "odd"]
        );
        assert_eq!(index.predicates_to(id(1), true).collect::<Vec<_>>(), vec!["greater_than"]);
        assert_eq!(index.predicates_to(id(1), false).count(), 0);
        assert_eq!(index.len(), 2);
        index.verify().unwrap();
    }

    #[test]
    fn test_triples_enumerate_by_subject() {
        let mut index = RelationIndex::new();
        index.add(id(2), "b", id(3));
        index.add(id(1), "a", id(2));
        index.add(id(1), "a", id(3));

        let all: Vec<_> = index.triples().collect();
        assert_eq!(
            all,
            vec![(id(1), "a", id(2)), (id(1), "a", id(3)), (id(2), "b", id(3))]
        );
    }
}
