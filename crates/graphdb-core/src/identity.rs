//! Item interning: every distinct value gets exactly one stable `ItemId`.
//!
//! The store keeps both directions (value → id, id → value). Ids are handed
//! out monotonically and are never reused for the lifetime of the store, even
//! after the item they named is forgotten.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

/// Interned item ID (4 bytes, dense, monotonically assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ItemId(u32);

impl ItemId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value interner: maps values to compact IDs and back.
#[derive(Debug, Clone)]
pub struct IdentityStore<V> {
    /// Value to ID mapping
    value_to_id: AHashMap<V, ItemId>,
    /// ID to value mapping, ordered by id so iteration follows first insertion
    id_to_value: BTreeMap<ItemId, V>,
    /// Next available ID
    next_id: u32,
}

impl<V: Clone + Eq + Hash> IdentityStore<V> {
    pub fn new() -> Self {
        Self {
            value_to_id: AHashMap::new(),
            id_to_value: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Intern a value, returning its ID.
    ///
    /// Returns the existing ID when an equal value is already known; the
    /// duplicate path does not touch any state.
    pub fn intern(&mut self, value: V) -> ItemId {
        if let Some(&id) = self.value_to_id.get(&value) {
            return id;
        }

        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.value_to_id.insert(value.clone(), id);
        self.id_to_value.insert(id, value);
        id
    }

    /// Look up an existing ID for a value without inserting.
    pub fn id_of(&self, value: &V) -> Option<ItemId> {
        self.value_to_id.get(value).copied()
    }

    /// Look up a value by ID.
    pub fn value_of(&self, id: ItemId) -> Option<&V> {
        self.id_to_value.get(&id)
    }

    pub fn contains(&self, value: &V) -> bool {
        self.value_to_id.contains_key(value)
    }

    pub fn contains_id(&self, id: ItemId) -> bool {
        self.id_to_value.contains_key(&id)
    }

    /// Drop both mappings for `id`, returning the value it named.
    ///
    /// Relations mentioning `id` are not touched here; callers cascade first.
    pub fn forget(&mut self, id: ItemId) -> Option<V> {
        let value = self.id_to_value.remove(&id)?;
        self.value_to_id.remove(&value);
        Some(value)
    }

    /// Re-point an existing ID at a new value, returning the previous value.
    ///
    /// Returns `None` (and changes nothing) when `id` is unknown or when
    /// `value` already names a different item.
    pub fn rebind(&mut self, id: ItemId, value: V) -> Option<V> {
        if let Some(&other) = self.value_to_id.get(&value) {
            if other != id {
                return None;
            }
        }
        let slot = self.id_to_value.get_mut(&id)?;
        let previous = std::mem::replace(slot, value.clone());
        self.value_to_id.remove(&previous);
        self.value_to_id.insert(value, id);
        Some(previous)
    }

    /// Install a mapping with a caller-chosen ID (used when replaying a
    /// persisted snapshot). Any previous value bound to `id` is replaced and
    /// the allocation counter moves past `id`.
    pub fn restore(&mut self, id: ItemId, value: V) {
        if let Some(previous) = self.id_to_value.remove(&id) {
            self.value_to_id.remove(&previous);
        }
        if let Some(stale) = self.value_to_id.insert(value.clone(), id) {
            self.id_to_value.remove(&stale);
        }
        self.id_to_value.insert(id, value);
        self.next_id = self.next_id.max(id.0 + 1);
    }

    /// All live items, in ID (first-insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &V)> + '_ {
        self.id_to_value.iter().map(|(&id, value)| (id, value))
    }

    pub fn len(&self) -> usize {
        self.id_to_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_value.is_empty()
    }
}

impl<V: Clone + Eq + Hash> Default for IdentityStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut ids = IdentityStore::new();
        let a = ids.intern("alpha".to_string());
        let b = ids.intern("beta".to_string());
        let again = ids.intern("alpha".to_string());

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(ids.id_of(&"alpha".to_string()), Some(a));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_forgotten_ids_are_not_reused() {
        let mut ids = IdentityStore::new();
        let a = ids.intern(1);
        ids.forget(a);
        let b = ids.intern(1);

        assert_ne!(a, b);
        assert!(ids.value_of(a).is_none());
        assert_eq!(ids.value_of(b), Some(&1));
    }

    #[test]
    fn test_rebind_refuses_to_merge_items() {
        let mut ids = IdentityStore::new();
        let a = ids.intern(1);
        let b = ids.intern(2);

        assert_eq!(ids.rebind(a, 2), None);
        assert_eq!(ids.value_of(a), Some(&1));
        assert_eq!(ids.value_of(b), Some(&2));

        assert_eq!(ids.rebind(a, 3), Some(1));
        assert_eq!(ids.id_of(&3), Some(a));
        assert!(!ids.contains(&1));
    }

    #[test]
    fn test_restore_advances_allocation() {
        let mut ids = IdentityStore::new();
        ids.restore(ItemId::new(7), "seven");
        let next = ids.intern("eight");

        assert_eq!(next, ItemId::new(8));
        assert_eq!(ids.iter().map(|(id, _)| id.raw()).collect::<Vec<_>>(), vec![7, 8]);
    }
}
