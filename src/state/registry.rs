//! Case-folded name index.

use crate::casemap::irc_to_lower;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Ordered map keyed by IRC-folded names.
///
/// Lookups accept any casing; iteration is in folded-key order, which
/// keeps sweeps and snapshots deterministic.
#[derive(Debug, Clone)]
pub struct NameIndex<V> {
    map: BTreeMap<String, V>,
}

impl<V> Default for NameIndex<V> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }
}

impl<V> NameIndex<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`. Returns the value back if the name is already bound.
    pub fn insert(&mut self, name: &str, value: V) -> Result<(), V> {
        match self.map.entry(irc_to_lower(name)) {
            Entry::Occupied(_) => Err(value),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.map.get(&irc_to_lower(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.map.get_mut(&irc_to_lower(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<V> {
        self.map.remove(&irc_to_lower(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&irc_to_lower(name))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Folded keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.map.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_exclusive_across_casings() {
        let mut index = NameIndex::new();
        assert!(index.insert("Alice", 1).is_ok());
        assert_eq!(index.insert("ALICE", 2), Err(2));
        assert_eq!(index.get("alice"), Some(&1));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rfc1459_keys_collide() {
        let mut index = NameIndex::new();
        assert!(index.insert("nick[1]", ()).is_ok());
        assert!(index.contains("NICK{1}"));
        assert!(index.remove("nick{1}").is_some());
        assert!(index.is_empty());
    }

    #[test]
    fn iterates_in_folded_order() {
        let mut index = NameIndex::new();
        for name in ["Charlie", "alice", "Bob"] {
            let _ = index.insert(name, name.to_string());
        }
        let keys: Vec<_> = index.keys().collect();
        assert_eq!(keys, ["alice", "bob", "charlie"]);
    }
}
