use super::{Key, KeyedStore, Value};

/// Slots reserved up front; most calls never outgrow them.
const INITIAL_CAPACITY: usize = 16;

/// Linear-scan store backed by a vector of entries.
///
/// Every operation is O(n) but only compares precomputed keys, so for small
/// n it beats hashing. Removal moves the last entry into the freed slot;
/// entry order is not part of the contract.
#[derive(Debug)]
pub struct LinearStore {
    entries: Vec<(Key, Value)>,
}

impl LinearStore {
    /// Creates an empty store with the default reserved capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates an empty store with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    fn position(&self, key: &Key) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl Default for LinearStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedStore for LinearStore {
    fn lookup(&self, key: &Key) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn lookup_mut(&mut self, key: &Key) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn set(&mut self, key: Key, value: Value, overwrite: bool) {
        match self.position(&key) {
            Some(index) if overwrite => self.entries[index].1 = value,
            Some(_) => {}
            None => self.entries.push((key, value)),
        }
    }

    fn swap(&mut self, key: Key, value: Value) -> Option<Value> {
        match self.position(&key) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        let index = self.position(key)?;
        Some(self.entries.swap_remove(index).1)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.entries.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HashableKey;

    #[test]
    fn test_preallocates() {
        assert!(LinearStore::new().capacity() >= INITIAL_CAPACITY);
    }

    #[test]
    fn test_remove_from_middle_keeps_others() {
        let mut store = LinearStore::new();
        for i in 0..5u16 {
            store.set(i.store_key(), Box::new(i), true);
        }
        store.remove(&2u16.store_key());

        assert_eq!(store.len(), 4);
        for i in [0u16, 1, 3, 4] {
            let value = store.lookup(&i.store_key()).unwrap();
            assert_eq!(value.downcast_ref::<u16>(), Some(&i));
        }
    }
}
