use super::{Key, KeyedStore, Value};
use std::collections::HashMap;

/// Hash-table store for calls that keep many values.
#[derive(Debug, Default)]
pub struct HashedStore {
    entries: HashMap<Key, Value>,
}

impl HashedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }
}

impl KeyedStore for HashedStore {
    fn lookup(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    fn lookup_mut(&mut self, key: &Key) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    fn set(&mut self, key: Key, value: Value, overwrite: bool) {
        if overwrite {
            self.entries.insert(key, value);
        } else {
            self.entries.entry(key).or_insert(value);
        }
    }

    fn swap(&mut self, key: Key, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        self.entries.remove(key)
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
