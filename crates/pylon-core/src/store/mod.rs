//! Keyed store backends.
//!
//! A [`KeyedStore`] is the map-like container inside every
//! [`Envelope`](crate::Envelope). It is owned by exactly one in-flight call
//! and therefore needs no internal synchronisation.
//!
//! Two backends are provided and must be observably identical:
//!
//! - [`LinearStore`]: a small vector scanned linearly. Cheapest while a call
//!   stores no more than a few dozen values, which is the common case.
//! - [`HashedStore`]: a hash table for calls that store many values.

mod hashed;
mod key;
mod linear;

pub use hashed::HashedStore;
pub use key::{HashableKey, Key};
pub use linear::LinearStore;

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// An untyped stored value. Readers downcast to the type they expect.
pub type Value = Box<dyn Any + Send>;

/// Map-like storage keyed by [`Key`].
///
/// `lookup` returning `None` means the key was never stored (or was removed);
/// a stored value is always returned as `Some`, whatever it contains.
pub trait KeyedStore: Send + fmt::Debug {
    /// Returns the value stored under `key`.
    fn lookup(&self, key: &Key) -> Option<&Value>;

    /// Returns the value stored under `key` for in-place mutation.
    fn lookup_mut(&mut self, key: &Key) -> Option<&mut Value>;

    /// Stores `value` under `key`.
    ///
    /// When the key is already present and `overwrite` is `false` this is a
    /// no-op and `value` is dropped.
    fn set(&mut self, key: Key, value: Value, overwrite: bool);

    /// Stores `value` under `key`, returning the previous value if any.
    fn swap(&mut self, key: Key, value: Value) -> Option<Value>;

    /// Removes and returns the value under `key`.
    fn remove(&mut self, key: &Key) -> Option<Value>;

    /// Removes every entry while keeping the allocated capacity.
    fn clear(&mut self);

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Number of entries the backend can hold without reallocating.
    fn capacity(&self) -> usize;

    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` is present.
    fn contains(&self, key: &Key) -> bool {
        self.lookup(key).is_some()
    }
}

/// Selects which [`KeyedStore`] implementation envelopes are created with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// [`LinearStore`].
    #[default]
    Linear,
    /// [`HashedStore`].
    Hashed,
}

impl StoreBackend {
    /// Creates an empty store of this kind.
    #[must_use]
    pub fn create(self) -> Box<dyn KeyedStore> {
        match self {
            Self::Linear => Box::new(LinearStore::new()),
            Self::Hashed => Box::new(HashedStore::new()),
        }
    }

    /// Returns the backend name used in configuration and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Hashed => "hashed",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(mut store: Box<dyn KeyedStore>) {
        let a = "a".store_key();
        let b = 2u8.store_key();

        assert!(store.is_empty());
        store.set(a, Box::new(1i32), true);
        store.set(a, Box::new(2i32), false);
        assert_eq!(store.lookup(&a).unwrap().downcast_ref::<i32>(), Some(&1));

        let previous = store.swap(a, Box::new(3i32)).unwrap();
        assert_eq!(previous.downcast_ref::<i32>(), Some(&1));
        assert!(store.swap(b, Box::new("b")).is_none());
        assert_eq!(store.len(), 2);

        let removed = store.remove(&b).unwrap();
        assert_eq!(removed.downcast_ref::<&str>(), Some(&"b"));
        assert!(store.remove(&b).is_none());
        assert!(!store.contains(&b));

        *store.lookup_mut(&a).unwrap().downcast_mut::<i32>().unwrap() += 1;
        assert_eq!(store.lookup(&a).unwrap().downcast_ref::<i32>(), Some(&4));
    }

    #[test]
    fn test_linear_contract() {
        exercise(StoreBackend::Linear.create());
    }

    #[test]
    fn test_hashed_contract() {
        exercise(StoreBackend::Hashed.create());
    }

    #[test]
    fn test_clear_keeps_capacity() {
        for backend in [StoreBackend::Linear, StoreBackend::Hashed] {
            let mut store = backend.create();
            for i in 0..40u32 {
                store.set(i.store_key(), Box::new(i), true);
            }
            let capacity = store.capacity();
            store.clear();
            assert!(store.is_empty(), "{backend} not empty after clear");
            assert_eq!(store.capacity(), capacity, "{backend} lost capacity");
        }
    }

    #[test]
    fn test_backend_serde_names() {
        let json = serde_json::to_string(&StoreBackend::Hashed).unwrap();
        assert_eq!(json, "\"hashed\"");
        let parsed: StoreBackend = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(parsed, StoreBackend::Linear);
    }
}
