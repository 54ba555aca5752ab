//! The per-request store envelope.
//!
//! An [`Envelope`] wraps one [`KeyedStore`] together with fixed slots for the
//! facts nearly every request touches: the first recorded error and its
//! detail text, a [`Flags`] set, the matched route template and the active
//! [`CodecPair`].
//!
//! Envelopes are created and recycled by the
//! [`StoreManager`](crate::StoreManager); user code reaches them through a
//! [`CallContext`](crate::CallContext) or an [`Exchange`](crate::Exchange).
//!
//! # Error slots
//!
//! The error and its detail are write-once per request: the first stage to
//! record one wins and later writes are ignored until [`Envelope::clear_error`]
//! resets both slots together.

use crate::codec::CodecPair;
use crate::error::RecordedError;
use crate::flags::Flags;
use crate::store::{HashableKey, KeyedStore, StoreBackend, Value};
use std::any::Any;
use std::ops::{Deref, DerefMut};

/// Per-request store plus metadata slots.
#[derive(Debug)]
pub struct Envelope {
    store: Box<dyn KeyedStore>,
    error: Option<RecordedError>,
    error_detail: String,
    flags: Flags,
    original_path: String,
    codec: CodecPair,
}

impl Envelope {
    /// Creates an empty envelope with the given backend and codec.
    #[must_use]
    pub fn new(backend: StoreBackend, codec: CodecPair) -> Self {
        Self {
            store: backend.create(),
            error: None,
            error_detail: String::new(),
            flags: Flags::empty(),
            original_path: String::new(),
            codec,
        }
    }

    /// Direct access to the backing store.
    #[must_use]
    pub fn store(&self) -> &dyn KeyedStore {
        &*self.store
    }

    /// Mutable access to the backing store.
    pub fn store_mut(&mut self) -> &mut dyn KeyedStore {
        &mut *self.store
    }

    /// Returns the value under `key` if it is present and a `T`.
    ///
    /// Absent keys and values of another type both yield `None`; use
    /// [`lookup`](Self::lookup) to tell them apart.
    pub fn get<T: Any>(&self, key: impl HashableKey) -> Option<&T> {
        self.store.lookup(&key.store_key())?.downcast_ref()
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut<T: Any>(&mut self, key: impl HashableKey) -> Option<&mut T> {
        self.store.lookup_mut(&key.store_key())?.downcast_mut()
    }

    /// Returns a clone of the `T` under `key`, or `default`.
    pub fn get_or<T: Any + Clone>(&self, key: impl HashableKey, default: T) -> T {
        self.get::<T>(key).cloned().unwrap_or(default)
    }

    /// Returns the untyped value under `key`, distinguishing "stored" from
    /// "never stored" regardless of the value's type.
    pub fn lookup(&self, key: impl HashableKey) -> Option<&(dyn Any + Send)> {
        self.store.lookup(&key.store_key()).map(|value| &**value)
    }

    /// Returns `true` if anything is stored under `key`.
    pub fn contains(&self, key: impl HashableKey) -> bool {
        self.store.contains(&key.store_key())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send>(&mut self, key: impl HashableKey, value: T) {
        self.store.set(key.store_key(), Box::new(value), true);
    }

    /// Stores `value` under `key` only if the key is absent.
    ///
    /// Returns `true` if the value was stored.
    pub fn insert_if_absent<T: Any + Send>(&mut self, key: impl HashableKey, value: T) -> bool {
        let key = key.store_key();
        if self.store.contains(&key) {
            return false;
        }
        self.store.set(key, Box::new(value), false);
        true
    }

    /// Stores `value` under `key` and returns what was there before.
    pub fn swap<T: Any + Send>(&mut self, key: impl HashableKey, value: T) -> Option<Value> {
        self.store.swap(key.store_key(), Box::new(value))
    }

    /// Removes and returns the untyped value under `key`.
    pub fn remove(&mut self, key: impl HashableKey) -> Option<Value> {
        self.store.remove(&key.store_key())
    }

    /// Removes the value under `key` if it is a `T` and returns it.
    ///
    /// A value of another type is left in place.
    pub fn take<T: Any>(&mut self, key: impl HashableKey) -> Option<T> {
        let key = key.store_key();
        match self.store.remove(&key)?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.store.set(key, other, true);
                None
            }
        }
    }

    /// Number of stored values.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.store.len()
    }

    /// Returns the recorded error.
    #[must_use]
    pub fn error(&self) -> Option<&RecordedError> {
        self.error.as_ref()
    }

    /// Returns `true` if an error is recorded.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Records `error` unless one is already recorded.
    ///
    /// Returns `true` if this call recorded it.
    pub fn record_error(&mut self, error: impl Into<RecordedError>) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.error = Some(error.into());
        true
    }

    /// Returns the recorded error detail, or `""`.
    #[must_use]
    pub fn error_detail(&self) -> &str {
        &self.error_detail
    }

    /// Records a non-empty error detail unless one is already recorded.
    ///
    /// Returns `true` if this call recorded it.
    pub fn record_error_detail(&mut self, detail: impl AsRef<str>) -> bool {
        let detail = detail.as_ref();
        if !self.error_detail.is_empty() || detail.is_empty() {
            return false;
        }
        self.error_detail.push_str(detail);
        true
    }

    /// Clears both the error and its detail.
    pub fn clear_error(&mut self) {
        self.error = None;
        self.error_detail.clear();
    }

    /// Current flags.
    #[must_use]
    pub const fn flags(&self) -> Flags {
        self.flags
    }

    /// Returns `true` if all bits of `flag` are set.
    #[must_use]
    pub const fn has_flag(&self, flag: Flags) -> bool {
        self.flags.contains(flag)
    }

    /// Sets or clears `flag`.
    pub fn set_flag(&mut self, flag: Flags, on: bool) {
        self.flags.set(flag, on);
    }

    /// Whether the connection was hijacked.
    #[must_use]
    pub const fn is_hijacked(&self) -> bool {
        self.has_flag(Flags::HIJACKED)
    }

    /// Whether routing found no match.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.has_flag(Flags::NOT_FOUND)
    }

    /// Whether routing rejected the method.
    #[must_use]
    pub const fn is_not_allowed(&self) -> bool {
        self.has_flag(Flags::NOT_ALLOWED)
    }

    /// Whether ownership left the store manager.
    #[must_use]
    pub const fn is_transferred(&self) -> bool {
        self.has_flag(Flags::TRANSFERRED)
    }

    /// The route template that matched, or `""`.
    #[must_use]
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    /// Replaces the route template.
    pub fn set_original_path(&mut self, path: impl AsRef<str>) {
        self.original_path.clear();
        self.original_path.push_str(path.as_ref());
    }

    /// The active codec pair.
    #[must_use]
    pub fn codec(&self) -> &CodecPair {
        &self.codec
    }

    /// Replaces the active codec pair.
    pub fn set_codec(&mut self, codec: CodecPair) {
        self.codec = codec;
    }

    /// Prepares a pooled envelope for a new request.
    pub(crate) fn prepare(&mut self, codec: &CodecPair) {
        self.flags = Flags::empty();
        self.clear_error();
        self.codec = codec.clone();
    }

    /// Returns the envelope to its pristine state, keeping store capacity.
    pub fn reset(&mut self) {
        self.store.clear();
        self.clear_error();
        self.flags = Flags::empty();
        self.original_path.clear();
    }
}

/// An envelope whose ownership was transferred out of the store manager.
///
/// Obtained from [`StoreManager::transfer`](crate::StoreManager::transfer).
/// The handle is unique: it cannot be cloned, and the context it came from no
/// longer holds the envelope. Dropping it frees the envelope; handing it to
/// [`StoreManager::reclaim`](crate::StoreManager::reclaim) returns it to the
/// pool.
#[derive(Debug)]
pub struct OwnedEnvelope(pub(crate) Box<Envelope>);

impl Deref for OwnedEnvelope {
    type Target = Envelope;

    fn deref(&self) -> &Envelope {
        &self.0
    }
}

impl DerefMut for OwnedEnvelope {
    fn deref_mut(&mut self) -> &mut Envelope {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;

    crate::marker_key!(struct SessionKey;);

    fn envelope() -> Envelope {
        Envelope::new(StoreBackend::Linear, CodecPair::json())
    }

    #[test]
    fn test_error_is_write_once() {
        let mut env = envelope();
        assert!(env.record_error("first"));
        assert!(!env.record_error("second"));
        assert_eq!(env.error().unwrap().to_string(), "first");
    }

    #[test]
    fn test_detail_is_write_once_and_ignores_empty() {
        let mut env = envelope();
        assert!(!env.record_error_detail(""));
        assert!(env.record_error_detail("field `id`"));
        assert!(!env.record_error_detail("field `name`"));
        assert_eq!(env.error_detail(), "field `id`");
    }

    #[test]
    fn test_clear_error_resets_both() {
        let mut env = envelope();
        env.record_error(HttpError::bad_request("bad"));
        env.record_error_detail("why");
        env.clear_error();

        assert!(env.error().is_none());
        assert_eq!(env.error_detail(), "");
        assert!(env.record_error("again"));
    }

    #[test]
    fn test_text_and_integer_keys_are_independent() {
        let mut env = envelope();
        env.insert("1", "text");
        env.insert(1i32, "integer");

        assert_eq!(env.get::<&str>("1"), Some(&"text"));
        assert_eq!(env.get::<&str>(1i32), Some(&"integer"));
        assert_eq!(env.value_count(), 2);
    }

    #[test]
    fn test_lookup_distinguishes_wrong_type_from_absent() {
        let mut env = envelope();
        env.insert(SessionKey, 42u64);

        assert!(env.get::<String>(SessionKey).is_none());
        assert!(env.lookup(SessionKey).is_some());
        assert!(env.lookup("missing").is_none());
        assert_eq!(env.get_or(SessionKey, 0u64), 42);
        assert_eq!(env.get_or("missing", 5u64), 5);
    }

    #[test]
    fn test_insert_if_absent_and_swap() {
        let mut env = envelope();
        assert!(env.insert_if_absent("k", 1u8));
        assert!(!env.insert_if_absent("k", 2u8));
        assert_eq!(env.get::<u8>("k"), Some(&1));

        let previous = env.swap("k", 3u8).unwrap();
        assert_eq!(previous.downcast_ref::<u8>(), Some(&1));
        assert_eq!(env.get::<u8>("k"), Some(&3));
    }

    #[test]
    fn test_take_leaves_other_types() {
        let mut env = envelope();
        env.insert("n", 9u32);

        assert_eq!(env.take::<String>("n"), None);
        assert!(env.contains("n"));
        assert_eq!(env.take::<u32>("n"), Some(9));
        assert!(!env.contains("n"));
    }

    #[test]
    fn test_get_mut() {
        let mut env = envelope();
        env.insert("hits", vec![1u8]);
        env.get_mut::<Vec<u8>>("hits").unwrap().push(2);
        assert_eq!(env.get::<Vec<u8>>("hits").unwrap(), &[1, 2]);
    }

    #[test]
    fn test_reset_restores_pristine_state() {
        let mut env = envelope();
        env.insert("k", 1u8);
        env.record_error("e");
        env.record_error_detail("d");
        env.set_flag(Flags::NOT_FOUND, true);
        env.set_original_path("/users/{id}");

        env.reset();

        assert_eq!(env.value_count(), 0);
        assert!(!env.has_error());
        assert_eq!(env.error_detail(), "");
        assert!(env.flags().is_empty());
        assert_eq!(env.original_path(), "");
    }

    #[test]
    fn test_prepare_keeps_store_but_resets_state() {
        let mut env = envelope();
        env.insert("k", 1u8);
        env.record_error("e");
        env.set_flag(Flags::HIJACKED, true);

        env.prepare(&CodecPair::json());

        assert!(env.contains("k"));
        assert!(!env.has_error());
        assert!(!env.is_hijacked());
    }
}
