//! Type-directed store keys.
//!
//! Every value in a [`KeyedStore`](super::KeyedStore) is addressed by a
//! [`Key`]. Keys are produced through the [`HashableKey`] trait, so the
//! hashing strategy is chosen statically from the key's declared type:
//!
//! | Declared type                | Key kind            | Identity                    |
//! |------------------------------|---------------------|-----------------------------|
//! | `str`, `String`              | [`Key::Text`]       | content hash                |
//! | `i8`..`i64`, `u8`..`u64`, ... | [`Key::Integer`]    | integer type + numeric value |
//! | marker types ([`marker_key!`]) | [`Key::Marker`]     | type identity only          |
//!
//! The kind and, where present, the type identity participate in equality,
//! so `"1"` and `1u32` (or `1u32` and `1u64`) address different entries.
//!
//! [`marker_key!`]: crate::marker_key

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A hashed store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Textual key, identified by the hash of its content.
    ///
    /// `DefaultHasher::new()` uses fixed keys, so the hash is stable across
    /// processes and runs.
    Text(u64),

    /// Fixed-width integer key.
    Integer {
        /// The concrete integer type.
        ty: TypeId,
        /// The value's bit pattern widened to 64 bits.
        value: u64,
    },

    /// Zero-size marker type used as a compile-time unique identifier.
    Marker(TypeId),
}

impl Key {
    /// Builds a text key from its content.
    #[must_use]
    pub fn text(content: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self::Text(hasher.finish())
    }

    /// Builds a marker key identified solely by `T`.
    #[must_use]
    pub fn marker<T: 'static>() -> Self {
        Self::Marker(TypeId::of::<T>())
    }

    /// Builds an integer key for the integer type `T`.
    #[must_use]
    pub fn integer<T: 'static>(value: u64) -> Self {
        Self::Integer {
            ty: TypeId::of::<T>(),
            value,
        }
    }
}

/// Types usable as store keys.
///
/// Implemented for text, fixed-width integers, [`Key`] itself and references
/// to any of those. Declare marker keys with [`marker_key!`](crate::marker_key).
pub trait HashableKey {
    /// Returns the store key for `self`.
    fn store_key(&self) -> Key;
}

impl HashableKey for Key {
    fn store_key(&self) -> Key {
        *self
    }
}

impl HashableKey for str {
    fn store_key(&self) -> Key {
        Key::text(self)
    }
}

impl HashableKey for String {
    fn store_key(&self) -> Key {
        Key::text(self)
    }
}

impl<T: HashableKey + ?Sized> HashableKey for &T {
    fn store_key(&self) -> Key {
        (**self).store_key()
    }
}

macro_rules! integer_keys {
    ($($ty:ty),* $(,)?) => {
        $(
            impl HashableKey for $ty {
                #[allow(clippy::cast_sign_loss, clippy::cast_lossless, clippy::unnecessary_cast)]
                fn store_key(&self) -> Key {
                    Key::integer::<$ty>(*self as u64)
                }
            }
        )*
    };
}

integer_keys!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Declares a zero-size marker type usable as a [`HashableKey`].
///
/// ```
/// pylon_core::marker_key! {
///     /// Where the authenticated user is stored.
///     pub struct UserKey;
/// }
///
/// let mut store = pylon_core::store::StoreBackend::Linear.create();
/// let key = pylon_core::store::HashableKey::store_key(&UserKey);
/// store.set(key, Box::new("alice"), true);
/// assert_eq!(store.len(), 1);
/// ```
///
/// An existing type can be turned into a marker with `marker_key!(for Type);`.
#[macro_export]
macro_rules! marker_key {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name;

        $crate::marker_key!(for $name);
    };
    (for $ty:ty) => {
        impl $crate::store::HashableKey for $ty {
            fn store_key(&self) -> $crate::store::Key {
                $crate::store::Key::marker::<$ty>()
            }
        }
    };
}
