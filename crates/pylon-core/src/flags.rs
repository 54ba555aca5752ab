//! Envelope flag bits.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A small bit set of per-request facts.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    /// The connection was taken over by a handler (protocol upgrade).
    pub const HIJACKED: Self = Self(1 << 0);
    /// No route matched the request path.
    pub const NOT_FOUND: Self = Self(1 << 1);
    /// A route matched the path but not the method.
    pub const NOT_ALLOWED: Self = Self(1 << 2);
    /// Envelope ownership left the store manager.
    pub const TRANSFERRED: Self = Self(1 << 3);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::HIJACKED, "HIJACKED"),
        (Self::NOT_FOUND, "NOT_FOUND"),
        (Self::NOT_ALLOWED, "NOT_ALLOWED"),
        (Self::TRANSFERRED, "TRANSFERRED"),
    ];

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Sets or clears the bits of `other`.
    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut flags = Flags::empty();
        flags.insert(Flags::NOT_FOUND);
        flags |= Flags::HIJACKED;
        assert!(flags.contains(Flags::NOT_FOUND | Flags::HIJACKED));
        assert!(!flags.contains(Flags::TRANSFERRED));

        flags.set(Flags::NOT_FOUND, false);
        assert!(!flags.contains(Flags::NOT_FOUND));
        assert_eq!(flags, Flags::HIJACKED);
    }

    #[test]
    fn test_debug_lists_names() {
        let flags = Flags::NOT_ALLOWED | Flags::TRANSFERRED;
        assert_eq!(format!("{flags:?}"), "{NOT_ALLOWED, TRANSFERRED}");
        assert_eq!(format!("{:?}", Flags::empty()), "{}");
    }
}
