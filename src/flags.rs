//! Error flag bitmask - the semantic taxonomy errors are classified with.
//!
//! Every bit of an [`ErrFlag`] is an independent category. One error may carry
//! several categories at once (e.g. `NOT_FOUND | UNAUTHORIZED`), so flags are
//! always combined with bitwise OR and queried with exact bit matches.
//!
//! # Predefined Taxonomy
//!
//! | Bit | Constant | Name |
//! |-----|----------|------|
//! | 0 | `UNHANDLED` | unhandled |
//! | 1 | `BAD_REQUEST` | bad request |
//! | 2 | `NOT_FOUND` | not found |
//! | 3 | `UNAUTHORIZED` | unauthorized |
//! | 4 | `NOT_IMPLEMENTED` | not implemented |
//! | 5 | `OPERATION_TIMEOUT` | operation timeout |
//! | 6 | `CONFLICT` | conflict |
//!
//! Applications are free to use a custom set of bits instead. In that case the
//! names should be registered in a [`FlagNames`] table and the status mapping
//! replaced through [`crate::StatusMapper::set_mapping`].
//!
//! # Example
//!
//! ```rust
//! use flagged_errors::ErrFlag;
//!
//! let flags = ErrFlag::NOT_FOUND | ErrFlag::UNAUTHORIZED;
//! assert!(flags.contains(ErrFlag::NOT_FOUND));
//! assert!(!flags.contains(ErrFlag::NOT_FOUND | ErrFlag::CONFLICT));
//! assert_eq!(flags.bits().count(), 2);
//! assert_eq!(ErrFlag::NOT_FOUND.to_string(), "not found");
//! assert_eq!(flags.to_string(), "unknown");
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of usable bits in an [`ErrFlag`].
pub const FLAG_BITS: u32 = u32::BITS;

/// Bitmask of semantic error categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ErrFlag(u32);

impl ErrFlag {
    /// No category.
    pub const NONE: Self = Self(0);
    /// Unhandled / internal failure.
    pub const UNHANDLED: Self = Self(1 << 0);
    /// Malformed or invalid input.
    pub const BAD_REQUEST: Self = Self(1 << 1);
    /// Requested entity does not exist.
    pub const NOT_FOUND: Self = Self(1 << 2);
    /// Caller is not authorized.
    pub const UNAUTHORIZED: Self = Self(1 << 3);
    /// Operation is not implemented.
    pub const NOT_IMPLEMENTED: Self = Self(1 << 4);
    /// Operation exceeded its deadline.
    pub const OPERATION_TIMEOUT: Self = Self(1 << 5);
    /// Operation conflicts with current state.
    pub const CONFLICT: Self = Self(1 << 6);

    /// Build a flag from raw bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Single-bit flag at position `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= 32`.
    #[inline]
    pub const fn bit(index: u32) -> Self {
        assert!(index < FLAG_BITS, "flag bit index out of range");
        Self(1 << index)
    }

    /// Raw bit value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True when no bit is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of categories set.
    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// True when exactly one bit is set.
    #[inline]
    pub const fn is_single(self) -> bool {
        self.0.count_ones() == 1
    }

    /// Exact bit match: every bit of `other` is present in `self`.
    ///
    /// An empty `other` is always contained.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when at least one bit is shared.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// `self` with every bit of `other` cleared.
    #[inline]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Iterate the single-bit constituents in ascending bit order.
    #[inline]
    pub fn bits(self) -> impl Iterator<Item = ErrFlag> {
        let mut remaining = self.0;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let lowest = remaining & remaining.wrapping_neg();
            remaining &= !lowest;
            Some(ErrFlag(lowest))
        })
    }

    /// Split into single-bit constituents.
    ///
    /// Most flags carry a handful of bits, so the result stays inline.
    pub fn split(self) -> SmallVec<[ErrFlag; 8]> {
        self.bits().collect()
    }

    /// Built-in name of this exact value, if it is one of the predefined flags.
    pub const fn builtin_name(self) -> Option<&'static str> {
        match self {
            Self::UNHANDLED => Some("unhandled"),
            Self::BAD_REQUEST => Some("bad request"),
            Self::NOT_FOUND => Some("not found"),
            Self::UNAUTHORIZED => Some("unauthorized"),
            Self::NOT_IMPLEMENTED => Some("not implemented"),
            Self::OPERATION_TIMEOUT => Some("operation timeout"),
            Self::CONFLICT => Some("conflict"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.builtin_name().unwrap_or(UNKNOWN_FLAG_NAME))
    }
}

impl fmt::Binary for ErrFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl From<u32> for ErrFlag {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<ErrFlag> for u32 {
    fn from(flag: ErrFlag) -> Self {
        flag.0
    }
}

impl BitOr for ErrFlag {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrFlag {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ErrFlag {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for ErrFlag {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl BitXor for ErrFlag {
    type Output = Self;
    #[inline]
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for ErrFlag {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl Not for ErrFlag {
    type Output = Self;
    #[inline]
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl std::iter::FromIterator<ErrFlag> for ErrFlag {
    fn from_iter<I: IntoIterator<Item = ErrFlag>>(iter: I) -> Self {
        iter.into_iter().fold(ErrFlag::NONE, |acc, f| acc | f)
    }
}

// ============================================================================
// Name Table
// ============================================================================

/// Name rendered for values missing from a name table.
pub const UNKNOWN_FLAG_NAME: &str = "unknown";

/// Mutable flag-to-name table.
///
/// Seeded with the predefined taxonomy. Lookups are exact-value matches, so a
/// composite flag only has a name if that exact composite was registered.
pub struct FlagNames {
    names: RwLock<HashMap<ErrFlag, Cow<'static, str>>>,
}

impl FlagNames {
    /// Table seeded with the predefined flag names.
    pub fn new() -> Self {
        let names = [
            ErrFlag::UNHANDLED,
            ErrFlag::BAD_REQUEST,
            ErrFlag::NOT_FOUND,
            ErrFlag::UNAUTHORIZED,
            ErrFlag::NOT_IMPLEMENTED,
            ErrFlag::OPERATION_TIMEOUT,
            ErrFlag::CONFLICT,
        ]
        .into_iter()
        .filter_map(|f| f.builtin_name().map(|n| (f, Cow::Borrowed(n))))
        .collect();

        Self {
            names: RwLock::new(names),
        }
    }

    /// Empty table, for applications defining their own taxonomy.
    pub fn empty() -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    fn read_names(&self) -> RwLockReadGuard<'_, HashMap<ErrFlag, Cow<'static, str>>> {
        match self.names.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[inline]
    fn write_names(&self) -> RwLockWriteGuard<'_, HashMap<ErrFlag, Cow<'static, str>>> {
        match self.names.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Name of `flag`, or `"unknown"`.
    pub fn name_of(&self, flag: ErrFlag) -> Cow<'static, str> {
        self.read_names()
            .get(&flag)
            .cloned()
            .unwrap_or(Cow::Borrowed(UNKNOWN_FLAG_NAME))
    }

    /// Register or rename a flag.
    pub fn set_name(&self, flag: ErrFlag, name: impl Into<Cow<'static, str>>) {
        self.write_names().insert(flag, name.into());
    }

    /// Replace the whole table.
    pub fn replace(&self, names: impl IntoIterator<Item = (ErrFlag, Cow<'static, str>)>) {
        let table: HashMap<_, _> = names.into_iter().collect();
        *self.write_names() = table;
    }

    /// Names of every set bit, in ascending bit order, joined with `|`.
    pub fn describe(&self, flags: ErrFlag) -> String {
        if flags.is_empty() {
            return String::new();
        }
        let names = self.read_names();
        flags
            .bits()
            .map(|bit| names.get(&bit).map_or(UNKNOWN_FLAG_NAME, |n| n.as_ref()))
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl Default for FlagNames {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlagNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagNames")
            .field("entries", &self.read_names().len())
            .finish()
    }
}
