//! Capability traits and error identity.
//!
//! The classification engine works on `&dyn Error`. Anything beyond the
//! message (self-reported flags, a captured stack, a stable identity) is an
//! optional capability expressed as a trait:
//!
//! - [`ErrorWithFlags`]: the error reports its own categories
//! - [`ErrorWithStack`]: the error carries a captured [`Trace`]
//! - [`ErrorWithId`]: the error has a process-unique [`ErrorId`], making it
//!   addressable by the instance registry
//!
//! The crate's own error types implement all three. Foreign types opt in by
//! implementing a trait and registering an adapter on the
//! [`crate::FlagRegistry`] (`expose_flags`, `expose_stack`, `expose_id`), which
//! lets the registry recover the capability from a type-erased error through a
//! plain downcast.
//!
//! Errors often reach the engine already boxed or shared (`Box<T>`, `Arc<T>`
//! both implement `Error`). [`downcast_through`] resolves those to the `T`
//! inside, so a wrapper never hides the concrete type.

use crate::flags::ErrFlag;
use crate::stack::Trace;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased error as accepted by the classification API.
pub type DynError = dyn Error + 'static;

/// Owned, thread-safe, type-erased error.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

static NEXT_ERROR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an error instance.
///
/// Assigned once at construction. Clones share the identity of the value they
/// were cloned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorId(u64);

impl ErrorId {
    /// Allocate a fresh identity.
    #[inline]
    pub fn next() -> Self {
        Self(NEXT_ERROR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "err#{}", self.0)
    }
}

/// `err` as a `T`, looking through one `Box` or `Arc` around it.
pub fn downcast_through<T: Error + 'static>(err: &DynError) -> Option<&T> {
    err.downcast_ref::<T>()
        .or_else(|| err.downcast_ref::<Box<T>>().map(|boxed| &**boxed))
        .or_else(|| err.downcast_ref::<Arc<T>>().map(|shared| &**shared))
}

/// An error that reports its own categories.
pub trait ErrorWithFlags: Error {
    /// Categories carried by this error.
    fn flags(&self) -> ErrFlag;

    /// Exact bit match against [`ErrorWithFlags::flags`].
    fn has_flags(&self, flags: ErrFlag) -> bool {
        self.flags().contains(flags)
    }
}

/// An error carrying the stack captured when it was created.
pub trait ErrorWithStack: Error {
    /// Frames, newest first.
    fn stack(&self) -> &Trace;
}

/// An error addressable by identity.
pub trait ErrorWithId: Error {
    fn error_id(&self) -> ErrorId;
}
