//! Stack-carrying plain errors and their fluent builder.
//!
//! [`BasicError`] is the lightweight counterpart of [`crate::StructuredError`]:
//! a message, optional flags, a captured trace and an identity, without any
//! transport classification. Use it anywhere an error should remember where it
//! came from.
//!
//! ```rust
//! use flagged_errors::{ErrFlag, ErrorBuilder, ErrorWithFlags, new_error, join_errors};
//!
//! let plain = new_error("connection reset");
//! assert_eq!(plain.to_string(), "connection reset");
//!
//! let flagged = ErrorBuilder::new()
//!     .with_flags(ErrFlag::NOT_FOUND)
//!     .error("user 42 not found");
//! assert!(flagged.has_flags(ErrFlag::NOT_FOUND));
//!
//! let joined = join_errors("failed to finish transaction", ["file not found", "db unreachable"]);
//! assert_eq!(
//!     joined.unwrap().to_string(),
//!     "failed to finish transaction\n - file not found\n - db unreachable"
//! );
//! ```

use crate::definitions::{ErrorId, ErrorWithFlags, ErrorWithId, ErrorWithStack};
use crate::flags::ErrFlag;
use crate::stack::{self, CaptureOptions, Trace};
use std::error::Error;
use std::fmt;
use std::panic::Location;

/// Separator placed between the title and each joined message.
pub const JOIN_SEPARATOR: &str = "\n - ";

/// Plain error with flags, trace and identity.
#[derive(Debug, Clone)]
pub struct BasicError {
    message: String,
    flags: ErrFlag,
    trace: Trace,
    id: ErrorId,
}

impl BasicError {
    /// Message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Identity assigned at construction.
    #[inline]
    pub const fn id(&self) -> ErrorId {
        self.id
    }
}

impl fmt::Display for BasicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for BasicError {}

impl ErrorWithFlags for BasicError {
    fn flags(&self) -> ErrFlag {
        self.flags
    }
}

impl ErrorWithStack for BasicError {
    fn stack(&self) -> &Trace {
        &self.trace
    }
}

impl ErrorWithId for BasicError {
    fn error_id(&self) -> ErrorId {
        self.id
    }
}

/// Fluent constructor for [`BasicError`].
///
/// Flags accumulate across `with_flags` calls; `skip` drops additional
/// innermost frames (wrapper functions) from full stack captures.
#[derive(Debug, Clone, Default)]
pub struct ErrorBuilder {
    flags: ErrFlag,
    skip: usize,
    capture: CaptureOptions,
}

impl ErrorBuilder {
    /// Builder with default capture options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with explicit capture options.
    pub fn with_capture(capture: CaptureOptions) -> Self {
        Self {
            flags: ErrFlag::NONE,
            skip: 0,
            capture,
        }
    }

    /// Add flags, keeping the ones already set.
    #[must_use]
    pub fn with_flags(mut self, flags: ErrFlag) -> Self {
        self.flags |= flags;
        self
    }

    /// Skip `frames` more innermost frames when capturing.
    #[must_use]
    pub fn skip(mut self, frames: usize) -> Self {
        self.skip += frames;
        self
    }

    /// Flags accumulated so far.
    #[inline]
    pub const fn flags(&self) -> ErrFlag {
        self.flags
    }

    /// Error with the given message.
    #[track_caller]
    pub fn error(&self, message: impl Into<String>) -> BasicError {
        self.build(message.into(), Location::caller())
    }

    /// Error from preformatted arguments; see [`crate::format_error!`].
    #[track_caller]
    pub fn format(&self, args: fmt::Arguments<'_>) -> BasicError {
        self.build(fmt::format(args), Location::caller())
    }

    /// Error listing `errs` under `title`, one per line.
    ///
    /// Returns `None` when `errs` is empty.
    #[track_caller]
    pub fn join<I, S>(&self, title: &str, errs: I) -> Option<BasicError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut message = String::from(title);
        let mut any = false;
        for e in errs {
            any = true;
            message.push_str(JOIN_SEPARATOR);
            message.push_str(e.as_ref());
        }
        any.then(|| self.build(message, Location::caller()))
    }

    fn build(&self, message: String, caller: &'static Location<'static>) -> BasicError {
        BasicError {
            message,
            flags: self.flags,
            trace: stack::capture(self.skip, &self.capture, caller),
            id: ErrorId::next(),
        }
    }
}

/// Plain error with a captured trace.
#[track_caller]
pub fn new_error(message: impl Into<String>) -> BasicError {
    ErrorBuilder::new().error(message)
}

/// Error listing `errs` under `title`; `None` for an empty list.
#[track_caller]
pub fn join_errors<I, S>(title: &str, errs: I) -> Option<BasicError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ErrorBuilder::new().join(title, errs)
}
