//! # Flagged Errors
//!
//! Error classification by semantic flags, and structured errors that carry
//! their own HTTP status, sources and construction trace.
//!
//! ## Design Philosophy
//!
//! 1. **Errors are classified by what they mean**, not by what they say.
//!    Categories ([`ErrFlag`] bits) are attached to error types, to individual
//!    error values, or reported by the error itself.
//! 2. **Transport codes are derived**, never hard-coded at the failure site.
//!    A [`StatusMapper`] turns categories into HTTP statuses.
//! 3. **Every hop is recorded**. Wrapping an error again adds the current
//!    location in front of its trace instead of replacing it.
//! 4. **No global state**. All registries live in a [`ClassificationRegistry`]
//!    owned by the application.
//!
//! ## Quick Start
//!
//! ```rust
//! use flagged_errors::{ClassificationRegistry, ErrFlag, ErrorBuilder};
//!
//! let registry = ClassificationRegistry::new();
//!
//! // Categories reported by the error itself
//! let missing = ErrorBuilder::new()
//!     .with_flags(ErrFlag::NOT_FOUND)
//!     .error("order 17 not found");
//!
//! let err = registry.wrap_with_message(missing, "loading order");
//! assert_eq!(err.code(), 404);
//! assert_eq!(err.to_string(), "404 Not Found, loading order | Details: order 17 not found");
//!
//! // Wrapping again keeps the code and grows the trace
//! let trace_len = err.trace().len();
//! let err = registry.wrap_with_message(err, "handling GET /orders/17");
//! assert_eq!(err.message(), "handling GET /orders/17, loading order");
//! assert!(err.trace().len() > trace_len);
//! ```
//!
//! ## Merging
//!
//! ```rust
//! use flagged_errors::{BoxError, ClassificationRegistry, StructuredError};
//!
//! let registry = ClassificationRegistry::new();
//! let a: BoxError = Box::new(registry.wrap_with_code("bad email", 400, ""));
//! let b: BoxError = Box::new(registry.wrap_with_code("unknown team", 404, ""));
//!
//! let merged = registry.merge([Some(a), None, Some(b)]).unwrap();
//! let merged = merged.downcast_ref::<StructuredError>().unwrap();
//! assert_eq!(merged.code(), 500);
//! assert_eq!(merged.title(), "multiple errors occurred");
//! assert_eq!(merged.inner().len(), 2);
//! ```
//!
//! ## Features
//!
//! - `backtrace` (default): full stack walks for [`TraceMode::Full`]. Without
//!   it every capture records only the calling location.

#![warn(clippy::all)]

pub mod builder;
pub mod classifier;
pub mod config;
pub mod convenience;
pub mod definitions;
pub mod flags;
pub mod logging;
pub mod registry;
pub mod stack;
pub mod status;
pub mod structured;

pub use builder::*;
pub use classifier::*;
pub use config::*;
pub use definitions::*;
pub use flags::*;
pub use logging::*;
pub use registry::*;
pub use stack::{capture_here, CaptureOptions, Frame, Trace, TraceMode};
pub use status::*;
pub use structured::*;

/// Result whose error defaults to [`StructuredError`].
pub type Result<T, E = StructuredError> = std::result::Result<T, E>;
