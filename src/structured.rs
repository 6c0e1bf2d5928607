//! Structured error - the canonical, transport-ready error value.
//!
//! A [`StructuredError`] carries a status `code` with its `title`, a
//! human-readable `message`, the creation `timestamp`, aggregated `flags`, one
//! [`InnerError`] per source it was built from, and the `trace` of every site
//! that created or re-wrapped it.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "code": 404,
//!   "title": "Not Found",
//!   "message": "user 42 not found",
//!   "timestamp": "2024-05-01T10:00:00Z",
//!   "flags": 4,
//!   "inner": [{ "error": "user 42 not found", "flags": 4 }],
//!   "trace": ["src/handlers.rs:31", "src/repo.rs:88"]
//! }
//! ```
//!
//! `flags`, `inner` and `trace` are omitted when empty. The identity used by
//! the instance registry is never serialized; a deserialized error gets a
//! fresh one.
//!
//! # Construction
//!
//! Errors are normally built through [`crate::ClassificationRegistry`], which
//! classifies foreign sources (`wrap`, `wrap_with_code`, `merge`).
//! [`StructuredError::new`] builds one directly from a known status.

use crate::definitions::{downcast_through, DynError, ErrorId, ErrorWithFlags, ErrorWithId, ErrorWithStack};
use crate::flags::ErrFlag;
use crate::registry::FlagRegistry;
use crate::stack::{self, CaptureOptions, Trace, TraceMode};
use crate::status::canonical_text;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::panic::Location;

/// Title given to errors built from more than one source without a title.
pub const MULTIPLE_ERRORS_TITLE: &str = "multiple errors occurred";

/// Separator between source messages when no message is given.
pub const MESSAGE_SEPARATOR: &str = "; ";

#[inline]
fn is_zero(flags: &ErrFlag) -> bool {
    flags.is_empty()
}

/// Current time, RFC 3339 UTC with second precision.
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Inner Error
// ============================================================================

/// One source of a [`StructuredError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerError {
    /// Message of the source.
    pub error: String,

    /// Newest frame of the source's trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,

    /// JSON of the source when it was itself structured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub flags: ErrFlag,

    #[serde(default, skip_serializing_if = "Trace::is_empty")]
    pub trace: Trace,
}

impl InnerError {
    fn from_source(registry: &FlagRegistry, source: &DynError, keep_frames: bool) -> Self {
        let trace = if keep_frames {
            registry.stack_of(source).cloned().unwrap_or_default()
        } else {
            Trace::new()
        };
        let details = downcast_through::<StructuredError>(source)
            .and_then(|structured| structured.to_json().ok());

        Self {
            error: source.to_string(),
            caller: trace.first().map(ToString::to_string),
            details,
            flags: registry.get_flags(source),
            trace,
        }
    }

    fn sanitize(&mut self) {
        self.caller = None;
        self.trace.clear();
        self.details = self
            .details
            .take()
            .and_then(|json| StructuredError::from_json(&json).ok())
            .and_then(|nested| nested.sanitized().to_json().ok());
    }
}

// ============================================================================
// Structured Error
// ============================================================================

/// Canonical error value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    code: u16,
    title: String,
    message: String,
    timestamp: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    flags: ErrFlag,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    inner: Vec<InnerError>,

    #[serde(default, skip_serializing_if = "Trace::is_empty")]
    trace: Trace,

    #[serde(skip, default = "ErrorId::next")]
    id: ErrorId,
}

impl StructuredError {
    /// Error with a known status and no sources.
    ///
    /// An empty `title` is filled with the status text. The trace is captured
    /// with default options; [`crate::ClassificationRegistry::structured`]
    /// uses the registry's.
    #[track_caller]
    pub fn new(code: u16, title: impl Into<String>, message: impl Into<String>) -> Self {
        let caller = Location::caller();
        let mut title = title.into();
        if title.is_empty() {
            title = canonical_text(code).to_string();
        }
        Self {
            code,
            title,
            message: message.into(),
            timestamp: timestamp_now(),
            flags: ErrFlag::NONE,
            inner: Vec::new(),
            trace: stack::capture(0, &CaptureOptions::default(), caller),
            id: ErrorId::next(),
        }
    }

    /// Build from sources.
    ///
    /// `None` sources are skipped. Each remaining source becomes an
    /// [`InnerError`] and its trace is appended after `trace`. Flags are the OR
    /// of every source's flags. A blank title with several sources becomes
    /// [`MULTIPLE_ERRORS_TITLE`]; a blank message becomes the source messages
    /// joined with [`MESSAGE_SEPARATOR`].
    ///
    /// With [`TraceMode::Off`] no source frames are carried over, neither into
    /// the outer trace nor into the inner entries.
    pub(crate) fn compose<'a, I>(
        registry: &FlagRegistry,
        capture: &CaptureOptions,
        trace: Trace,
        code: u16,
        title: String,
        message: String,
        sources: I,
    ) -> Self
    where
        I: IntoIterator<Item = Option<&'a DynError>>,
    {
        let inner: Vec<InnerError> = sources
            .into_iter()
            .flatten()
            .map(|source| InnerError::from_source(registry, source, capture.mode != TraceMode::Off))
            .collect();

        let mut trace = trace;
        for source in &inner {
            trace.extend_from(&source.trace);
        }

        let title = if title.is_empty() && inner.len() > 1 {
            MULTIPLE_ERRORS_TITLE.to_string()
        } else {
            title
        };

        let message = if message.is_empty() {
            inner
                .iter()
                .map(|i| i.error.as_str())
                .collect::<Vec<_>>()
                .join(MESSAGE_SEPARATOR)
        } else {
            message
        };

        Self {
            code,
            title,
            message,
            timestamp: timestamp_now(),
            flags: inner.iter().map(|i| i.flags).collect(),
            inner,
            trace,
            id: ErrorId::next(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub const fn code(&self) -> u16 {
        self.code
    }

    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Creation time, RFC 3339.
    #[inline]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[inline]
    pub fn inner(&self) -> &[InnerError] {
        &self.inner
    }

    #[inline]
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    #[inline]
    pub const fn id(&self) -> ErrorId {
        self.id
    }

    /// Text of [`StructuredError::code`], empty for unknown or zero codes.
    pub fn status_text(&self) -> &'static str {
        if self.code == 0 {
            return "";
        }
        canonical_text(self.code)
    }

    /// True for 4xx codes.
    #[inline]
    pub const fn is_client_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// True for 5xx codes.
    #[inline]
    pub const fn is_server_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Add flags to the error itself.
    #[must_use]
    pub fn with_flags(mut self, flags: ErrFlag) -> Self {
        self.flags |= flags;
        self
    }

    /// Prefix the message with `context`, joined by `", "`.
    pub(crate) fn prefix_message(&mut self, context: &str) {
        if context.is_empty() {
            return;
        }
        self.message = if self.message.is_empty() {
            context.to_string()
        } else {
            format!("{context}, {}", self.message)
        };
    }

    /// Put freshly captured frames in front of the existing trace.
    pub(crate) fn prepend_trace(&mut self, newer: Trace) {
        self.trace.prepend(newer);
    }

    /// Overwrite code and title, nothing else.
    pub(crate) fn set_status(&mut self, code: u16, title: String) {
        self.code = code;
        self.title = title;
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// JSON payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON payload. The result has a fresh identity.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Copy without any trace data: outer trace, inner traces and callers
    /// are cleared, and nested details are sanitized the same way.
    pub fn sanitized(&self) -> Self {
        let mut copy = self.clone();
        copy.trace.clear();
        copy.inner.iter_mut().for_each(InnerError::sanitize);
        copy
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            return Ok(());
        }
        write!(f, "{} ", self.code)?;
        if !self.title.is_empty() {
            write!(f, "{}, ", self.title)?;
        }
        f.write_str(&self.message)?;

        if !self.inner.is_empty() {
            f.write_str(" | Details: ")?;
            for (i, inner) in self.inner.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ; ")?;
                }
                f.write_str(&inner.error)?;
            }
        }
        Ok(())
    }
}

impl Error for StructuredError {}

impl ErrorWithFlags for StructuredError {
    fn flags(&self) -> ErrFlag {
        self.flags
    }
}

impl ErrorWithStack for StructuredError {
    fn stack(&self) -> &Trace {
        &self.trace
    }
}

impl ErrorWithId for StructuredError {
    fn error_id(&self) -> ErrorId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ErrorBuilder;
    use crate::stack::Frame;

    fn quiet() -> CaptureOptions {
        CaptureOptions {
            mode: TraceMode::Off,
            ..CaptureOptions::default()
        }
    }

    #[test]
    fn display_format() {
        let mut err = StructuredError::new(404, "", "user missing");
        assert_eq!(err.to_string(), "404 Not Found, user missing");

        err.set_status(404, String::new());
        assert_eq!(err.to_string(), "404 user missing");

        let registry = FlagRegistry::new();
        let a = ErrorBuilder::with_capture(quiet()).error("a");
        let b = ErrorBuilder::with_capture(quiet()).error("b");
        let merged = StructuredError::compose(
            &registry,
            &CaptureOptions::default(),
            Trace::new(),
            500,
            String::new(),
            String::new(),
            [Some(&a as &DynError), None, Some(&b as &DynError)],
        );
        assert_eq!(
            merged.to_string(),
            "500 multiple errors occurred, a; b | Details: a ; b"
        );
    }

    #[test]
    fn compose_aggregates_sources() {
        let registry = FlagRegistry::new();
        let a = ErrorBuilder::new().with_flags(ErrFlag::NOT_FOUND).error("a");
        let b = ErrorBuilder::new().with_flags(ErrFlag::CONFLICT).error("b");
        let own = Trace::from(vec![Frame::new("src/app.rs", 1)]);

        let err = StructuredError::compose(
            &registry,
            &CaptureOptions::default(),
            own,
            409,
            "Conflict".to_string(),
            "save failed".to_string(),
            [Some(&a as &DynError), Some(&b as &DynError)],
        );

        assert_eq!(err.flags(), ErrFlag::NOT_FOUND | ErrFlag::CONFLICT);
        assert_eq!(err.title(), "Conflict");
        assert_eq!(err.message(), "save failed");
        assert_eq!(err.inner().len(), 2);
        assert_eq!(err.inner()[0].error, "a");
        assert_eq!(err.inner()[0].caller, a.stack().first().map(ToString::to_string));
        assert_eq!(err.trace().first(), Some(&Frame::new("src/app.rs", 1)));
        assert_eq!(err.trace().len(), 1 + a.stack().len() + b.stack().len());
    }

    #[test]
    fn single_source_keeps_blank_title() {
        let registry = FlagRegistry::new();
        let a = ErrorBuilder::with_capture(quiet()).error("only");
        let err = StructuredError::compose(
            &registry,
            &CaptureOptions::default(),
            Trace::new(),
            500,
            String::new(),
            String::new(),
            [Some(&a as &DynError)],
        );
        assert_eq!(err.title(), "");
        assert_eq!(err.message(), "only");
    }

    #[test]
    fn trace_off_carries_no_source_frames() {
        let registry = FlagRegistry::new();
        let a = ErrorBuilder::new().with_flags(ErrFlag::NOT_FOUND).error("a");
        assert!(!a.stack().is_empty());

        let err = StructuredError::compose(
            &registry,
            &quiet(),
            Trace::new(),
            404,
            "Not Found".to_string(),
            String::new(),
            [Some(&a as &DynError)],
        );
        assert!(err.trace().is_empty());
        assert!(err.inner()[0].trace.is_empty());
        assert!(err.inner()[0].caller.is_none());
        assert_eq!(err.inner()[0].flags, ErrFlag::NOT_FOUND);
        assert_eq!(err.message(), "a");
    }

    #[test]
    fn structured_sources_carry_details() {
        let registry = FlagRegistry::new();
        let nested = StructuredError::new(404, "", "missing");
        let err = StructuredError::compose(
            &registry,
            &CaptureOptions::default(),
            Trace::new(),
            500,
            String::new(),
            String::new(),
            [Some(&nested as &DynError)],
        );
        let details = err.inner()[0].details.as_deref().unwrap();
        let parsed = StructuredError::from_json(details).unwrap();
        assert_eq!(parsed.code(), 404);
        assert_ne!(parsed.id(), nested.id());
    }

    #[test]
    fn prefix_message_joins_with_comma() {
        let mut err = StructuredError::new(500, "", "db down");
        err.prefix_message("loading user");
        assert_eq!(err.message(), "loading user, db down");
        err.prefix_message("");
        assert_eq!(err.message(), "loading user, db down");

        let mut blank = StructuredError::new(500, "", "");
        blank.prefix_message("context");
        assert_eq!(blank.message(), "context");
    }

    #[test]
    fn json_omits_empty_fields() {
        let mut err = StructuredError::new(400, "", "bad input");
        err.trace.clear();
        let json: serde_json::Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(json["code"], 400);
        assert_eq!(json["title"], "Bad Request");
        assert!(json.get("flags").is_none());
        assert!(json.get("inner").is_none());
        assert!(json.get("trace").is_none());
        assert!(json.get("id").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn sanitized_drops_trace_data() {
        let registry = FlagRegistry::new();
        let nested = StructuredError::new(404, "", "missing");
        let err = StructuredError::compose(
            &registry,
            &CaptureOptions::default(),
            Trace::from(vec![Frame::new("src/app.rs", 3)]),
            500,
            String::new(),
            String::new(),
            [Some(&nested as &DynError)],
        );

        let clean = err.sanitized();
        assert!(clean.trace().is_empty());
        assert!(clean.inner()[0].trace.is_empty());
        assert!(clean.inner()[0].caller.is_none());
        let nested_clean = StructuredError::from_json(clean.inner()[0].details.as_deref().unwrap()).unwrap();
        assert!(nested_clean.trace().is_empty());
        assert!(!err.trace().is_empty());
    }

    #[test]
    fn status_classes() {
        assert!(StructuredError::new(404, "", "").is_client_error());
        assert!(StructuredError::new(503, "", "").is_server_error());
        assert_eq!(StructuredError::new(0, "", "x").to_string(), "");
        assert_eq!(StructuredError::new(0, "", "x").status_text(), "");
    }
}
