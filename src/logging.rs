//! Log views and `tracing` emission for structured errors.
//!
//! [`ErrorLog`] borrows from the error it describes and cannot outlive it.
//! It is meant to be consumed right away, either field by field by a
//! structured logger or rendered once with [`ErrorLog::write_to`].
//!
//! Rendered fields are capped at 1024 bytes each, cut on a UTF-8 boundary and
//! marked with `...[TRUNCATED]`, so a runaway message cannot flood a log
//! line. Accessors return the raw, untruncated values.

use crate::definitions::ErrorWithFlags;
use crate::flags::FlagNames;
use crate::structured::StructuredError;
use std::borrow::Cow;
use std::fmt;
use tracing::{error, info, warn};

/// Maximum length for any individual field in formatted output.
const MAX_FIELD_OUTPUT_LEN: usize = 1024;

/// Appended to truncated fields.
const TRUNCATION_INDICATOR: &str = "...[TRUNCATED]";

/// Borrowed structured view of a [`StructuredError`].
///
/// ```rust
/// use flagged_errors::{ErrorLog, StructuredError};
///
/// let err = StructuredError::new(404, "", "user 42 not found");
/// let mut line = String::new();
/// ErrorLog::new(&err).write_to(&mut line).unwrap();
/// assert!(line.starts_with("[404 Not Found] message='user 42 not found'"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ErrorLog<'a> {
    error: &'a StructuredError,
    names: Option<&'a FlagNames>,
}

impl<'a> ErrorLog<'a> {
    /// View rendering flags as raw bits.
    #[inline]
    pub const fn new(error: &'a StructuredError) -> Self {
        Self { error, names: None }
    }

    /// View rendering flags by name.
    #[inline]
    pub const fn with_names(error: &'a StructuredError, names: &'a FlagNames) -> Self {
        Self {
            error,
            names: Some(names),
        }
    }

    #[inline]
    pub const fn code(&self) -> u16 {
        self.error.code()
    }

    #[inline]
    pub fn title(&self) -> &'a str {
        self.error.title()
    }

    #[inline]
    pub fn message(&self) -> &'a str {
        self.error.message()
    }

    #[inline]
    pub fn timestamp(&self) -> &'a str {
        self.error.timestamp()
    }

    /// Newest frame of the trace, if any.
    pub fn caller(&self) -> Option<String> {
        self.error.trace().first().map(ToString::to_string)
    }

    /// Flags as names when a table is attached, otherwise as raw bits.
    pub fn flags(&self) -> Cow<'a, str> {
        let flags = self.error.flags();
        match self.names {
            _ if flags.is_empty() => Cow::Borrowed(""),
            Some(names) => Cow::Owned(names.describe(flags)),
            None => Cow::Owned(format!("{:#b}", flags)),
        }
    }

    /// Messages of every inner error, in order.
    pub fn inner_messages(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.error.inner().iter().map(|inner| inner.error.as_str())
    }

    /// Write one log line, each field truncated.
    pub fn write_to(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "[{}", self.code())?;
        if !self.title().is_empty() {
            write!(f, " {}", truncate_with_indicator(self.title()))?;
        }
        write!(f, "] message='{}'", truncate_with_indicator(self.message()))?;

        let flags = self.flags();
        if !flags.is_empty() {
            write!(f, " flags='{}'", truncate_with_indicator(&flags))?;
        }

        if let Some(caller) = self.caller() {
            write!(f, " caller='{}'", truncate_with_indicator(&caller))?;
        }

        for (i, message) in self.inner_messages().enumerate() {
            write!(f, " inner[{i}]='{}'", truncate_with_indicator(message))?;
        }

        Ok(())
    }
}

impl fmt::Display for ErrorLog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_to(f)
    }
}

/// Emit `err` as a `tracing` event.
///
/// 5xx codes log at `error`, 4xx at `warn`, anything else at `info`.
pub fn log_error(err: &StructuredError) {
    emit(ErrorLog::new(err));
}

/// [`log_error`] with flags rendered by name.
pub fn log_error_with_names(err: &StructuredError, names: &FlagNames) {
    emit(ErrorLog::with_names(err, names));
}

fn emit(log: ErrorLog<'_>) {
    let code = log.code();
    let title = truncate_with_indicator(log.title());
    let message = truncate_with_indicator(log.message());
    let flags = log.flags();
    let inner = log.inner_messages().count();
    let caller = log.caller().unwrap_or_default();

    match code {
        500..=599 => error!(code, %title, %message, %flags, inner, %caller, "request failed"),
        400..=499 => warn!(code, %title, %message, %flags, inner, %caller, "request rejected"),
        _ => info!(code, %title, %message, %flags, inner, %caller, "error reported"),
    }
}

/// Cap `s` at [`MAX_FIELD_OUTPUT_LEN`] bytes on a character boundary.
fn truncate_with_indicator(s: &str) -> Cow<'_, str> {
    if s.len() <= MAX_FIELD_OUTPUT_LEN {
        return Cow::Borrowed(s);
    }

    let max_content_len = MAX_FIELD_OUTPUT_LEN.saturating_sub(TRUNCATION_INDICATOR.len());
    let mut idx = max_content_len;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }

    if idx == 0 {
        return Cow::Borrowed(TRUNCATION_INDICATOR);
    }

    let mut result = String::with_capacity(idx + TRUNCATION_INDICATOR.len());
    result.push_str(&s[..idx]);
    result.push_str(TRUNCATION_INDICATOR);
    Cow::Owned(result)
}
