//! Flag to HTTP status mapping and status texts.
//!
//! # Mapping Model
//!
//! The forward table is keyed by **single bits**. Registering a composite flag
//! splits it and maps every bit to the same status. The reverse table holds,
//! per status, the OR of every bit mapped to it.
//!
//! | Flag | Status |
//! |------|--------|
//! | `BAD_REQUEST` | 400 |
//! | `UNAUTHORIZED` | 401 |
//! | `NOT_FOUND` | 404 |
//! | `OPERATION_TIMEOUT` | 408 |
//! | `CONFLICT` | 409 |
//! | `UNHANDLED` | 500 |
//! | `NOT_IMPLEMENTED` | 501 |
//!
//! Because keys are single bits, [`StatusMapper::to_status`] of a composite
//! value returns 0 even when every constituent bit is mapped.
//!
//! # Replacement
//!
//! [`StatusMapper::set_mapping`] builds the new tables off to the side and
//! swaps them in under the write lock. A rejected mapping leaves the previous
//! one untouched, and readers never observe a half-built table.

use crate::flags::ErrFlag;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{trace, warn};

/// Status text for several client errors merged into one.
pub const STATUS_MULTIPLE_CLIENT_ERRORS: u16 = 468;
/// Status text for several errors merged into one where one is a server error.
pub const STATUS_MULTIPLE_SERVER_ERRORS: u16 = 568;

/// Status used when nothing classifies an error.
pub const STATUS_UNHANDLED: u16 = 500;

/// Lowest and highest acceptable status codes.
pub const STATUS_RANGE: std::ops::RangeInclusive<u16> = 100..=599;

/// Rejected [`StatusMapper::set_mapping`] calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("map is empty, no changes made")]
    Empty,

    /// A single bit was asked to map to two different statuses.
    #[error("unable to set mapping, flag with value {bits} has ambiguous HTTP status codes ({status}, {existing})", bits = .flag.raw())]
    Ambiguous { flag: ErrFlag, status: u16, existing: u16 },
}

/// Rejected custom status registrations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusTextError {
    #[error("status text must not be empty")]
    EmptyText,

    #[error("status code {0} is outside the 100-599 range")]
    OutOfRange(u16),

    #[error("status code {0} is already registered")]
    AlreadyRegistered(u16),
}

// ============================================================================
// Mapping
// ============================================================================

#[derive(Debug, Default)]
struct Mapping {
    forward: HashMap<ErrFlag, u16>,
    reverse: HashMap<u16, ErrFlag>,
}

impl Mapping {
    fn build<I>(entries: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (ErrFlag, u16)>,
    {
        let mut mapping = Mapping::default();
        let mut seen = false;

        for (flags, status) in entries {
            seen = true;
            for bit in flags.split() {
                if let Some(&existing) = mapping.forward.get(&bit) {
                    if existing != status {
                        return Err(MappingError::Ambiguous {
                            flag: bit,
                            status,
                            existing,
                        });
                    }
                }
                mapping.forward.insert(bit, status);
                *mapping.reverse.entry(status).or_default() |= bit;
            }
        }

        if !seen {
            return Err(MappingError::Empty);
        }
        Ok(mapping)
    }
}

/// Default flag to status table.
pub fn default_mapping() -> [(ErrFlag, u16); 7] {
    [
        (ErrFlag::BAD_REQUEST, 400),
        (ErrFlag::NOT_FOUND, 404),
        (ErrFlag::UNAUTHORIZED, 401),
        (ErrFlag::UNHANDLED, 500),
        (ErrFlag::NOT_IMPLEMENTED, 501),
        (ErrFlag::OPERATION_TIMEOUT, 408),
        (ErrFlag::CONFLICT, 409),
    ]
}

/// Bidirectional flag / status table.
pub struct StatusMapper {
    current: RwLock<Arc<Mapping>>,
}

impl StatusMapper {
    /// Mapper holding [`default_mapping`].
    pub fn new() -> Self {
        let mapping = match Mapping::build(default_mapping()) {
            Ok(mapping) => mapping,
            Err(_) => Mapping::default(),
        };
        Self {
            current: RwLock::new(Arc::new(mapping)),
        }
    }

    fn snapshot(&self) -> Arc<Mapping> {
        let guard: RwLockReadGuard<'_, Arc<Mapping>> = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }

    fn write_current(&self) -> RwLockWriteGuard<'_, Arc<Mapping>> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the whole mapping.
    ///
    /// Zero flags are ignored, composite flags are split into single bits.
    ///
    /// # Errors
    ///
    /// - [`MappingError::Empty`] when `entries` yields nothing
    /// - [`MappingError::Ambiguous`] when one bit would map to two statuses
    ///
    /// On error the previous mapping stays in place.
    pub fn set_mapping<I>(&self, entries: I) -> Result<(), MappingError>
    where
        I: IntoIterator<Item = (ErrFlag, u16)>,
    {
        let mapping = Mapping::build(entries).inspect_err(|e| {
            warn!(error = %e, "status mapping rejected");
        })?;
        let size = mapping.forward.len();
        *self.write_current() = Arc::new(mapping);
        trace!(entries = size, "status mapping replaced");
        Ok(())
    }

    /// Status mapped to exactly this flag value, 0 when none.
    #[inline]
    pub fn to_status(&self, flags: ErrFlag) -> u16 {
        self.snapshot().forward.get(&flags).copied().unwrap_or(0)
    }

    /// Every bit mapped to `status`, empty when unknown.
    #[inline]
    pub fn to_flags(&self, status: u16) -> ErrFlag {
        self.snapshot().reverse.get(&status).copied().unwrap_or_default()
    }

    /// True when `flags` carries every bit mapped to `status`.
    ///
    /// False for statuses with no mapping.
    pub fn is_status_in_flags(&self, flags: ErrFlag, status: u16) -> bool {
        self.snapshot()
            .reverse
            .get(&status)
            .is_some_and(|&mapped| flags.contains(mapped))
    }

    /// Current single-bit entries, ordered by bit.
    pub fn entries(&self) -> Vec<(ErrFlag, u16)> {
        let mut entries: Vec<_> = self
            .snapshot()
            .forward
            .iter()
            .map(|(&flag, &status)| (flag, status))
            .collect();
        entries.sort_unstable();
        entries
    }
}

impl Default for StatusMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusMapper")
            .field("entries", &self.entries())
            .finish()
    }
}

// ============================================================================
// Status Texts
// ============================================================================

/// Text of a status known without any registration: the two multi-error
/// statuses and every status with an IANA reason phrase. Empty when unknown.
pub fn canonical_text(code: u16) -> &'static str {
    match code {
        STATUS_MULTIPLE_CLIENT_ERRORS => "Multiple Client Errors",
        STATUS_MULTIPLE_SERVER_ERRORS => "Multiple Server Errors",
        _ => http::StatusCode::from_u16(code)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or(""),
    }
}

/// Status text table extensible with application-specific codes.
#[derive(Default)]
pub struct StatusTexts {
    custom: RwLock<HashMap<u16, Cow<'static, str>>>,
}

impl StatusTexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text for `code`; custom registrations first, then [`canonical_text`].
    pub fn text(&self, code: u16) -> Cow<'static, str> {
        let custom = match self.custom.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match custom.get(&code) {
            Some(text) => text.clone(),
            None => Cow::Borrowed(canonical_text(code)),
        }
    }

    /// Register a text for a status that has none yet.
    ///
    /// # Errors
    ///
    /// Empty text, a code outside 100-599, or a code that already has a text.
    pub fn register_custom_status(
        &self,
        code: u16,
        text: impl Into<Cow<'static, str>>,
    ) -> Result<(), StatusTextError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(StatusTextError::EmptyText);
        }
        if !STATUS_RANGE.contains(&code) {
            return Err(StatusTextError::OutOfRange(code));
        }

        let mut custom = match self.custom.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !canonical_text(code).is_empty() || custom.contains_key(&code) {
            return Err(StatusTextError::AlreadyRegistered(code));
        }
        trace!(code, text = %text, "custom status registered");
        custom.insert(code, text);
        Ok(())
    }
}

impl fmt::Debug for StatusTexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let custom = match self.custom.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f.debug_struct("StatusTexts")
            .field("custom", &custom.len())
            .finish()
    }
}
