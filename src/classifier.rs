//! Classification context - the entry point applications hold on to.
//!
//! A [`ClassificationRegistry`] owns every piece of mutable classification
//! state: the [`FlagRegistry`], the [`StatusMapper`], the flag name table, the
//! status text table and the ordered message identifiers. Construct one at
//! startup and share it by reference or `Arc`; there is no global instance.
//!
//! # Classification Order
//!
//! For an error that is not already a [`StructuredError`]:
//!
//! 1. `to_status(get_flags(err))`: registered or self-reported flags
//! 2. Message identifiers, in registration order, on the lowercased message
//! 3. The configured default status (500)
//!
//! # Example
//!
//! ```rust
//! use flagged_errors::{ClassificationRegistry, ErrFlag};
//!
//! #[derive(Debug)]
//! struct MissingUser;
//! impl std::fmt::Display for MissingUser {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("user lookup failed")
//!     }
//! }
//! impl std::error::Error for MissingUser {}
//!
//! let registry = ClassificationRegistry::new();
//! registry.flags().set_flags_by_type::<MissingUser>(ErrFlag::NOT_FOUND);
//!
//! let err = registry.wrap(MissingUser);
//! assert_eq!(err.code(), 404);
//! assert_eq!(err.title(), "Not Found");
//! ```

use crate::builder::{BasicError, ErrorBuilder};
use crate::config::{ClassifierConfig, ConfigError};
use crate::definitions::{downcast_through, BoxError, DynError};
use crate::flags::{ErrFlag, FlagNames};
use crate::registry::FlagRegistry;
use crate::stack::{self, CaptureOptions, Trace};
use crate::status::{StatusMapper, StatusTexts};
use crate::structured::StructuredError;
use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Message predicate; receives the lowercased message.
pub type Identifier = Arc<dyn Fn(&str) -> bool + Send + Sync>;

fn contains_any(message: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| message.contains(needle))
}

/// Built-in message identifiers, in evaluation order.
pub fn default_identifiers() -> Vec<(u16, Identifier)> {
    let table: [(u16, &'static [&'static str]); 6] = [
        (401, &["unauthorized", "unauthenticated"]),
        (404, &["not found", "no such", "does not exist"]),
        (409, &["conflict", "already exists", "duplicate"]),
        (400, &["invalid", "bad request", "malformed"]),
        (408, &["timed out", "timeout"]),
        (501, &["not implemented"]),
    ];

    table
        .into_iter()
        .map(|(status, needles)| {
            let identifier: Identifier = Arc::new(move |message: &str| contains_any(message, needles));
            (status, identifier)
        })
        .collect()
}

/// Status of several merged errors.
///
/// The first status seeds the result. Two different client errors collapse to
/// `client_conflict_status`; any server error wins over what came before.
/// Nothing at all yields `default_status`.
pub fn merge_status<I>(statuses: I, client_conflict_status: u16, default_status: u16) -> u16
where
    I: IntoIterator<Item = u16>,
{
    let is_client = |code: u16| (400..500).contains(&code);
    let mut merged = 0u16;

    for code in statuses {
        if merged == 0 {
            merged = code;
        } else if merged != code && is_client(merged) && is_client(code) {
            merged = client_conflict_status;
        } else if code >= 500 {
            merged = code;
        }
    }

    if merged == 0 { default_status } else { merged }
}

/// Recover a structured error from a boxed one, looking through one `Box` or
/// `Arc`. A shared error that is still referenced elsewhere is cloned, keeping
/// its identity.
fn into_structured(err: BoxError) -> Result<StructuredError, BoxError> {
    let err = match err.downcast::<StructuredError>() {
        Ok(structured) => return Ok(*structured),
        Err(other) => other,
    };
    let err = match err.downcast::<Box<StructuredError>>() {
        Ok(structured) => return Ok(**structured),
        Err(other) => other,
    };
    err.downcast::<Arc<StructuredError>>()
        .map(|shared| Arc::unwrap_or_clone(*shared))
}

/// Owner of all classification state.
pub struct ClassificationRegistry {
    config: ClassifierConfig,
    capture: CaptureOptions,
    flags: FlagRegistry,
    mapper: StatusMapper,
    names: FlagNames,
    texts: StatusTexts,
    identifiers: RwLock<Vec<(u16, Identifier)>>,
}

impl ClassificationRegistry {
    /// Registry with default configuration.
    pub fn new() -> Self {
        Self::build(ClassifierConfig::default())
    }

    /// Registry from a validated configuration.
    ///
    /// # Errors
    ///
    /// Anything [`ClassifierConfig::validate`] rejects, or a mapping that
    /// [`StatusMapper::set_mapping`] rejects.
    pub fn with_config(config: ClassifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mapping = config.mapping_entries();
        let registry = Self::build(config);

        if let Some(entries) = mapping {
            registry.mapper.set_mapping(entries)?;
        }
        for (&bits, name) in &registry.config.flag_names {
            registry.names.set_name(ErrFlag::from_bits(bits), name.clone());
        }
        Ok(registry)
    }

    fn build(config: ClassifierConfig) -> Self {
        Self {
            capture: config.capture_options(),
            config,
            flags: FlagRegistry::new(),
            mapper: StatusMapper::new(),
            names: FlagNames::new(),
            texts: StatusTexts::new(),
            identifiers: RwLock::new(default_identifiers()),
        }
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    #[inline]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    #[inline]
    pub fn flags(&self) -> &FlagRegistry {
        &self.flags
    }

    #[inline]
    pub fn mapper(&self) -> &StatusMapper {
        &self.mapper
    }

    #[inline]
    pub fn names(&self) -> &FlagNames {
        &self.names
    }

    #[inline]
    pub fn texts(&self) -> &StatusTexts {
        &self.texts
    }

    /// Capture options used for every construction site.
    #[inline]
    pub fn capture_options(&self) -> &CaptureOptions {
        &self.capture
    }

    fn read_identifiers(&self) -> RwLockReadGuard<'_, Vec<(u16, Identifier)>> {
        match self.identifiers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_identifiers(&self) -> RwLockWriteGuard<'_, Vec<(u16, Identifier)>> {
        match self.identifiers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append a message identifier; it runs after every existing one.
    pub fn add_identifier<F>(&self, status: u16, identifier: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.write_identifiers().push((status, Arc::new(identifier)));
    }

    /// Drop every message identifier, built-ins included.
    pub fn clear_identifiers(&self) {
        self.write_identifiers().clear();
    }

    // ------------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------------

    /// Status of the first identifier matching `message`, if any.
    ///
    /// Identifiers run without the table lock held, so they may register
    /// further identifiers.
    pub fn classify_message(&self, message: &str) -> Option<u16> {
        let lowered = message.to_lowercase();
        let identifiers = self.read_identifiers().clone();
        identifiers
            .iter()
            .find(|(_, identifier)| identifier(&lowered))
            .map(|(status, _)| *status)
    }

    /// Status for `err`.
    ///
    /// Structured errors keep their own code; everything else goes through
    /// flags, message identifiers and finally the default status.
    pub fn classify(&self, err: &DynError) -> u16 {
        if let Some(structured) = downcast_through::<StructuredError>(err) {
            return structured.code();
        }

        let flags = self.flags.get_flags(err);
        let status = self.mapper.to_status(flags);
        if status != 0 {
            return status;
        }

        if let Some(status) = self.classify_message(&err.to_string()) {
            return status;
        }

        debug!(
            error = %err,
            flags = flags.raw(),
            status = self.config.default_status,
            "error not classified, using default status"
        );
        self.config.default_status
    }

    /// Status mapped to exactly `flags`, 0 when none.
    #[inline]
    pub fn to_status(&self, flags: ErrFlag) -> u16 {
        self.mapper.to_status(flags)
    }

    /// Text for `code`, honoring custom registrations.
    pub fn status_text(&self, code: u16) -> Cow<'static, str> {
        self.texts.text(code)
    }

    /// Names of every set bit, joined with `|`.
    pub fn describe_flags(&self, flags: ErrFlag) -> String {
        self.names.describe(flags)
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    fn capture_at(&self, caller: &'static Location<'static>) -> Trace {
        stack::capture(0, &self.capture, caller)
    }

    /// [`ErrorBuilder`] capturing with this registry's options.
    pub fn builder(&self) -> ErrorBuilder {
        ErrorBuilder::with_capture(self.capture.clone())
    }

    /// Plain error captured with this registry's options.
    #[track_caller]
    pub fn new_error(&self, message: impl Into<String>) -> BasicError {
        self.builder().error(message)
    }

    /// Build a structured error from explicit parts and optional sources.
    ///
    /// A blank title with several sources becomes `"multiple errors
    /// occurred"`; a blank message becomes the source messages joined with
    /// `"; "`.
    #[track_caller]
    pub fn structured<'a, I>(&self, code: u16, title: &str, message: &str, sources: I) -> StructuredError
    where
        I: IntoIterator<Item = Option<&'a DynError>>,
    {
        let trace = self.capture_at(Location::caller());
        StructuredError::compose(
            &self.flags,
            &self.capture,
            trace,
            code,
            title.to_string(),
            message.to_string(),
            sources,
        )
    }

    /// Classify and wrap `err`.
    #[track_caller]
    pub fn wrap<E: Into<BoxError>>(&self, err: E) -> StructuredError {
        self.wrap_at(err.into(), "", Location::caller())
    }

    /// Classify and wrap `err`, prefixing `message`.
    ///
    /// An error that is already structured, directly or behind one `Box` or
    /// `Arc`, is updated in place: the message
    /// becomes `"{message}, {previous}"` and the current frames are put in
    /// front of its trace.
    #[track_caller]
    pub fn wrap_with_message<E: Into<BoxError>>(&self, err: E, message: &str) -> StructuredError {
        self.wrap_at(err.into(), message, Location::caller())
    }

    /// [`ClassificationRegistry::wrap`] for an optional error.
    #[track_caller]
    pub fn wrap_option<E: Into<BoxError>>(&self, err: Option<E>) -> Option<StructuredError> {
        let caller = Location::caller();
        err.map(|e| self.wrap_at(e.into(), "", caller))
    }

    /// Wrap `err` with an explicit status.
    ///
    /// An error that is already structured only has its code and title
    /// replaced.
    #[track_caller]
    pub fn wrap_with_code<E: Into<BoxError>>(&self, err: E, code: u16, message: &str) -> StructuredError {
        let caller = Location::caller();
        let title = self.status_text(code).into_owned();

        match into_structured(err.into()) {
            Ok(mut structured) => {
                structured.set_status(code, title);
                structured
            }
            Err(foreign) => {
                let source: &DynError = &*foreign;
                StructuredError::compose(
                    &self.flags,
                    &self.capture,
                    self.capture_at(caller),
                    code,
                    title,
                    message.to_string(),
                    [Some(source)],
                )
            }
        }
    }

    fn wrap_at(&self, err: BoxError, message: &str, caller: &'static Location<'static>) -> StructuredError {
        match into_structured(err) {
            Ok(mut structured) => {
                structured.prefix_message(message);
                structured.prepend_trace(self.capture_at(caller));
                trace!(code = structured.code(), "structured error re-wrapped");
                structured
            }
            Err(foreign) => {
                let source: &DynError = &*foreign;
                let code = self.classify(source);
                StructuredError::compose(
                    &self.flags,
                    &self.capture,
                    self.capture_at(caller),
                    code,
                    self.status_text(code).into_owned(),
                    message.to_string(),
                    [Some(source)],
                )
            }
        }
    }

    /// Merge several optional errors into one.
    ///
    /// - `None` entries are dropped
    /// - nothing left: `None`
    /// - one left: that same error, untouched
    /// - otherwise: a structured error listing every source in order, with
    ///   the status from [`merge_status`]
    #[track_caller]
    pub fn merge<I>(&self, errors: I) -> Option<BoxError>
    where
        I: IntoIterator<Item = Option<BoxError>>,
    {
        let caller = Location::caller();
        let mut errors: Vec<BoxError> = errors.into_iter().flatten().collect();

        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => {
                let code = merge_status(
                    errors.iter().map(|e| self.classify(&**e)),
                    self.config.client_conflict_status,
                    self.config.default_status,
                );
                let merged = StructuredError::compose(
                    &self.flags,
                    &self.capture,
                    self.capture_at(caller),
                    code,
                    String::new(),
                    String::new(),
                    errors.iter().map(|e| Some(&**e as &DynError)),
                );
                Some(Box::new(merged))
            }
        }
    }

    /// [`ClassificationRegistry::merge`] for errors that are already structured.
    #[track_caller]
    pub fn merge_structured<I>(&self, errors: I) -> Option<StructuredError>
    where
        I: IntoIterator<Item = StructuredError>,
    {
        let caller = Location::caller();
        let mut errors: Vec<StructuredError> = errors.into_iter().collect();

        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => {
                let code = merge_status(
                    errors.iter().map(StructuredError::code),
                    self.config.client_conflict_status,
                    self.config.default_status,
                );
                Some(StructuredError::compose(
                    &self.flags,
                    &self.capture,
                    self.capture_at(caller),
                    code,
                    String::new(),
                    String::new(),
                    errors.iter().map(|e| Some(e as &DynError)),
                ))
            }
        }
    }

    /// Outgoing JSON for `err`; trace data is kept only when configured.
    pub fn payload(&self, err: &StructuredError) -> Result<String, serde_json::Error> {
        if self.config.expose_trace {
            err.to_json()
        } else {
            err.sanitized().to_json()
        }
    }
}

impl Default for ClassificationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassificationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationRegistry")
            .field("config", &self.config)
            .field("flags", &self.flags)
            .field("mapper", &self.mapper)
            .field("identifiers", &self.read_identifiers().len())
            .finish()
    }
}

// ============================================================================
// Result Extension
// ============================================================================

/// Wrap the error side of a `Result` into a [`StructuredError`].
pub trait ResultExt<T> {
    /// Classify the error and prefix `message`.
    fn wrap_err(self, registry: &ClassificationRegistry, message: &str) -> Result<T, StructuredError>;

    /// Wrap the error with an explicit status.
    fn wrap_err_with_code(
        self,
        registry: &ClassificationRegistry,
        code: u16,
        message: &str,
    ) -> Result<T, StructuredError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    #[track_caller]
    fn wrap_err(self, registry: &ClassificationRegistry, message: &str) -> Result<T, StructuredError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(registry.wrap_with_message(err, message)),
        }
    }

    #[track_caller]
    fn wrap_err_with_code(
        self,
        registry: &ClassificationRegistry,
        code: u16,
        message: &str,
    ) -> Result<T, StructuredError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(registry.wrap_with_code(err, code, message)),
        }
    }
}
