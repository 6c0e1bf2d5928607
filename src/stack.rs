//! Stack capture for error construction sites.
//!
//! Every structured error records where it was created (and re-wrapped) as an
//! ordered list of [`Frame`]s, newest first. Frames carry a normalized source
//! path and a line number; nothing else is retained so traces stay cheap to
//! clone and safe to serialize.
//!
//! # Capture Modes
//!
//! - [`TraceMode::Full`]: walk the active call stack (requires the `backtrace`
//!   feature and debug info). Frames from this crate's own construction
//!   machinery, the `backtrace` crate and the Rust standard library are
//!   excluded.
//! - [`TraceMode::Caller`]: record only the `#[track_caller]` location of the
//!   public entry point.
//! - [`TraceMode::Off`]: record nothing.
//!
//! A full walk that yields no usable frame falls back to the caller location,
//! so `Full` and `Caller` always produce at least one frame.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::sync::OnceLock;

/// Default cap on frames recorded per capture.
pub const DEFAULT_MAX_FRAMES: usize = 64;

/// Registry checkout marker; everything up to the index directory is dropped.
const REGISTRY_MARKER: &str = "/.cargo/registry/src/";

// ============================================================================
// Frame
// ============================================================================

/// One normalized stack frame: `file:line`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Frame {
    file: String,
    line: u32,
}

impl Frame {
    /// Build a frame from an already normalized path.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Frame for a `#[track_caller]` location.
    pub fn from_location(location: &Location<'_>) -> Self {
        Self::new(normalize_path(location.file(), &[]), location.line())
    }

    /// Source path.
    #[inline]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Line number.
    #[inline]
    pub const fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl From<Frame> for String {
    fn from(frame: Frame) -> Self {
        frame.to_string()
    }
}

impl TryFrom<String> for Frame {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (file, line) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("frame '{value}' is missing a line number"))?;
        let line = line
            .parse::<u32>()
            .map_err(|_| format!("frame '{value}' has an invalid line number"))?;
        Ok(Self::new(file, line))
    }
}

// ============================================================================
// Trace
// ============================================================================

/// Ordered frames, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace(Vec<Frame>);

impl Trace {
    /// Empty trace.
    #[inline]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Frames, newest first.
    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Newest frame.
    #[inline]
    pub fn first(&self) -> Option<&Frame> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.0.iter()
    }

    /// Put `newer` in front of the existing frames; the current frames become
    /// the tail.
    pub fn prepend(&mut self, newer: Trace) {
        if newer.is_empty() {
            return;
        }
        let mut frames = newer.0;
        frames.append(&mut self.0);
        self.0 = frames;
    }

    /// Append older frames after the existing ones.
    pub fn extend_from(&mut self, older: &Trace) {
        self.0.extend(older.0.iter().cloned());
    }

    /// `file:line` rendering of every frame.
    pub fn lines(&self) -> Vec<String> {
        self.0.iter().map(Frame::to_string).collect()
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl From<Vec<Frame>> for Trace {
    fn from(frames: Vec<Frame>) -> Self {
        Self(frames)
    }
}

impl FromIterator<Frame> for Trace {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Capture
// ============================================================================

/// How much of the stack a capture records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Walk the whole stack.
    #[default]
    Full,
    /// Only the calling location.
    Caller,
    /// Record nothing.
    Off,
}

/// Capture settings, derived from [`crate::ClassifierConfig`].
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub mode: TraceMode,
    pub max_frames: usize,
    pub strip_prefixes: Vec<String>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            mode: TraceMode::Full,
            max_frames: DEFAULT_MAX_FRAMES,
            strip_prefixes: Vec::new(),
        }
    }
}

/// Capture the current stack.
///
/// `skip` drops that many frames after self-exclusion (caller wrapper
/// functions). `caller` is the `#[track_caller]` location used when a full
/// walk is unavailable.
pub fn capture(skip: usize, options: &CaptureOptions, caller: &'static Location<'static>) -> Trace {
    match options.mode {
        TraceMode::Off => Trace::new(),
        TraceMode::Caller => Trace(vec![Frame::from_location(caller)]),
        TraceMode::Full => {
            let frames = walk(skip, options);
            if frames.is_empty() {
                Trace(vec![Frame::from_location(caller)])
            } else {
                Trace(frames)
            }
        }
    }
}

/// Capture with default options from the calling location.
#[track_caller]
pub fn capture_here(skip: usize) -> Trace {
    capture(skip, &CaptureOptions::default(), Location::caller())
}

#[cfg(feature = "backtrace")]
fn walk(skip: usize, options: &CaptureOptions) -> Vec<Frame> {
    let limit = options.max_frames.max(1);
    let mut frames = Vec::new();
    let mut skipped = 0usize;

    backtrace::trace(|raw| {
        backtrace::resolve_frame(raw, |symbol| {
            if frames.len() >= limit {
                return;
            }
            let (Some(path), Some(line)) = (symbol.filename(), symbol.lineno()) else {
                return;
            };
            let raw_path = path.to_string_lossy();
            if is_excluded(&raw_path) {
                return;
            }
            if skipped < skip {
                skipped += 1;
                return;
            }
            frames.push(Frame::new(
                normalize_path(&raw_path, &options.strip_prefixes),
                line,
            ));
        });
        frames.len() < limit
    });

    frames
}

#[cfg(not(feature = "backtrace"))]
fn walk(_skip: usize, _options: &CaptureOptions) -> Vec<Frame> {
    Vec::new()
}

/// Frames from the capture machinery itself, the unwinder and std.
#[cfg_attr(not(feature = "backtrace"), allow(dead_code))]
fn is_excluded(raw_path: &str) -> bool {
    let path = raw_path.replace('\\', "/");
    path.starts_with(own_source_root())
        || path.starts_with("/rustc/")
        || path.contains("/library/std/")
        || path.contains("/library/core/")
        || path.contains("/library/alloc/")
        || path.contains("/library/test/")
        || path.contains("/backtrace-")
}

fn own_source_root() -> &'static str {
    static ROOT: OnceLock<String> = OnceLock::new();
    ROOT.get_or_init(|| format!("{}/src/", env!("CARGO_MANIFEST_DIR").replace('\\', "/")))
}

fn working_dir() -> Option<&'static str> {
    static CWD: OnceLock<Option<String>> = OnceLock::new();
    CWD.get_or_init(|| {
        std::env::current_dir()
            .ok()
            .map(|p| format!("{}/", p.to_string_lossy().replace('\\', "/")))
    })
    .as_deref()
}

/// Normalize a source path: forward slashes, configured prefixes and the
/// working directory stripped, cargo registry checkouts reduced to
/// `crate-version/...`.
pub fn normalize_path(file: &str, strip_prefixes: &[String]) -> String {
    let file = file.replace('\\', "/");

    for prefix in strip_prefixes {
        if let Some(rest) = file.strip_prefix(prefix.as_str()) {
            return rest.trim_start_matches('/').to_string();
        }
    }

    if let Some(idx) = file.find(REGISTRY_MARKER) {
        let after = &file[idx + REGISTRY_MARKER.len()..];
        // after = "index.crates.io-xxxx/crate-1.0.0/src/lib.rs"
        return match after.split_once('/') {
            Some((_, rest)) => rest.to_string(),
            None => after.to_string(),
        };
    }

    if let Some(rest) = working_dir().and_then(|cwd| file.strip_prefix(cwd)) {
        return rest.to_string();
    }

    file
}
