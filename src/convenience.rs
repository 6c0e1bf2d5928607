//! Convenience macros for building and wrapping errors with format strings.
//!
//! Each macro expands at the call site, so the recorded caller frame is the
//! line the macro was invoked on.
//!
//! ```rust
//! use flagged_errors::{format_error, wrap_errf, ClassificationRegistry, ErrFlag, ErrorWithFlags};
//!
//! let id = 42;
//! let err = format_error!("user {} not found", id);
//! assert_eq!(err.to_string(), "user 42 not found");
//!
//! let flagged = format_error!(flags = ErrFlag::NOT_FOUND; "user {id} not found");
//! assert!(flagged.has_flags(ErrFlag::NOT_FOUND));
//!
//! let registry = ClassificationRegistry::new();
//! let wrapped = wrap_errf!(registry, flagged, "loading profile {}", id);
//! assert_eq!(wrapped.code(), 404);
//! assert_eq!(wrapped.message(), "loading profile 42");
//! ```

/// Build a [`crate::BasicError`] from a format string.
///
/// Prefix with `flags = EXPR;` to attach flags.
#[macro_export]
macro_rules! format_error {
    (flags = $flags:expr; $($arg:tt)+) => {
        $crate::ErrorBuilder::new()
            .with_flags($flags)
            .format(::std::format_args!($($arg)+))
    };
    ($($arg:tt)+) => {
        $crate::ErrorBuilder::new().format(::std::format_args!($($arg)+))
    };
}

/// Classify and wrap an error, prefixing a formatted message.
///
/// `wrap_errf!(registry, err, "fmt", args...)`
#[macro_export]
macro_rules! wrap_errf {
    ($registry:expr, $err:expr, $($arg:tt)+) => {
        $registry.wrap_with_message($err, &::std::format!($($arg)+))
    };
}

/// Wrap an error with an explicit status and a formatted message.
///
/// `wrap_codef!(registry, err, code, "fmt", args...)`
#[macro_export]
macro_rules! wrap_codef {
    ($registry:expr, $err:expr, $code:expr, $($arg:tt)+) => {
        $registry.wrap_with_code($err, $code, &::std::format!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use crate::{ClassificationRegistry, ErrFlag, ErrorWithFlags, ErrorWithStack};

    #[test]
    fn format_error_records_macro_line() {
        let err = format_error!("{} + {} = {}", 1, 2, 3);
        let line = line!() - 1;
        assert_eq!(err.to_string(), "1 + 2 = 3");
        assert!(!err.stack().is_empty());
        // frames inside this crate are excluded from walks, so only the
        // fallback caller frame can point here
        if err.stack().len() == 1 {
            assert_eq!(err.stack().frames()[0].line(), line);
        }
    }

    #[test]
    fn format_error_with_flags() {
        let err = format_error!(flags = ErrFlag::CONFLICT | ErrFlag::BAD_REQUEST; "order {} exists", 9);
        assert_eq!(err.flags(), ErrFlag::CONFLICT | ErrFlag::BAD_REQUEST);
        assert_eq!(err.message(), "order 9 exists");
    }

    #[test]
    fn wrap_macros() {
        let registry = ClassificationRegistry::new();
        let err = wrap_errf!(registry, format_error!("no such table"), "query {}", "users");
        assert_eq!(err.code(), 404);
        assert_eq!(err.message(), "query users");

        let err = wrap_codef!(registry, err, 503, "ignored {}", 1);
        assert_eq!(err.code(), 503);
        assert_eq!(err.message(), "query users");
    }
}
