//! Property-based tests for flagged_errors
//!
//! These tests use proptest to generate random inputs and verify invariants hold.

use flagged_errors::{
    merge_status, ClassificationRegistry, ClassifierConfig, ErrFlag, ErrorBuilder, ErrorLog,
    ErrorWithFlags, FlagRegistry, MappingError, StatusMapper, StructuredError, TraceMode,
};
use proptest::prelude::*;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
struct Plain;

impl fmt::Display for Plain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("plain")
    }
}

impl Error for Plain {}

fn quiet_builder() -> ErrorBuilder {
    ErrorBuilder::with_capture(flagged_errors::CaptureOptions {
        mode: TraceMode::Off,
        ..Default::default()
    })
}

fn quiet_registry() -> ClassificationRegistry {
    ClassificationRegistry::with_config(ClassifierConfig {
        trace_mode: TraceMode::Caller,
        ..ClassifierConfig::default()
    })
    .unwrap()
}

fn flag() -> impl Strategy<Value = ErrFlag> {
    any::<u32>().prop_map(ErrFlag::from_bits)
}

fn single_bit() -> impl Strategy<Value = ErrFlag> {
    (0u32..32).prop_map(ErrFlag::bit)
}

// ============================================================================
// FLAG ALGEBRA PROPERTIES
// ============================================================================

proptest! {
    /// Splitting a flag and OR-ing the parts back gives the original
    #[test]
    fn split_recombines(f in flag()) {
        let parts = f.split();
        prop_assert_eq!(parts.len() as u32, f.count());
        prop_assert!(parts.iter().all(|p| p.is_single()));
        prop_assert!(parts.windows(2).all(|w| w[0] < w[1]));
        let back: ErrFlag = parts.into_iter().collect();
        prop_assert_eq!(back, f);
    }

    /// A union always contains both operands, and nothing it lacks
    #[test]
    fn union_contains_operands(a in flag(), b in flag()) {
        let union = a | b;
        prop_assert!(union.contains(a));
        prop_assert!(union.contains(b));
        prop_assert!(union.contains(ErrFlag::NONE));
        prop_assert_eq!(union.without(b).contains(b), b.is_empty());
    }
}

// ============================================================================
// REGISTRY PROPERTIES
// ============================================================================

proptest! {
    /// Instance flags are the OR of every set call, in any order
    #[test]
    fn instance_flags_aggregate(sets in prop::collection::vec(flag(), 0..16)) {
        let forward = FlagRegistry::new();
        let backward = FlagRegistry::new();
        let err = quiet_builder().error("e");

        for f in &sets {
            forward.set_flags_by_instance(&err, *f);
        }
        for f in sets.iter().rev() {
            backward.set_flags_by_instance(&err, *f);
        }

        let expected: ErrFlag = sets.iter().copied().collect();
        prop_assert_eq!(forward.flags_by_instance(&err), expected);
        prop_assert_eq!(backward.flags_by_instance(&err), expected);
        prop_assert_eq!(forward.get_flags(&err), expected);
    }

    /// Unset clears exactly the requested bits, and only when all are present
    #[test]
    fn unset_is_exact_and_idempotent(set in flag(), unset in flag()) {
        let registry = FlagRegistry::new();
        let err = quiet_builder().error("e");
        registry.set_flags_by_instance(&err, set);

        registry.unset_flags_by_instance(&err, unset);
        let once = registry.flags_by_instance(&err);
        let expected = if set.contains(unset) { set ^ unset } else { set };
        prop_assert_eq!(once, expected);

        registry.unset_flags_by_instance(&err, unset);
        prop_assert_eq!(registry.flags_by_instance(&err), once);
    }

    /// Type flags apply to every value of the type, including later ones
    #[test]
    fn type_flags_reach_every_instance(f in flag(), n in 1usize..8) {
        let registry = FlagRegistry::new();
        let before: Vec<Plain> = (0..n).map(|_| Plain).collect();
        registry.set_flags_by_type::<Plain>(f);

        for e in &before {
            prop_assert_eq!(registry.get_flags(e), f);
            prop_assert!(registry.matches(e, f));
        }
        prop_assert_eq!(registry.get_flags(&Plain), f);
    }

    /// get_flags is the union of self-reported, instance and type flags
    #[test]
    fn get_flags_is_union_of_sources(own in flag(), instance in flag(), by_type in flag()) {
        let registry = FlagRegistry::new();
        let err = quiet_builder().with_flags(own).error("e");
        registry.set_flags_by_instance(&err, instance);
        registry.set_flags_by_type::<flagged_errors::BasicError>(by_type);

        prop_assert_eq!(registry.get_flags(&err), own | instance | by_type);
        prop_assert!(registry.matches(&err, own));
        prop_assert!(registry.matches(&err, instance));
        prop_assert!(registry.matches(&err, by_type));
        prop_assert_eq!(err.flags(), own);
    }
}

// ============================================================================
// MAPPING PROPERTIES
// ============================================================================

proptest! {
    /// Every mapped bit resolves forward and shows up in the reverse entry
    #[test]
    fn mapping_round_trips_bits(entries in prop::collection::btree_map(0u32..32, 100u16..600, 1..12)) {
        let mapper = StatusMapper::new();
        mapper
            .set_mapping(entries.iter().map(|(&bit, &status)| (ErrFlag::bit(bit), status)))
            .unwrap();

        for (&bit, &status) in &entries {
            let flag = ErrFlag::bit(bit);
            prop_assert_eq!(mapper.to_status(flag), status);
            prop_assert!(mapper.to_flags(status).contains(flag));
            prop_assert!(mapper.is_status_in_flags(mapper.to_flags(status), status));
        }
    }

    /// Composite entries are split, so each bit maps on its own
    #[test]
    fn composite_entries_split(f in flag().prop_filter("non-empty", |f| !f.is_empty()), status in 100u16..600) {
        let mapper = StatusMapper::new();
        mapper.set_mapping([(f, status)]).unwrap();

        prop_assert_eq!(mapper.to_flags(status), f);
        for bit in f.bits() {
            prop_assert_eq!(mapper.to_status(bit), status);
        }
        if !f.is_single() {
            prop_assert_eq!(mapper.to_status(f), 0);
        }
    }

    /// A conflicting bit rejects the whole mapping and keeps the old one
    #[test]
    fn ambiguous_mapping_is_atomic(bit in single_bit(), a in 100u16..600, b in 100u16..600) {
        prop_assume!(a != b);
        let mapper = StatusMapper::new();
        let before = mapper.entries();

        let result = mapper.set_mapping([(bit, a), (bit, b)]);
        prop_assert_eq!(result, Err(MappingError::Ambiguous { flag: bit, status: b, existing: a }));
        prop_assert_eq!(mapper.entries(), before);
    }
}

// ============================================================================
// MERGE PROPERTIES
// ============================================================================

proptest! {
    /// Any server error makes the merged status a server error
    #[test]
    fn server_errors_dominate(codes in prop::collection::vec(100u16..600, 1..10)) {
        let merged = merge_status(codes.iter().copied(), 500, 500);
        if codes.iter().any(|&c| c >= 500) {
            prop_assert!(merged >= 500);
        }
        if codes.iter().all(|&c| c == codes[0]) {
            prop_assert_eq!(merged, codes[0]);
        }
    }

    /// Two different client errors and nothing else collapse to the conflict status
    #[test]
    fn distinct_client_errors_collapse(codes in prop::collection::vec(400u16..500, 2..10), conflict in 500u16..600) {
        prop_assume!(codes.iter().any(|&c| c != codes[0]));
        prop_assert_eq!(merge_status(codes.iter().copied(), conflict, 500), conflict);
    }

    /// Merging keeps every source, in order
    #[test]
    fn merge_keeps_sources_in_order(messages in prop::collection::vec("[a-z]{1,12}", 2..6)) {
        let registry = quiet_registry();
        let errors = messages
            .iter()
            .map(|m| Some(Box::new(quiet_builder().error(m.clone())) as flagged_errors::BoxError));

        let merged = registry.merge(errors).unwrap();
        let merged = merged.downcast_ref::<StructuredError>().unwrap();
        let inner: Vec<&str> = merged.inner().iter().map(|i| i.error.as_str()).collect();
        prop_assert_eq!(inner, messages.iter().map(String::as_str).collect::<Vec<_>>());
        prop_assert_eq!(merged.message(), messages.join("; "));
    }
}

// ============================================================================
// WIRE AND LOG PROPERTIES
// ============================================================================

proptest! {
    /// JSON payloads parse back to the same visible fields
    #[test]
    fn json_preserves_fields(code in 100u16..600, title in "\\PC{0,40}", message in "\\PC{0,200}", f in flag()) {
        let err = StructuredError::new(code, title, message).with_flags(f);
        let back = StructuredError::from_json(&err.to_json().unwrap()).unwrap();

        prop_assert_eq!(back.code(), err.code());
        prop_assert_eq!(back.title(), err.title());
        prop_assert_eq!(back.message(), err.message());
        prop_assert_eq!(back.timestamp(), err.timestamp());
        prop_assert_eq!(back.flags(), err.flags());
        prop_assert_eq!(back.trace(), err.trace());
        prop_assert_ne!(back.id(), err.id());
    }

    /// Rendered log lines stay valid UTF-8 and bounded
    #[test]
    fn log_line_is_bounded(message in "\\PC{0,5000}") {
        let err = StructuredError::new(500, "", message);
        let mut line = String::new();
        ErrorLog::new(&err).write_to(&mut line).unwrap();

        prop_assert!(std::str::from_utf8(line.as_bytes()).is_ok());
        prop_assert!(line.len() < 4096);
    }

    /// Wrapping arbitrary messages never panics and always yields a valid status
    #[test]
    fn wrap_never_panics(message in "\\PC{0,300}") {
        let registry = quiet_registry();
        let err = registry.wrap(message);
        prop_assert!((100..600).contains(&err.code()));
        prop_assert!(!err.title().is_empty());
    }
}
