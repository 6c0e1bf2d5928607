//! Flag registry - ties error types and error instances to [`ErrFlag`]s.
//!
//! # Sources of Flags
//!
//! An error's flags are the bitwise OR of three independent sources:
//!
//! 1. **Self-reported**: the error implements [`ErrorWithFlags`]
//! 2. **Instance**: flags registered for this exact error (by [`ErrorId`])
//! 3. **Type**: flags registered for the error's concrete type
//!
//! No source overrides another; they only ever add bits.
//!
//! # Type Resolution
//!
//! Types are keyed by [`TypeId`]. Registering a type also stores a probe
//! (`is::<T>()`, also matching `Box<T>` and `Arc<T>`), which is how a
//! type-erased `&dyn Error` is resolved back to a registered type. A sample whose concrete type was never seen by the
//! registry cannot be resolved and is reported as
//! [`RegistryError::TypeResolution`].
//!
//! # Concurrency
//!
//! The type table, the instance table and the capability adapters each sit
//! behind their own `RwLock`. Lookups take read locks, mutations write locks.
//! Poisoned locks are recovered rather than propagated.
//!
//! # Memory
//!
//! Instance entries live until [`FlagRegistry::deregister_instance`] is
//! called. Registering many short-lived errors without deregistering them
//! grows the table without bound.

use crate::builder::BasicError;
use crate::definitions::{downcast_through, DynError, ErrorId, ErrorWithFlags, ErrorWithId, ErrorWithStack};
use crate::flags::ErrFlag;
use crate::stack::Trace;
use crate::structured::StructuredError;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{trace, warn};

/// Failures of registry configuration calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The concrete type behind the provided error could not be determined.
    #[error("unable to determine the error type: {reason}")]
    TypeResolution { reason: &'static str },
}

type Probe = fn(&DynError) -> bool;
type FlagsAdapter = for<'a> fn(&'a DynError) -> Option<&'a dyn ErrorWithFlags>;
type StackAdapter = for<'a> fn(&'a DynError) -> Option<&'a dyn ErrorWithStack>;
type IdAdapter = for<'a> fn(&'a DynError) -> Option<&'a dyn ErrorWithId>;

fn probe<T: Error + 'static>(err: &DynError) -> bool {
    downcast_through::<T>(err).is_some()
}

fn flags_adapter<T: ErrorWithFlags + 'static>(err: &DynError) -> Option<&dyn ErrorWithFlags> {
    downcast_through::<T>(err).map(|e| e as &dyn ErrorWithFlags)
}

fn stack_adapter<T: ErrorWithStack + 'static>(err: &DynError) -> Option<&dyn ErrorWithStack> {
    downcast_through::<T>(err).map(|e| e as &dyn ErrorWithStack)
}

fn id_adapter<T: ErrorWithId + 'static>(err: &DynError) -> Option<&dyn ErrorWithId> {
    downcast_through::<T>(err).map(|e| e as &dyn ErrorWithId)
}

#[derive(Clone, Copy)]
struct KnownType {
    name: &'static str,
    probe: Probe,
}

#[derive(Default)]
struct TypeTable {
    known: HashMap<TypeId, KnownType>,
    flags: HashMap<TypeId, ErrFlag>,
}

impl TypeTable {
    fn learn<T: Error + 'static>(&mut self) -> TypeId {
        let id = TypeId::of::<T>();
        self.known.entry(id).or_insert(KnownType {
            name: type_name::<T>(),
            probe: probe::<T>,
        });
        id
    }

    fn resolve(&self, err: &DynError) -> Option<TypeId> {
        self.known
            .iter()
            .find(|(_, known)| (known.probe)(err))
            .map(|(id, _)| *id)
    }

    fn name_of(&self, id: &TypeId) -> &'static str {
        self.known.get(id).map_or("<unknown>", |k| k.name)
    }
}

#[derive(Default)]
struct Capabilities {
    flags: HashMap<TypeId, FlagsAdapter>,
    stack: HashMap<TypeId, StackAdapter>,
    id: HashMap<TypeId, IdAdapter>,
}

/// Registry of per-type and per-instance error flags.
pub struct FlagRegistry {
    types: RwLock<TypeTable>,
    instances: RwLock<HashMap<ErrorId, ErrFlag>>,
    capabilities: RwLock<Capabilities>,
}

macro_rules! lock_accessors {
    ($read:ident, $write:ident, $field:ident, $ty:ty) => {
        #[inline]
        fn $read(&self) -> RwLockReadGuard<'_, $ty> {
            match self.$field.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }

        #[inline]
        fn $write(&self) -> RwLockWriteGuard<'_, $ty> {
            match self.$field.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    };
}

impl FlagRegistry {
    /// Empty registry that already knows the crate's own error types.
    pub fn new() -> Self {
        let mut types = TypeTable::default();
        types.learn::<StructuredError>();
        types.learn::<BasicError>();

        Self {
            types: RwLock::new(types),
            instances: RwLock::new(HashMap::new()),
            capabilities: RwLock::new(Capabilities::default()),
        }
    }

    lock_accessors!(read_types, write_types, types, TypeTable);
    lock_accessors!(read_instances, write_instances, instances, HashMap<ErrorId, ErrFlag>);
    lock_accessors!(read_caps, write_caps, capabilities, Capabilities);

    // ------------------------------------------------------------------------
    // Capability adapters
    // ------------------------------------------------------------------------

    /// Make `T`'s self-reported flags visible to classification.
    pub fn expose_flags<T: ErrorWithFlags + 'static>(&self) {
        self.write_types().learn::<T>();
        self.write_caps().flags.insert(TypeId::of::<T>(), flags_adapter::<T>);
    }

    /// Make `T`'s captured stack visible when it is folded into a structured error.
    pub fn expose_stack<T: ErrorWithStack + 'static>(&self) {
        self.write_types().learn::<T>();
        self.write_caps().stack.insert(TypeId::of::<T>(), stack_adapter::<T>);
    }

    /// Make `T` addressable by the instance registry.
    pub fn expose_id<T: ErrorWithId + 'static>(&self) {
        self.write_types().learn::<T>();
        self.write_caps().id.insert(TypeId::of::<T>(), id_adapter::<T>);
    }

    /// Self-reported flags capability of `err`, if any.
    pub fn as_flagged<'e>(&self, err: &'e DynError) -> Option<&'e dyn ErrorWithFlags> {
        if let Some(e) = downcast_through::<StructuredError>(err) {
            return Some(e);
        }
        if let Some(e) = downcast_through::<BasicError>(err) {
            return Some(e);
        }
        self.read_caps().flags.values().find_map(|adapter| adapter(err))
    }

    /// Captured stack of `err`, if it carries one.
    pub fn stack_of<'e>(&self, err: &'e DynError) -> Option<&'e Trace> {
        if let Some(e) = downcast_through::<StructuredError>(err) {
            return Some(e.stack());
        }
        if let Some(e) = downcast_through::<BasicError>(err) {
            return Some(e.stack());
        }
        self.read_caps()
            .stack
            .values()
            .find_map(|adapter| adapter(err))
            .map(|e| e.stack())
    }

    /// Identity of `err`, if it has one.
    pub fn identity_of(&self, err: &DynError) -> Option<ErrorId> {
        if let Some(e) = downcast_through::<StructuredError>(err) {
            return Some(e.error_id());
        }
        if let Some(e) = downcast_through::<BasicError>(err) {
            return Some(e.error_id());
        }
        self.read_caps()
            .id
            .values()
            .find_map(|adapter| adapter(err))
            .map(|e| e.error_id())
    }

    // ------------------------------------------------------------------------
    // By type
    // ------------------------------------------------------------------------

    /// OR `flags` into the entry for type `T`, creating it if absent.
    pub fn set_flags_by_type<T: Error + 'static>(&self, flags: ErrFlag) {
        let mut types = self.write_types();
        let id = types.learn::<T>();
        let entry = types.flags.entry(id).or_default();
        *entry |= flags;
        trace!(error_type = type_name::<T>(), flags = flags.raw(), total = entry.raw(), "type flags set");
    }

    /// OR `flags` into the entry for the concrete type of `sample`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::TypeResolution`] when `sample` is `None` or its type is
    /// unknown to the registry.
    pub fn set_flags_by_type_of(&self, sample: Option<&DynError>, flags: ErrFlag) -> Result<(), RegistryError> {
        let mut types = self.write_types();
        let id = resolve_sample(&types, sample)?;
        *types.flags.entry(id).or_default() |= flags;
        trace!(error_type = types.name_of(&id), flags = flags.raw(), "type flags set");
        Ok(())
    }

    /// Clear `flags` from type `T`, only if every bit is currently set.
    pub fn unset_flags_by_type<T: Error + 'static>(&self, flags: ErrFlag) {
        let mut types = self.write_types();
        unset_exact(types.flags.get_mut(&TypeId::of::<T>()), flags);
    }

    /// Clear `flags` from the concrete type of `sample`; see
    /// [`FlagRegistry::unset_flags_by_type`].
    ///
    /// # Errors
    ///
    /// [`RegistryError::TypeResolution`] when the type cannot be determined.
    pub fn unset_flags_by_type_of(&self, sample: Option<&DynError>, flags: ErrFlag) -> Result<(), RegistryError> {
        let mut types = self.write_types();
        let id = resolve_sample(&types, sample)?;
        unset_exact(types.flags.get_mut(&id), flags);
        Ok(())
    }

    /// Remove every flag registered for type `T`.
    pub fn deregister_type<T: Error + 'static>(&self) {
        if self.write_types().flags.remove(&TypeId::of::<T>()).is_some() {
            trace!(error_type = type_name::<T>(), "type deregistered");
        }
    }

    /// Remove every flag registered for the concrete type of `sample`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::TypeResolution`] when the type cannot be determined.
    pub fn deregister_type_of(&self, sample: Option<&DynError>) -> Result<(), RegistryError> {
        let mut types = self.write_types();
        let id = resolve_sample(&types, sample)?;
        types.flags.remove(&id);
        Ok(())
    }

    /// Flags registered for the concrete type of `err`; 0 when none.
    pub fn flags_by_type(&self, err: &DynError) -> ErrFlag {
        let types = self.read_types();
        types
            .resolve(err)
            .and_then(|id| types.flags.get(&id).copied())
            .unwrap_or_default()
    }

    /// Flags registered for type `T`; 0 when none.
    pub fn flags_for_type<T: Error + 'static>(&self) -> ErrFlag {
        self.read_types()
            .flags
            .get(&TypeId::of::<T>())
            .copied()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // By instance
    // ------------------------------------------------------------------------

    /// OR `flags` into the entry for this exact error.
    ///
    /// No-op when `err` has no identity.
    pub fn set_flags_by_instance(&self, err: &DynError, flags: ErrFlag) {
        if let Some(id) = self.identity_of(err) {
            self.set_flags_by_id(id, flags);
        } else {
            trace!(error = %err, "instance has no identity, flags not registered");
        }
    }

    /// OR `flags` into the entry for `id`.
    pub fn set_flags_by_id(&self, id: ErrorId, flags: ErrFlag) {
        let mut instances = self.write_instances();
        let entry = instances.entry(id).or_default();
        *entry |= flags;
        trace!(error_id = id.get(), flags = flags.raw(), total = entry.raw(), "instance flags set");
    }

    /// Clear `flags` from this exact error, only if every bit is set.
    pub fn unset_flags_by_instance(&self, err: &DynError, flags: ErrFlag) {
        if let Some(id) = self.identity_of(err) {
            unset_exact(self.write_instances().get_mut(&id), flags);
        }
    }

    /// Remove every flag registered for this exact error.
    pub fn deregister_instance(&self, err: &DynError) {
        if let Some(id) = self.identity_of(err) {
            self.deregister_id(id);
        }
    }

    /// Remove the entry for `id`.
    pub fn deregister_id(&self, id: ErrorId) {
        if self.write_instances().remove(&id).is_some() {
            trace!(error_id = id.get(), "instance deregistered");
        }
    }

    /// Flags registered for this exact error; 0 when none.
    pub fn flags_by_instance(&self, err: &DynError) -> ErrFlag {
        self.identity_of(err)
            .map(|id| self.flags_by_id(id))
            .unwrap_or_default()
    }

    /// Flags registered for `id`; 0 when none.
    pub fn flags_by_id(&self, id: ErrorId) -> ErrFlag {
        self.read_instances().get(&id).copied().unwrap_or_default()
    }

    /// Number of registered instances.
    pub fn instance_count(&self) -> usize {
        self.read_instances().len()
    }

    // ------------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------------

    /// Every flag associated with `err`: self-reported | instance | type.
    pub fn get_flags(&self, err: &DynError) -> ErrFlag {
        let own = self.as_flagged(err).map(|e| e.flags()).unwrap_or_default();
        own | self.flags_by_instance(err) | self.flags_by_type(err)
    }

    /// True when any single source carries all of `flags`.
    ///
    /// Sources are checked in order (self-reported, instance, type) and the
    /// first match wins.
    pub fn matches(&self, err: &DynError, flags: ErrFlag) -> bool {
        if self.as_flagged(err).is_some_and(|e| e.has_flags(flags)) {
            return true;
        }
        let instance_match = self
            .identity_of(err)
            .and_then(|id| self.read_instances().get(&id).copied())
            .is_some_and(|f| f.contains(flags));
        if instance_match {
            return true;
        }
        let types = self.read_types();
        types
            .resolve(err)
            .and_then(|id| types.flags.get(&id).copied())
            .is_some_and(|f| f.contains(flags))
    }
}

fn resolve_sample(types: &TypeTable, sample: Option<&DynError>) -> Result<TypeId, RegistryError> {
    let Some(sample) = sample else {
        warn!("type registration attempted without a sample error");
        return Err(RegistryError::TypeResolution {
            reason: "no error value provided",
        });
    };
    types.resolve(sample).ok_or_else(|| {
        warn!(error = %sample, "type registration attempted for an unknown error type");
        RegistryError::TypeResolution {
            reason: "type was never registered with this registry",
        }
    })
}

fn unset_exact(entry: Option<&mut ErrFlag>, flags: ErrFlag) {
    if let Some(current) = entry {
        if current.contains(flags) {
            *current ^= flags;
        }
    }
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types = self.read_types();
        f.debug_struct("FlagRegistry")
            .field("known_types", &types.known.len())
            .field("flagged_types", &types.flags.len())
            .field("instances", &self.read_instances().len())
            .finish()
    }
}
