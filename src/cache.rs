//! Per-node accessor caches.
//!
//! Every member-access node owns a [`CacheSlot`]. The slot holds an
//! immutable entry behind an `ArcSwapOption`, so the hot path is a
//! lock-free load plus a guard comparison. Two threads missing at the same
//! time both resolve and the last store wins.
//!
//! An entry also remembers the chain entry that produced it and, for
//! registry-backed resolvers, the [`TypeRegistry`] it was found in. A hit
//! only counts when the evaluating context still carries both, so one
//! expression shared by contexts with different chains never serves an
//! accessor the current context would not have picked.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::debug;

use crate::error::Result;
use crate::reflect::TypeRegistry;
use crate::types::{TypeDescriptor, Value};

/// Runtime type fingerprint under which a cached accessor stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Guard {
    target: TypeDescriptor,
    /// The type a `Value::Type` target denotes, so `T(A)` and `T(B)` differ.
    denotes: Option<TypeDescriptor>,
    args: Vec<TypeDescriptor>,
}

impl Guard {
    /// Guard for a property read or write on `target`.
    pub fn target(target: &Value) -> Self {
        Self::call(target, &[])
    }

    /// Guard for a call: the target type plus every argument type.
    pub fn call(target: &Value, args: &[Value]) -> Self {
        let denotes = match target {
            Value::Type(t) => Some(t.clone()),
            _ => None,
        };
        Self { target: target.descriptor(), denotes, args: args.iter().map(Value::descriptor).collect() }
    }

    pub fn target_type(&self) -> &TypeDescriptor {
        &self.target
    }

    pub fn arg_types(&self) -> &[TypeDescriptor] {
        &self.args
    }
}

/// What a resolution produced: the accessor to cache, the chain entry it
/// came from and the registry it depends on, if any.
pub struct Resolved<A: ?Sized, R: ?Sized> {
    pub accessor: Arc<A>,
    pub source: Arc<R>,
    pub types: Option<Arc<TypeRegistry>>,
}

/// The evaluating context's view of one resolution chain.
pub struct Scope<'a, R: ?Sized> {
    pub chain: &'a [Arc<R>],
    pub types: &'a Arc<TypeRegistry>,
}

struct Cached<A: ?Sized, R: ?Sized> {
    guard: Guard,
    accessor: Arc<A>,
    source: Arc<R>,
    types: Option<Arc<TypeRegistry>>,
}

impl<A: ?Sized, R: ?Sized> Cached<A, R> {
    fn serves(&self, guard: &Guard, scope: &Scope<'_, R>) -> bool {
        self.guard == *guard
            && scope.chain.iter().any(|entry| Arc::ptr_eq(entry, &self.source))
            && self.types.as_ref().map_or(true, |types| Arc::ptr_eq(types, scope.types))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Unresolved,
    Resolved(Guard),
}

/// Cache for one member reference. `A` is the cached accessor, `R` the
/// chain entry type that resolves it.
pub struct CacheSlot<A: ?Sized, R: ?Sized = A> {
    cell: ArcSwapOption<Cached<A, R>>,
}

impl<A: ?Sized, R: ?Sized> CacheSlot<A, R> {
    pub fn new() -> Self {
        Self { cell: ArcSwapOption::empty() }
    }

    /// The cached accessor, only if it was resolved under an equal guard by
    /// an entry `scope` still holds.
    pub fn get(&self, guard: &Guard, scope: &Scope<'_, R>) -> Option<Arc<A>> {
        let cached = self.cell.load();
        match &*cached {
            Some(entry) if entry.serves(guard, scope) => Some(Arc::clone(&entry.accessor)),
            _ => None,
        }
    }

    pub fn store(&self, guard: Guard, resolved: Resolved<A, R>) {
        let Resolved { accessor, source, types } = resolved;
        self.cell.store(Some(Arc::new(Cached { guard, accessor, source, types })));
    }

    pub fn invalidate(&self) {
        self.cell.store(None);
    }

    pub fn state(&self) -> SlotState {
        match &*self.cell.load() {
            Some(entry) => SlotState::Resolved(entry.guard.clone()),
            None => SlotState::Unresolved,
        }
    }

    /// Return the cached accessor or run `resolve` and cache what it finds.
    /// `Ok(None)` means no resolver matched; the slot is left empty then.
    pub fn get_or_resolve<F>(
        &self,
        guard: Guard,
        member: &str,
        scope: Scope<'_, R>,
        resolve: F,
    ) -> Result<Option<Arc<A>>>
    where
        F: FnOnce() -> Result<Option<Resolved<A, R>>>,
    {
        if let Some(hit) = self.get(&guard, &scope) {
            return Ok(Some(hit));
        }
        match self.state() {
            SlotState::Resolved(stale) if stale == guard => {
                debug!(member = %member, target = %guard.target, "cached accessor not in this context, re-resolving")
            }
            SlotState::Resolved(stale) => debug!(
                member = %member,
                cached = %stale.target,
                target = %guard.target,
                "accessor guard failed, re-resolving"
            ),
            SlotState::Unresolved => debug!(member = %member, target = %guard.target, "accessor cache miss"),
        }
        self.invalidate();
        let Some(resolved) = resolve()? else {
            return Ok(None);
        };
        let accessor = Arc::clone(&resolved.accessor);
        self.store(guard, resolved);
        Ok(Some(accessor))
    }
}

impl<A: ?Sized, R: ?Sized> Default for CacheSlot<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized, R: ?Sized> fmt::Debug for CacheSlot<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheSlot").field(&self.state()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(accessor: &str, source: &Arc<str>) -> Option<Resolved<str, str>> {
        Some(Resolved { accessor: Arc::from(accessor), source: Arc::clone(source), types: None })
    }

    #[test]
    fn slot_cycles_between_states() {
        let source: Arc<str> = Arc::from("chain");
        let chain = vec![Arc::clone(&source)];
        let types = Arc::new(TypeRegistry::empty());
        let scope = || Scope { chain: chain.as_slice(), types: &types };

        let slot: CacheSlot<str> = CacheSlot::new();
        assert_eq!(slot.state(), SlotState::Unresolved);

        let int_guard = Guard::target(&Value::Int(1));
        let found = slot.get_or_resolve(int_guard.clone(), "m", scope(), || Ok(resolved("int", &source))).unwrap();
        assert_eq!(found.as_deref(), Some("int"));
        assert_eq!(slot.state(), SlotState::Resolved(int_guard.clone()));

        // A hit never calls the resolver.
        let hit = slot.get_or_resolve(int_guard, "m", scope(), || panic!("resolver called on hit")).unwrap();
        assert_eq!(hit.as_deref(), Some("int"));

        let string_guard = Guard::target(&Value::from("s"));
        assert!(slot.get(&string_guard, &scope()).is_none());
        let found =
            slot.get_or_resolve(string_guard.clone(), "m", scope(), || Ok(resolved("string", &source))).unwrap();
        assert_eq!(found.as_deref(), Some("string"));
        assert_eq!(slot.state(), SlotState::Resolved(string_guard));
    }

    #[test]
    fn failed_resolution_leaves_slot_empty() {
        let source: Arc<str> = Arc::from("chain");
        let chain = vec![Arc::clone(&source)];
        let types = Arc::new(TypeRegistry::empty());

        let slot: CacheSlot<str> = CacheSlot::new();
        slot.store(Guard::target(&Value::Null), Resolved { accessor: Arc::from("null"), source, types: None });
        let scope = Scope { chain: chain.as_slice(), types: &types };
        let found = slot.get_or_resolve(Guard::target(&Value::Bool(true)), "m", scope, || Ok(None)).unwrap();
        assert!(found.is_none());
        assert_eq!(slot.state(), SlotState::Unresolved);
    }

    #[test]
    fn entries_from_another_chain_miss() {
        let ours: Arc<str> = Arc::from("ours");
        let ours_chain = vec![Arc::clone(&ours)];
        let theirs_chain: Vec<Arc<str>> = vec![Arc::from("theirs")];
        let (types, other_types) = (Arc::new(TypeRegistry::empty()), Arc::new(TypeRegistry::empty()));
        let guard = Guard::target(&Value::from("s"));

        let slot: CacheSlot<str> = CacheSlot::new();
        slot.store(guard.clone(), Resolved { accessor: Arc::from("x"), source: Arc::clone(&ours), types: None });
        assert!(slot.get(&guard, &Scope { chain: ours_chain.as_slice(), types: &types }).is_some());
        assert!(slot.get(&guard, &Scope { chain: theirs_chain.as_slice(), types: &types }).is_none());

        // Registry-backed entries also need the same registry
        let registered = Resolved { accessor: Arc::from("x"), source: ours, types: Some(Arc::clone(&types)) };
        slot.store(guard.clone(), registered);
        assert!(slot.get(&guard, &Scope { chain: ours_chain.as_slice(), types: &types }).is_some());
        assert!(slot.get(&guard, &Scope { chain: ours_chain.as_slice(), types: &other_types }).is_none());
    }

    #[test]
    fn call_guard_includes_argument_types() {
        let target = Value::from("s");
        let a = Guard::call(&target, &[Value::Int(1)]);
        let b = Guard::call(&target, &[Value::Long(1)]);
        let c = Guard::call(&target, &[Value::Null]);
        assert_ne!(a, b);
        assert_eq!(c.arg_types(), &[TypeDescriptor::Null]);
        assert_eq!(a.target_type(), &TypeDescriptor::String);
    }

    #[test]
    fn type_values_fingerprint_the_denoted_type() {
        let math = Guard::target(&Value::Type(TypeDescriptor::object("Math")));
        let string = Guard::target(&Value::Type(TypeDescriptor::String));
        assert_eq!(math.target_type(), string.target_type());
        assert_ne!(math, string);
    }
}
