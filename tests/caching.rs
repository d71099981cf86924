use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ladle::ast::{Node, NodeKind};
use ladle::cache::SlotState;
use ladle::reflect::{TypeInfo, TypeRegistry};
use ladle::{
    parse, EvaluationContext, EvaluationErrorKind, HostObject, MethodExecutor, MethodResolver, PropertyAccessor, Result,
    TypeDescriptor, TypedValue, Value,
};
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct Cat;

#[derive(Debug)]
struct Dog;

impl HostObject for Cat {
    fn type_name(&self) -> &str {
        "Cat"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl HostObject for Dog {
    fn type_name(&self) -> &str {
        "Dog"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn pets() -> Arc<TypeRegistry> {
    let types = TypeRegistry::with_builtins();
    types.register(TypeInfo::builder::<Cat>("Cat").property("name", TypeDescriptor::String, |_| "Tom".into()).build());
    types.register(TypeInfo::builder::<Dog>("Dog").property("name", TypeDescriptor::String, |_| "Rex".into()).build());
    Arc::new(types)
}

fn property_states(node: &Node) -> Vec<(String, Vec<SlotState>)> {
    let mut states = Vec::new();
    node.walk(&mut |n| {
        if let NodeKind::PropertyOrField(prop) = &n.kind {
            states.push((prop.name.clone(), n.cache_states()));
        }
    });
    states
}

fn read_guard(node: &Node, name: &str) -> Option<TypeDescriptor> {
    property_states(node).into_iter().find(|(n, _)| n == name).and_then(|(_, states)| match &states[0] {
        SlotState::Resolved(guard) => Some(guard.target_type().clone()),
        SlotState::Unresolved => None,
    })
}

#[test]
fn test_fresh_expression_has_unresolved_caches() {
    let expr = parse("target.name").unwrap();
    for (_, states) in property_states(expr.ast()) {
        assert_eq!(states, vec![SlotState::Unresolved, SlotState::Unresolved]);
    }
}

#[test]
fn test_cache_follows_the_runtime_type() {
    let types = pets();
    let expr = parse("#target.name").unwrap();
    let cat = EvaluationContext::builder().types(types.clone()).variable("target", Value::object(Cat)).build();
    let dog = EvaluationContext::builder().types(types).variable("target", Value::object(Dog)).build();

    assert_eq!(expr.value_in(&cat).unwrap(), Value::from("Tom"));
    assert_eq!(read_guard(expr.ast(), "name"), Some(TypeDescriptor::object("Cat")));

    // A different type fails the guard and re-resolves instead of misreading
    assert_eq!(expr.value_in(&dog).unwrap(), Value::from("Rex"));
    assert_eq!(read_guard(expr.ast(), "name"), Some(TypeDescriptor::object("Dog")));

    assert_eq!(expr.value_in(&cat).unwrap(), Value::from("Tom"));
    assert_eq!(read_guard(expr.ast(), "name"), Some(TypeDescriptor::object("Cat")));
}

#[test]
fn test_map_and_object_targets_alternate() {
    let expr = parse("#target.name").unwrap();
    let cat = EvaluationContext::builder().types(pets()).variable("target", Value::object(Cat)).build();
    let map = EvaluationContext::builder().variable("target", Value::map(vec![("name", Value::from("Map"))])).build();
    for _ in 0..3 {
        assert_eq!(expr.value_in(&cat).unwrap(), Value::from("Tom"));
        assert_eq!(expr.value_in(&map).unwrap(), Value::from("Map"));
    }
    assert_eq!(read_guard(expr.ast(), "name"), Some(TypeDescriptor::Map));
}

/// Serves `counted` on strings and counts how often the chain resolves it.
#[derive(Debug, Default)]
struct CountingAccessor {
    resolutions: AtomicUsize,
    reads: AtomicUsize,
}

impl PropertyAccessor for CountingAccessor {
    fn can_read(&self, _ctx: &EvaluationContext, target: &Value, name: &str) -> bool {
        let ok = matches!(target, Value::String(_)) && name == "counted";
        if ok {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
        }
        ok
    }

    fn read(&self, _ctx: &EvaluationContext, target: &Value, _name: &str) -> Result<TypedValue> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(TypedValue::new(Value::Int(target.to_string().len() as i32)))
    }
}

#[test]
fn test_cache_hits_skip_resolution() {
    let accessor = Arc::new(CountingAccessor::default());
    let ctx = EvaluationContext::builder().property_accessor(accessor.clone()).build();
    let expr = parse("'abc'.counted").unwrap();

    for _ in 0..5 {
        assert_eq!(expr.value_in(&ctx).unwrap(), Value::Int(3));
    }
    assert_eq!(accessor.resolutions.load(Ordering::SeqCst), 1);
    assert_eq!(accessor.reads.load(Ordering::SeqCst), 5);

    // A second parse owns its own caches
    let other = parse("'abc'.counted").unwrap();
    other.value_in(&ctx).unwrap();
    assert_eq!(accessor.resolutions.load(Ordering::SeqCst), 2);
}

#[test]
fn test_caches_survive_a_different_context() {
    let accessor = Arc::new(CountingAccessor::default());
    let expr = parse("#s.counted").unwrap();
    // Every context carries the same accessor instance, so its entry stays valid
    for s in ["a", "bb", "ccc"] {
        let ctx = EvaluationContext::builder().property_accessor(accessor.clone()).variable("s", s).build();
        assert_eq!(expr.value_in(&ctx).unwrap(), Value::Int(s.len() as i32));
    }
    assert_eq!(accessor.resolutions.load(Ordering::SeqCst), 1);
}

#[test]
fn test_context_without_the_cached_accessor_resolves_again() {
    let accessor = Arc::new(CountingAccessor::default());
    let expr = parse("'abc'.counted").unwrap();
    let custom = EvaluationContext::builder().property_accessor(accessor.clone()).build();
    assert_eq!(expr.value_in(&custom).unwrap(), Value::Int(3));

    let err = expr.value_in(&EvaluationContext::empty()).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::PropertyNotFound { .. })), "{}", err);

    assert_eq!(expr.value_in(&custom).unwrap(), Value::Int(3));
    assert_eq!(accessor.resolutions.load(Ordering::SeqCst), 2);

    // Another instance of the same accessor type is a different chain entry
    let fresh = Arc::new(CountingAccessor::default());
    let other = EvaluationContext::builder().property_accessor(fresh.clone()).build();
    assert_eq!(expr.value_in(&other).unwrap(), Value::Int(3));
    assert_eq!(fresh.resolutions.load(Ordering::SeqCst), 1);
    assert_eq!(accessor.reads.load(Ordering::SeqCst), 2);
}

#[derive(Debug)]
struct Shout;

impl MethodExecutor for Shout {
    fn execute(&self, _ctx: &EvaluationContext, target: &Value, _args: Vec<Value>) -> Result<TypedValue> {
        Ok(TypedValue::new(Value::from(target.to_string().to_uppercase())))
    }
}

/// Adds `shout()` to strings.
#[derive(Debug)]
struct ShoutResolver;

impl MethodResolver for ShoutResolver {
    fn resolve(
        &self,
        _ctx: &EvaluationContext,
        target: &Value,
        name: &str,
        _arg_types: &[TypeDescriptor],
    ) -> Result<Option<Arc<dyn MethodExecutor>>> {
        Ok((matches!(target, Value::String(_)) && name == "shout").then(|| Arc::new(Shout) as Arc<dyn MethodExecutor>))
    }
}

#[test]
fn test_method_cache_is_checked_against_the_context_resolvers() {
    let expr = parse("'hi'.shout()").unwrap();
    let loud = EvaluationContext::builder().method_resolver(Arc::new(ShoutResolver)).build();
    assert_eq!(expr.value_in(&loud).unwrap(), Value::from("HI"));

    let err = expr.value_in(&EvaluationContext::empty()).unwrap_err();
    assert!(matches!(err.evaluation_kind(), Some(EvaluationErrorKind::MethodNotFound { .. })), "{}", err);
    assert_eq!(expr.value_in(&loud).unwrap(), Value::from("HI"));
}

#[test]
fn test_cache_follows_the_context_type_registry() {
    let felix = TypeRegistry::with_builtins();
    felix.register(
        TypeInfo::builder::<Cat>("Cat").property("name", TypeDescriptor::String, |_| "Felix".into()).build(),
    );

    let expr = parse("#target.name").unwrap();
    let tom = EvaluationContext::builder().types(pets()).variable("target", Value::object(Cat)).build();
    let felix = EvaluationContext::builder().types(Arc::new(felix)).variable("target", Value::object(Cat)).build();

    assert_eq!(expr.value_in(&tom).unwrap(), Value::from("Tom"));
    assert_eq!(expr.value_in(&felix).unwrap(), Value::from("Felix"));
    assert_eq!(expr.value_in(&tom).unwrap(), Value::from("Tom"));
}

#[test]
fn test_method_cache_guards_argument_types() {
    let expr = parse("T(Math).abs(#n)").unwrap();
    let int = EvaluationContext::builder().variable("n", -2).build();
    let double = EvaluationContext::builder().variable("n", -2.5).build();
    assert_eq!(expr.value_in(&int).unwrap(), Value::Int(2));
    assert_eq!(expr.value_in(&double).unwrap(), Value::Double(2.5));
    assert_eq!(expr.value_in(&int).unwrap(), Value::Int(2));
}

#[test]
fn test_failed_resolution_leaves_slot_empty() {
    let expr = parse("#target.name").unwrap();
    let ctx = EvaluationContext::builder().variable("target", 1).build();
    assert!(expr.value_in(&ctx).is_err());
    assert_eq!(read_guard(expr.ast(), "name"), None);
}
